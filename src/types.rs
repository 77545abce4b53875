use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::TableError;

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Logical column types a contract can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    Integer,
    Text,
    Float,
    Boolean,
    Datetime,
}

impl LogicalType {
    /// Column affinity used when the table is created in SQLite.
    pub fn sql_type(&self) -> &'static str {
        match self {
            LogicalType::Integer | LogicalType::Boolean => "INTEGER",
            LogicalType::Float => "REAL",
            LogicalType::Text | LogicalType::Datetime => "TEXT",
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogicalType::Integer => "integer",
            LogicalType::Text => "text",
            LogicalType::Float => "float",
            LogicalType::Boolean => "boolean",
            LogicalType::Datetime => "datetime",
        };
        f.write_str(name)
    }
}

/// A single cell of a materialized table.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Boolean(_) => "boolean",
            Value::DateTime(_) => "datetime",
        }
    }

    /// Convert the value to `target` without losing information.
    ///
    /// Returns `None` when the value cannot be represented as `target`.
    /// Null converts to null for every type; nullability is checked separately.
    pub fn coerce(&self, target: LogicalType) -> Option<Value> {
        match (self, target) {
            (Value::Null, _) => Some(Value::Null),

            (Value::Integer(i), LogicalType::Integer) => Some(Value::Integer(*i)),
            (Value::Float(f), LogicalType::Integer) => float_to_integer(*f).map(Value::Integer),
            (Value::Text(s), LogicalType::Integer) => s.trim().parse::<i64>().ok().map(Value::Integer),

            (Value::Float(f), LogicalType::Float) => Some(Value::Float(*f)),
            (Value::Integer(i), LogicalType::Float) => Some(Value::Float(*i as f64)),
            (Value::Text(s), LogicalType::Float) => s.trim().parse::<f64>().ok().map(Value::Float),

            (Value::Boolean(b), LogicalType::Boolean) => Some(Value::Boolean(*b)),
            (Value::Integer(0), LogicalType::Boolean) => Some(Value::Boolean(false)),
            (Value::Integer(1), LogicalType::Boolean) => Some(Value::Boolean(true)),
            (Value::Text(s), LogicalType::Boolean) => parse_boolean(s).map(Value::Boolean),

            (Value::DateTime(dt), LogicalType::Datetime) => Some(Value::DateTime(*dt)),
            (Value::Text(s), LogicalType::Datetime) => parse_datetime(s).map(Value::DateTime),

            (Value::Text(s), LogicalType::Text) => Some(Value::Text(s.clone())),
            (other, LogicalType::Text) => Some(Value::Text(other.to_string())),

            _ => None,
        }
    }

    pub fn conforms_to(&self, target: LogicalType) -> bool {
        self.coerce(target).is_some()
    }

    /// Stable, type-tagged rendering used to compare key tuples.
    pub(crate) fn key_token(&self) -> String {
        match self {
            Value::Float(f) => format!("float:{:016x}", f.to_bits()),
            other => format!("{}:{}", other.kind(), other),
        }
    }
}

fn float_to_integer(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_boolean(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in [DATETIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::DateTime(dt) => serializer.collect_str(&dt.format(DATETIME_FORMAT)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One row viewed as a mapping from column name to value.
pub type Row = BTreeMap<String, Value>;

/// A fully realized table: an ordered header plus positional rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, values: Vec<Value>) -> Result<(), TableError> {
        if values.len() != self.columns.len() {
            return Err(TableError::ArityMismatch {
                expected: self.columns.len(),
                found: values.len(),
            });
        }
        self.rows.push(values);
        Ok(())
    }

    /// Builder form of [`Table::push_row`].
    pub fn with_row<I, V>(mut self, values: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_row(values.into_iter().map(Into::into).collect())?;
        Ok(self)
    }

    /// Append a row given as a record; absent columns become null.
    pub fn push_record(&mut self, record: &Row) -> Result<(), TableError> {
        if let Some(unknown) = record.keys().find(|k| self.column_index(k).is_none()) {
            return Err(TableError::UnknownColumn(unknown.clone()));
        }
        let values = self
            .columns
            .iter()
            .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
            .collect();
        self.rows.push(values);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn column_values<'a>(&'a self, column: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    pub fn record(&self, row: usize) -> Option<Row> {
        let values = self.rows.get(row)?;
        Some(
            self.columns
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect(),
        )
    }

    pub fn records(&self) -> impl Iterator<Item = Row> + '_ {
        (0..self.rows.len()).filter_map(move |i| self.record(i))
    }

    /// Return a copy with every value in `column_types` coerced where possible.
    ///
    /// Values that cannot be coerced are kept unchanged so that validation can
    /// report them against the original input.
    pub fn coerced<'a, I>(&self, column_types: I) -> Table
    where
        I: IntoIterator<Item = (&'a str, LogicalType)>,
    {
        let targets: Vec<(usize, LogicalType)> = column_types
            .into_iter()
            .filter_map(|(name, ty)| self.column_index(name).map(|idx| (idx, ty)))
            .collect();

        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                for (idx, ty) in &targets {
                    if let Some(v) = row[*idx].coerce(*ty) {
                        row[*idx] = v;
                    }
                }
                row
            })
            .collect();

        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// SHA-256 over the header and every row, hex encoded.
    ///
    /// Two runs over unchanged inputs must yield the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for column in &self.columns {
            hasher.update(column.as_bytes());
            hasher.update([0x1f]);
        }
        hasher.update([0x1e]);
        for row in &self.rows {
            for value in row {
                hasher.update(value.key_token().as_bytes());
                hasher.update([0x1f]);
            }
            hasher.update([0x1e]);
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_coercion_rejects_free_text() {
        assert_eq!(Value::from("42").coerce(LogicalType::Integer), Some(Value::Integer(42)));
        assert_eq!(Value::from("abc").coerce(LogicalType::Integer), None);
        assert_eq!(Value::Float(3.0).coerce(LogicalType::Integer), Some(Value::Integer(3)));
        assert_eq!(Value::Float(3.5).coerce(LogicalType::Integer), None);
        assert_eq!(Value::Boolean(true).coerce(LogicalType::Integer), None);
    }

    #[test]
    fn text_accepts_scalars_and_null_passes_everywhere() {
        assert_eq!(Value::Integer(100001).coerce(LogicalType::Text), Some(Value::from("100001")));
        assert!(Value::Null.conforms_to(LogicalType::Datetime));
        assert!(Value::Null.conforms_to(LogicalType::Integer));
    }

    #[test]
    fn datetime_parses_common_layouts() {
        assert!(Value::from("2024-06-01").conforms_to(LogicalType::Datetime));
        assert!(Value::from("2024-06-01 08:30:00").conforms_to(LogicalType::Datetime));
        assert!(Value::from("2024-06-01T08:30:00Z").conforms_to(LogicalType::Datetime));
        assert!(!Value::from("June first").conforms_to(LogicalType::Datetime));
    }

    #[test]
    fn boolean_accepts_flags() {
        assert_eq!(Value::from("Yes").coerce(LogicalType::Boolean), Some(Value::Boolean(true)));
        assert_eq!(Value::Integer(0).coerce(LogicalType::Boolean), Some(Value::Boolean(false)));
        assert_eq!(Value::Integer(2).coerce(LogicalType::Boolean), None);
    }

    #[test]
    fn push_row_checks_arity() {
        let mut table = Table::new(["id", "name"]);
        let err = table.push_row(vec![Value::Integer(1)]).unwrap_err();
        assert_eq!(err, TableError::ArityMismatch { expected: 2, found: 1 });
        assert!(table.is_empty());
    }

    #[test]
    fn push_record_fills_missing_columns_with_null() {
        let mut table = Table::new(["id", "name"]);
        let mut record = Row::new();
        record.insert("id".into(), Value::Integer(7));
        table.push_record(&record).unwrap();
        assert_eq!(table.value(0, "name"), Some(&Value::Null));

        record.insert("other".into(), Value::Integer(1));
        assert_eq!(
            table.push_record(&record).unwrap_err(),
            TableError::UnknownColumn("other".into())
        );
    }

    #[test]
    fn coerced_keeps_values_that_do_not_fit() {
        let table = Table::new(["n"])
            .with_row(["12"])
            .unwrap()
            .with_row(["abc"])
            .unwrap();
        let coerced = table.coerced([("n", LogicalType::Integer)]);
        assert_eq!(coerced.value(0, "n"), Some(&Value::Integer(12)));
        assert_eq!(coerced.value(1, "n"), Some(&Value::from("abc")));
    }

    #[test]
    fn fingerprint_tracks_content_and_order() {
        let a = Table::new(["id"]).with_row([1i64]).unwrap().with_row([2i64]).unwrap();
        let b = Table::new(["id"]).with_row([1i64]).unwrap().with_row([2i64]).unwrap();
        let c = Table::new(["id"]).with_row([2i64]).unwrap().with_row([1i64]).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn values_serialize_as_plain_json() {
        let mut row = Row::new();
        row.insert("n".into(), Value::Integer(3));
        row.insert("s".into(), Value::Null);
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"{"n":3,"s":null}"#);
    }
}
