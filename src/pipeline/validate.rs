//! Contract enforcement for produced tables.
//!
//! Checks run in a fixed order: column presence, type conformance,
//! nullability, primary-key uniqueness. The first category that finds
//! anything wins and every violation in that category is reported together.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::constants::DEFAULT_SAMPLE_ROWS;
use crate::schema::TableContract;
use crate::types::{LogicalType, Row, Table, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    ColumnPresence,
    TypeConformance,
    Nullability,
    PrimaryKey,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ViolationKind::ColumnPresence => "column presence",
            ViolationKind::TypeConformance => "type conformance",
            ViolationKind::Nullability => "nullability",
            ViolationKind::PrimaryKey => "primary key uniqueness",
        };
        f.write_str(label)
    }
}

/// One problem found in a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub columns: Vec<String>,
    pub detail: String,
    /// Offending rows (or key occurrences) in the whole table.
    pub count: usize,
    pub sample: Vec<Row>,
}

/// Every violation of the first failing check category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationFailure {
    pub table: String,
    pub kind: ViolationKind,
    pub violations: Vec<Violation>,
    /// Violations found but not listed because of the sample bound.
    pub omitted: usize,
}

impl ValidationFailure {
    pub fn columns(&self) -> Vec<&str> {
        self.violations
            .iter()
            .flat_map(|v| v.columns.iter().map(String::as_str))
            .collect()
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table '{}' failed {} check", self.table, self.kind)?;
        for violation in &self.violations {
            write!(f, "; [{}] {}", violation.columns.join(", "), violation.detail)?;
            if !violation.sample.is_empty() {
                let sample = serde_json::to_string(&violation.sample).map_err(|_| fmt::Error)?;
                write!(f, " sample={sample}")?;
            }
        }
        if self.omitted > 0 {
            write!(f, "; {} more not shown", self.omitted)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    Fail(ValidationFailure),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn into_result(self) -> Result<(), ValidationFailure> {
        match self {
            Verdict::Pass => Ok(()),
            Verdict::Fail(failure) => Err(failure),
        }
    }
}

/// Checks tables against their contracts.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    sample_rows: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_ROWS)
    }
}

impl Validator {
    /// `sample_rows` bounds both sampled rows per violation and listed duplicate keys.
    pub fn new(sample_rows: usize) -> Self {
        Self {
            sample_rows: sample_rows.max(1),
        }
    }

    pub fn sample_rows(&self) -> usize {
        self.sample_rows
    }

    pub fn validate(&self, table: &Table, contract: &TableContract) -> Verdict {
        let checks: [(ViolationKind, fn(&Self, &Table, &TableContract) -> Vec<Violation>); 4] = [
            (ViolationKind::ColumnPresence, Self::check_presence),
            (ViolationKind::TypeConformance, Self::check_types),
            (ViolationKind::Nullability, Self::check_nulls),
            (ViolationKind::PrimaryKey, Self::check_primary_key),
        ];

        for (kind, check) in checks {
            let mut violations = check(self, table, contract);
            if violations.is_empty() {
                continue;
            }
            let omitted = violations.len().saturating_sub(self.listed_limit(kind));
            violations.truncate(self.listed_limit(kind));
            return Verdict::Fail(ValidationFailure {
                table: contract.table_name.clone(),
                kind,
                violations,
                omitted,
            });
        }
        Verdict::Pass
    }

    // Duplicate keys produce one violation each and are bounded like rows;
    // other categories produce at most one violation per column.
    fn listed_limit(&self, kind: ViolationKind) -> usize {
        match kind {
            ViolationKind::PrimaryKey => self.sample_rows,
            _ => usize::MAX,
        }
    }

    fn check_presence(&self, table: &Table, contract: &TableContract) -> Vec<Violation> {
        let mut violations = Vec::new();
        let present: HashSet<&str> = table.columns().iter().map(String::as_str).collect();

        let missing: Vec<String> = contract
            .column_names()
            .filter(|c| !present.contains(c))
            .map(String::from)
            .collect();
        if !missing.is_empty() {
            violations.push(presence(missing, "missing from table"));
        }

        let unexpected: Vec<String> = table
            .columns()
            .iter()
            .filter(|c| contract.column(c).is_none())
            .cloned()
            .collect();
        if !unexpected.is_empty() {
            violations.push(presence(unexpected, "not declared in contract"));
        }

        let mut seen = HashSet::new();
        let mut duplicated: Vec<String> = Vec::new();
        for column in table.columns() {
            if !seen.insert(column.as_str()) && !duplicated.contains(column) {
                duplicated.push(column.clone());
            }
        }
        if !duplicated.is_empty() {
            violations.push(presence(duplicated, "appears more than once in table header"));
        }

        violations
    }

    fn check_types(&self, table: &Table, contract: &TableContract) -> Vec<Violation> {
        let mut violations = Vec::new();
        for column in &contract.columns {
            let Some(values) = table.column_values(&column.name) else {
                continue;
            };
            let offending: Vec<usize> = values
                .enumerate()
                .filter(|(_, v)| !v.is_null() && !v.conforms_to(column.logical_type))
                .map(|(i, _)| i)
                .collect();
            let Some(&first) = offending.first() else {
                continue;
            };
            let example = table.value(first, &column.name).cloned().unwrap_or(Value::Null);
            violations.push(Violation {
                kind: ViolationKind::TypeConformance,
                columns: vec![column.name.clone()],
                detail: format!(
                    "{} value(s) not coercible to {} (first: {} '{}')",
                    offending.len(),
                    column.logical_type,
                    example.kind(),
                    example
                ),
                count: offending.len(),
                sample: self.sample(table, &offending),
            });
        }
        violations
    }

    fn check_nulls(&self, table: &Table, contract: &TableContract) -> Vec<Violation> {
        let mut violations = Vec::new();
        for column in contract.columns.iter().filter(|c| !c.nullable) {
            let Some(values) = table.column_values(&column.name) else {
                continue;
            };
            let offending: Vec<usize> = values
                .enumerate()
                .filter(|(_, v)| v.is_null())
                .map(|(i, _)| i)
                .collect();
            if offending.is_empty() {
                continue;
            }
            violations.push(Violation {
                kind: ViolationKind::Nullability,
                columns: vec![column.name.clone()],
                detail: format!("{} null value(s) in non-nullable column", offending.len()),
                count: offending.len(),
                sample: self.sample(table, &offending),
            });
        }
        violations
    }

    fn check_primary_key(&self, table: &Table, contract: &TableContract) -> Vec<Violation> {
        if contract.primary_key.is_empty() {
            return Vec::new();
        }

        let key_columns: Vec<(usize, &str, LogicalType)> = contract
            .primary_key
            .iter()
            .filter_map(|name| {
                let idx = table.column_index(name)?;
                let ty = contract.column(name)?.logical_type;
                Some((idx, name.as_str(), ty))
            })
            .collect();

        // first-seen order of keys keeps the report deterministic
        let mut groups: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
        let mut key_order: Vec<Vec<String>> = Vec::new();
        for (row_idx, row) in table.rows().enumerate() {
            let key: Vec<String> = key_columns
                .iter()
                .map(|(idx, _, ty)| {
                    let value = &row[*idx];
                    value.coerce(*ty).unwrap_or_else(|| value.clone()).key_token()
                })
                .collect();
            let rows = groups.entry(key.clone()).or_default();
            if rows.is_empty() {
                key_order.push(key);
            }
            rows.push(row_idx);
        }

        let columns: Vec<String> = key_columns.iter().map(|(_, n, _)| n.to_string()).collect();
        key_order
            .into_iter()
            .filter_map(|key| {
                let rows = &groups[&key];
                if rows.len() < 2 {
                    return None;
                }
                let rendered: Vec<String> = key_columns
                    .iter()
                    .map(|(_, name, _)| {
                        let value = table.value(rows[0], name).cloned().unwrap_or(Value::Null);
                        format!("{name}={value}")
                    })
                    .collect();
                Some(Violation {
                    kind: ViolationKind::PrimaryKey,
                    columns: columns.clone(),
                    detail: format!(
                        "duplicate key ({}) appears {} times",
                        rendered.join(", "),
                        rows.len()
                    ),
                    count: rows.len(),
                    sample: self.sample(table, rows),
                })
            })
            .collect()
    }

    fn sample(&self, table: &Table, rows: &[usize]) -> Vec<Row> {
        rows.iter()
            .take(self.sample_rows)
            .filter_map(|&i| table.record(i))
            .collect()
    }
}

fn presence(columns: Vec<String>, detail: &str) -> Violation {
    Violation {
        kind: ViolationKind::ColumnPresence,
        count: columns.len(),
        detail: detail.to_string(),
        columns,
        sample: Vec::new(),
    }
}
