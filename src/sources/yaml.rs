use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde_yaml::Value as Yaml;

use crate::types::{Row, Value};

fn scalar(value: &Yaml) -> Option<Value> {
    match value {
        Yaml::Null => Some(Value::Null),
        Yaml::Bool(b) => Some(Value::Boolean(*b)),
        Yaml::Number(n) => Some(match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        }),
        Yaml::String(s) => Some(Value::Text(s.clone())),
        Yaml::Tagged(tagged) => scalar(&tagged.value),
        Yaml::Sequence(_) | Yaml::Mapping(_) => None,
    }
}

/// Flat records read from YAML, with field names in first-seen file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct YamlRecords {
    pub fields: Vec<String>,
    pub records: Vec<Row>,
}

impl YamlRecords {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parse a YAML file into a document for one or more [`records_in`] calls.
pub fn load_yaml(path: &Path) -> Result<Yaml> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Read a list of flat records from a YAML file.
///
/// With `key`, the list is looked up under that top-level key; otherwise the
/// document itself must be the list.
pub fn read_yaml_records(path: &Path, key: Option<&str>) -> Result<YamlRecords> {
    records_in(&load_yaml(path)?, path, key)
}

/// Records of an already parsed document; `path` only labels errors.
pub fn records_in(document: &Yaml, path: &Path, key: Option<&str>) -> Result<YamlRecords> {
    let list = match key {
        Some(key) => document
            .get(key)
            .ok_or_else(|| anyhow!("{} has no top-level '{}' key", path.display(), key))?,
        None => document,
    };
    let Some(items) = list.as_sequence() else {
        bail!("{}: expected a list of records", path.display());
    };

    let mut fields: Vec<String> = Vec::new();
    let mut records = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(mapping) = item.as_mapping() else {
            bail!("{}: record {} is not a mapping", path.display(), i + 1);
        };
        let mut row = Row::new();
        for (k, v) in mapping {
            let column = k
                .as_str()
                .map(str::to_string)
                .or_else(|| scalar(k).map(|s| s.to_string()))
                .ok_or_else(|| anyhow!("{}: record {} has a non-scalar key", path.display(), i + 1))?;
            let value = scalar(v).ok_or_else(|| {
                anyhow!(
                    "{}: record {} field '{}' is a nested collection",
                    path.display(),
                    i + 1,
                    column
                )
            })?;
            if !fields.contains(&column) {
                fields.push(column.clone());
            }
            row.insert(column, value);
        }
        records.push(row);
    }
    Ok(YamlRecords { fields, records })
}
