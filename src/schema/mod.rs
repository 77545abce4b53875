//! Table contracts and the registry that holds them.
//!
//! A contract is pure data: the ordered columns a table must carry, their
//! logical types and nullability, and an optional primary key. The registry
//! is assembled once at process start and is read-only afterwards.

pub mod builtin;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;
use crate::types::LogicalType;

pub use builtin::builtin_contracts;

/// Declared shape of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnContract {
    pub name: String,
    #[serde(rename = "type")]
    pub logical_type: LogicalType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

fn default_nullable() -> bool {
    true
}

impl ColumnContract {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable: true,
            description: String::new(),
        }
    }

    /// Shorthand for a column that may not hold nulls.
    pub fn required(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            nullable: false,
            ..Self::new(name, logical_type)
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Declared shape of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableContract {
    #[serde(rename = "name")]
    pub table_name: String,
    pub columns: Vec<ColumnContract>,
    #[serde(default)]
    pub primary_key: Vec<String>,
}

impl TableContract {
    pub fn new(table_name: impl Into<String>, columns: Vec<ColumnContract>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
            primary_key: Vec::new(),
        }
    }

    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnContract> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// `(name, type)` pairs in declaration order.
    pub fn column_types(&self) -> impl Iterator<Item = (&str, LogicalType)> {
        self.columns.iter().map(|c| (c.name.as_str(), c.logical_type))
    }

    /// Internal consistency: at least one column, unique names, key within columns.
    pub fn check(&self) -> Result<(), DefinitionError> {
        if self.columns.is_empty() {
            return Err(DefinitionError::EmptyContract {
                table: self.table_name.clone(),
            });
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(DefinitionError::DuplicateColumn {
                    table: self.table_name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        if let Some(unknown) = self.primary_key.iter().find(|k| !seen.contains(k.as_str())) {
            return Err(DefinitionError::UnknownKeyColumn {
                table: self.table_name.clone(),
                column: unknown.clone(),
            });
        }

        Ok(())
    }
}

/// Mapping from table name to its contract.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    contracts: Vec<TableContract>,
    index: HashMap<String, usize>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the contracts shipped with the crate.
    pub fn with_builtins() -> Result<Self, DefinitionError> {
        Self::from_contracts(builtin_contracts().iter().cloned())
    }

    pub fn from_contracts<I>(contracts: I) -> Result<Self, DefinitionError>
    where
        I: IntoIterator<Item = TableContract>,
    {
        let mut registry = Self::new();
        for contract in contracts {
            registry.register(contract)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, contract: TableContract) -> Result<(), DefinitionError> {
        contract.check()?;
        if self.index.contains_key(&contract.table_name) {
            return Err(DefinitionError::DuplicateContract {
                table: contract.table_name,
            });
        }
        self.index
            .insert(contract.table_name.clone(), self.contracts.len());
        self.contracts.push(contract);
        Ok(())
    }

    pub fn get(&self, table: &str) -> Option<&TableContract> {
        self.index.get(table).map(|&i| &self.contracts[i])
    }

    pub fn contains(&self, table: &str) -> bool {
        self.index.contains_key(table)
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Contracts in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TableContract> {
        self.contracts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> TableContract {
        TableContract::new(
            "people",
            vec![
                ColumnContract::required("id", LogicalType::Integer),
                ColumnContract::new("name", LogicalType::Text),
            ],
        )
        .with_primary_key(["id"])
    }

    #[test]
    fn registers_and_looks_up_contracts() {
        let registry = SchemaRegistry::from_contracts([people()]).unwrap();
        assert!(registry.contains("people"));
        assert_eq!(registry.get("people").unwrap().primary_key, vec!["id"]);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn rejects_key_outside_columns() {
        let contract = people().with_primary_key(["school_id"]);
        assert_eq!(
            SchemaRegistry::from_contracts([contract]).unwrap_err(),
            DefinitionError::UnknownKeyColumn {
                table: "people".into(),
                column: "school_id".into()
            }
        );
    }

    #[test]
    fn rejects_duplicate_columns_and_tables() {
        let mut dup = people();
        dup.columns.push(ColumnContract::new("name", LogicalType::Text));
        assert!(matches!(
            dup.check(),
            Err(DefinitionError::DuplicateColumn { .. })
        ));

        let err = SchemaRegistry::from_contracts([people(), people()]).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::DuplicateContract {
                table: "people".into()
            }
        );
    }

    #[test]
    fn rejects_empty_contract() {
        let err = TableContract::new("empty", vec![]).check().unwrap_err();
        assert_eq!(err, DefinitionError::EmptyContract { table: "empty".into() });
    }

    #[test]
    fn deserializes_from_toml() {
        let contract: TableContract = toml::from_str(
            r#"
            name = "regions"
            primary_key = ["code"]
            columns = [
                { name = "code", type = "text", nullable = false },
                { name = "population", type = "integer" },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(contract.table_name, "regions");
        assert!(!contract.columns[0].nullable);
        assert!(contract.columns[1].nullable);
        assert_eq!(contract.columns[1].logical_type, LogicalType::Integer);
    }

    #[test]
    fn builtins_are_consistent() {
        let registry = SchemaRegistry::with_builtins().unwrap();
        assert!(registry.contains("enrollment"));
        assert!(registry.contains("region_names"));
    }
}
