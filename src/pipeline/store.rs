use std::collections::HashMap;

use crate::error::PipelineError;
use crate::types::Table;

/// A table held by the store together with the extractor that produced it.
#[derive(Debug, Clone)]
pub struct StoredTable {
    pub name: String,
    pub producer: String,
    pub table: Table,
}

/// Append-only mapping from table name to materialized table.
///
/// Tables are kept in insertion order, which is the order they validated in.
#[derive(Debug, Default)]
pub struct ResultStore {
    entries: Vec<StoredTable>,
    index: HashMap<String, usize>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validated table. Replacing an existing table is a pipeline defect.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        producer: impl Into<String>,
        table: Table,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        let producer = producer.into();
        if let Some(&existing) = self.index.get(&name) {
            return Err(PipelineError::Internal(format!(
                "table '{}' from '{}' would overwrite the copy produced by '{}'",
                name, producer, self.entries[existing].producer
            )));
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push(StoredTable {
            name,
            producer,
            table,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.entry(name).map(|e| &e.table)
    }

    pub fn entry(&self, name: &str) -> Option<&StoredTable> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredTable> {
        self.entries.iter()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Total rows across every stored table.
    pub fn total_rows(&self) -> usize {
        self.entries.iter().map(|e| e.table.len()).sum()
    }

    pub fn into_tables(self) -> Vec<(String, Table)> {
        self.entries.into_iter().map(|e| (e.name, e.table)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn keeps_insertion_order() {
        let mut store = ResultStore::new();
        store.insert("z", "a", Table::new(["x"])).unwrap();
        store.insert("b", "a", Table::new(["x"])).unwrap();
        assert_eq!(store.table_names().collect::<Vec<_>>(), vec!["z", "b"]);
        assert_eq!(store.entry("b").unwrap().producer, "a");
    }

    #[test]
    fn refuses_to_overwrite() {
        let mut store = ResultStore::new();
        store.insert("t", "first", Table::new(["x"])).unwrap();
        let err = store.insert("t", "second", Table::new(["y"])).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Internal);
        assert_eq!(store.get("t").unwrap().columns(), &["x".to_string()]);
        assert_eq!(store.len(), 1);
    }
}
