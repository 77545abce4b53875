use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use rusqlite::types::{ToSqlOutput, Value as SqlValue};
use rusqlite::{params_from_iter, Connection, ToSql};
use tracing::{debug, info};

use crate::metrics;
use crate::pipeline::ResultStore;
use crate::schema::{SchemaRegistry, TableContract};
use crate::types::{Table, Value};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Value::Null => SqlValue::Null,
            Value::Integer(i) => SqlValue::Integer(*i),
            Value::Float(x) => SqlValue::Real(*x),
            Value::Text(s) => return Ok(ToSqlOutput::from(s.as_str())),
            Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
            Value::DateTime(_) => SqlValue::Text(self.to_string()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// `CREATE TABLE` statement derived from a contract.
pub fn create_table_sql(contract: &TableContract) -> String {
    let mut parts: Vec<String> = contract
        .columns
        .iter()
        .map(|c| {
            let mut column = format!("{} {}", quote(&c.name), c.logical_type.sql_type());
            if !c.nullable {
                column.push_str(" NOT NULL");
            }
            column
        })
        .collect();
    if !contract.primary_key.is_empty() {
        let key: Vec<String> = contract.primary_key.iter().map(|k| quote(k)).collect();
        parts.push(format!("PRIMARY KEY ({})", key.join(", ")));
    }
    format!(
        "CREATE TABLE {} (\n    {}\n)",
        quote(&contract.table_name),
        parts.join(",\n    ")
    )
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub tables: usize,
    pub rows: usize,
}

/// Persists a finished result store into a SQLite database.
pub struct SqliteWriter {
    conn: Connection,
    path: PathBuf,
}

impl SqliteWriter {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(&path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self { conn, path })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Replace every table in the store, all or nothing.
    pub fn write_store(
        &mut self,
        store: &ResultStore,
        registry: &SchemaRegistry,
    ) -> anyhow::Result<WriteSummary> {
        let tx = self.conn.transaction()?;
        let mut summary = WriteSummary::default();
        for entry in store.iter() {
            let contract = registry
                .get(&entry.name)
                .ok_or_else(|| anyhow!("no contract for stored table '{}'", entry.name))?;
            write_table(&tx, contract, &entry.table)
                .with_context(|| format!("failed to write table '{}'", entry.name))?;
            debug!(table = %entry.name, rows = entry.table.len(), "wrote table");
            summary.tables += 1;
            summary.rows += entry.table.len();
        }
        tx.commit()?;
        metrics::record_tables_written(summary.tables, summary.rows);
        info!(
            db = %self.path.display(),
            tables = summary.tables,
            rows = summary.rows,
            "persisted result store"
        );
        Ok(summary)
    }
}

fn write_table(conn: &Connection, contract: &TableContract, table: &Table) -> anyhow::Result<()> {
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {};\n{};",
        quote(&contract.table_name),
        create_table_sql(contract)
    ))?;

    let positions = contract
        .column_names()
        .map(|name| {
            table
                .column_index(name)
                .ok_or_else(|| anyhow!("column '{}' missing from validated table", name))
        })
        .collect::<anyhow::Result<Vec<usize>>>()?;
    let columns: Vec<String> = contract.column_names().map(quote).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(&contract.table_name),
        columns.join(", "),
        placeholders.join(", ")
    ))?;
    for row in table.rows() {
        stmt.execute(params_from_iter(positions.iter().map(|&i| &row[i])))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnContract;
    use crate::types::LogicalType;

    fn schools() -> TableContract {
        TableContract::new(
            "schools",
            vec![
                ColumnContract::required("school_id", LogicalType::Integer),
                ColumnContract::new("name", LogicalType::Text),
                ColumnContract::new("public", LogicalType::Boolean),
            ],
        )
        .with_primary_key(["school_id"])
    }

    #[test]
    fn create_statement_follows_the_contract() {
        let sql = create_table_sql(&schools());
        assert!(sql.starts_with("CREATE TABLE \"schools\""));
        assert!(sql.contains("\"school_id\" INTEGER NOT NULL"));
        assert!(sql.contains("\"name\" TEXT"));
        assert!(sql.contains("PRIMARY KEY (\"school_id\")"));
    }

    #[test]
    fn writes_rows_in_contract_order() {
        let registry = SchemaRegistry::from_contracts([schools()]).unwrap();
        // columns deliberately out of contract order
        let table = Table::new(["name", "public", "school_id"])
            .with_row([Value::from("Rizal ES"), Value::from(true), Value::from(100001_i64)])
            .unwrap();
        let mut store = ResultStore::new();
        store.insert("schools", "schools", table).unwrap();

        let mut writer = SqliteWriter::open_in_memory().unwrap();
        let summary = writer.write_store(&store, &registry).unwrap();
        assert_eq!(summary, WriteSummary { tables: 1, rows: 1 });

        let (id, name, public): (i64, String, i64) = writer
            .connection()
            .query_row("SELECT school_id, name, public FROM schools", [], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })
            .unwrap();
        assert_eq!((id, name.as_str(), public), (100001, "Rizal ES", 1));
    }

    #[test]
    fn rewriting_replaces_previous_contents() {
        let registry = SchemaRegistry::from_contracts([schools()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("out").join("foundation.db");

        for ids in [vec![1_i64, 2, 3], vec![7]] {
            let mut table = Table::new(["school_id", "name", "public"]);
            for id in ids {
                table.push_row(vec![id.into(), Value::Null, Value::Null]).unwrap();
            }
            let mut store = ResultStore::new();
            store.insert("schools", "schools", table).unwrap();
            SqliteWriter::open(&db).unwrap().write_store(&store, &registry).unwrap();
        }

        let conn = Connection::open(&db).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schools", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn store_table_without_contract_rolls_back() {
        let registry = SchemaRegistry::from_contracts([schools()]).unwrap();
        let mut store = ResultStore::new();
        store
            .insert("schools", "schools", Table::new(["school_id", "name", "public"]))
            .unwrap();
        store.insert("stray", "x", Table::new(["a"])).unwrap();

        let mut writer = SqliteWriter::open_in_memory().unwrap();
        assert!(writer.write_store(&store, &registry).is_err());
        let exists: i64 = writer
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'schools'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(exists, 0);
    }
}
