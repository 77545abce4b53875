//! File-backed extractors declared in configuration.

pub mod csv_table;
pub mod generics;
pub mod yaml_records;

pub use csv_table::CsvTableExtractor;
pub use generics::{GenericsExtractor, GENERIC_TABLES};
pub use yaml_records::YamlRecordsExtractor;

use crate::schema::TableContract;
use crate::types::Table;

/// Coerce `table` to its contract types when a contract is known.
pub(crate) fn conform(table: Table, contract: Option<&TableContract>) -> Table {
    match contract {
        Some(contract) => table.coerced(contract.column_types()),
        None => table,
    }
}
