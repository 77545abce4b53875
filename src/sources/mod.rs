//! Readers turning local source files into untyped [`Table`](crate::types::Table)s.
//!
//! Readers never coerce: every non-empty cell comes back as text (CSV) or as
//! the scalar the file spelled (YAML). Typing happens against a contract.

pub mod csv;
pub mod yaml;

pub use self::csv::{read_csv, CsvOptions};
pub use self::yaml::{load_yaml, read_yaml_records, records_in, YamlRecords};
