use std::path::Path;

use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;

use crate::types::{Table, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

fn cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Value::Null
    } else {
        Value::Text(trimmed.to_string())
    }
}

/// Read a headed CSV file. Short rows are padded with nulls; long rows are an error.
pub fn read_csv(path: &Path, options: CsvOptions) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(options.delimiter)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let headers = rdr
        .headers()
        .with_context(|| format!("failed to read CSV headers from {}", path.display()))?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
        .collect::<Vec<_>>();
    if headers.iter().all(String::is_empty) {
        bail!("{} has no header row", path.display());
    }

    let mut table = Table::new(headers.iter().cloned());
    for (line, result) in rdr.records().enumerate() {
        let record = result
            .with_context(|| format!("failed to read record {} of {}", line + 1, path.display()))?;
        if record.len() > headers.len() {
            bail!(
                "record {} of {} has {} fields, header has {}",
                line + 1,
                path.display(),
                record.len(),
                headers.len()
            );
        }
        let row = (0..headers.len())
            .map(|idx| record.get(idx).map(cell).unwrap_or(Value::Null))
            .collect();
        table.push_row(row)?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn reads_trimmed_text_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "psgc.csv", "psgc_id, name ,level\n0100000000, Ilocos Region ,\n");
        let table = read_csv(&path, CsvOptions::default()).unwrap();
        assert_eq!(table.columns(), &["psgc_id", "name", "level"]);
        assert_eq!(table.value(0, "psgc_id"), Some(&Value::Text("0100000000".into())));
        assert_eq!(table.value(0, "name"), Some(&Value::Text("Ilocos Region".into())));
        assert_eq!(table.value(0, "level"), Some(&Value::Null));
    }

    #[test]
    fn short_rows_are_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "t.csv", "a;b;c\n1;2\n");
        let table = read_csv(&path, CsvOptions { delimiter: b';' }).unwrap();
        assert_eq!(table.value(0, "c"), Some(&Value::Null));
    }

    #[test]
    fn long_rows_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "t.csv", "a,b\n1,2,3\n");
        let err = read_csv(&path, CsvOptions::default()).unwrap_err();
        assert!(err.to_string().contains("3 fields"), "{err}");
    }

    #[test]
    fn header_only_file_is_an_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "t.csv", "a,b\n");
        let table = read_csv(&path, CsvOptions::default()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns().len(), 2);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_csv(Path::new("/nonexistent/psgc.csv"), CsvOptions::default()).unwrap_err();
        assert!(err.to_string().contains("psgc.csv"));
    }
}
