use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::debug;

use crate::pipeline::{Dependencies, ExtractionContext, ExtractionResult, Extractor, ExtractorDescriptor};
use crate::schema::TableContract;
use crate::sources::{read_yaml_records, YamlRecords};
use crate::types::Table;

use super::conform;

/// Loads one table from a list of YAML records.
///
/// With a contract, the table carries every contract column (absent fields
/// become null) followed by any extra fields in the order the file first spells them.
pub struct YamlRecordsExtractor {
    descriptor: ExtractorDescriptor,
    table: String,
    path: PathBuf,
    key: Option<String>,
    contract: Option<TableContract>,
}

impl YamlRecordsExtractor {
    pub fn new(name: impl Into<String>, table: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let table = table.into();
        Self {
            descriptor: ExtractorDescriptor::new(name).outputs([table.clone()]),
            table,
            path: path.into(),
            key: None,
            contract: None,
        }
    }

    pub fn depends_on<I, S>(mut self, extractors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor = self.descriptor.depends_on(extractors);
        self
    }

    /// Read the list stored under this top-level key.
    pub fn under_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_contract(mut self, contract: TableContract) -> Self {
        self.contract = Some(contract);
        self
    }
}

impl Extractor for YamlRecordsExtractor {
    fn descriptor(&self) -> &ExtractorDescriptor {
        &self.descriptor
    }

    fn extract(
        &self,
        context: &ExtractionContext,
        _dependencies: &Dependencies<'_>,
    ) -> anyhow::Result<ExtractionResult> {
        let path = context.paths.resolve(&self.path);
        debug!(extractor = %self.descriptor.name, path = %path.display(), "reading YAML source");
        let records = read_yaml_records(&path, self.key.as_deref())
            .with_context(|| format!("{} could not load '{}'", self.descriptor.name, self.table))?;
        if records.is_empty() {
            bail!("no records found in {}", path.display());
        }

        let table = records_table(&records, self.contract.as_ref())?;
        Ok(ExtractionResult::new()
            .with_table(self.table.clone(), table)
            .with_metric(format!("{}.rows_read", self.descriptor.name), records.len()))
    }
}

/// Contract columns first, then the remaining record fields, coerced to the contract.
pub(crate) fn records_table(records: &YamlRecords, contract: Option<&TableContract>) -> anyhow::Result<Table> {
    let mut columns: Vec<String> = contract
        .iter()
        .flat_map(|c| c.column_names().map(str::to_string))
        .collect();
    for field in &records.fields {
        if !columns.contains(field) {
            columns.push(field.clone());
        }
    }

    let mut table = Table::new(columns);
    for record in &records.records {
        table.push_record(record)?;
    }
    Ok(conform(table, contract))
}
