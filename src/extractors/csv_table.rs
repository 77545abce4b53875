use std::path::PathBuf;

use anyhow::Context;
use tracing::debug;

use crate::pipeline::{Dependencies, ExtractionContext, ExtractionResult, Extractor, ExtractorDescriptor};
use crate::schema::TableContract;
use crate::sources::{read_csv, CsvOptions};

use super::conform;

/// Loads one table from a CSV file under the data directory.
pub struct CsvTableExtractor {
    descriptor: ExtractorDescriptor,
    table: String,
    path: PathBuf,
    options: CsvOptions,
    contract: Option<TableContract>,
}

impl CsvTableExtractor {
    pub fn new(name: impl Into<String>, table: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let table = table.into();
        Self {
            descriptor: ExtractorDescriptor::new(name).outputs([table.clone()]),
            table,
            path: path.into(),
            options: CsvOptions::default(),
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

    pub fn with_options(mut self, options: CsvOptions) -> Self {
        self.options = options;
        self
    }

    /// Coerce cells to this contract's column types before returning.
    pub fn with_contract(mut self, contract: TableContract) -> Self {
        self.contract = Some(contract);
        self
    }
}

impl Extractor for CsvTableExtractor {
    fn descriptor(&self) -> &ExtractorDescriptor {
        &self.descriptor
    }

    fn extract(
        &self,
        context: &ExtractionContext,
        _dependencies: &Dependencies<'_>,
    ) -> anyhow::Result<ExtractionResult> {
        let path = context.paths.resolve(&self.path);
        debug!(extractor = %self.descriptor.name, path = %path.display(), "reading CSV source");
        let raw = read_csv(&path, self.options)
            .with_context(|| format!("{} could not load '{}'", self.descriptor.name, self.table))?;
        let rows = raw.len();
        let table = conform(raw, self.contract.as_ref());
        Ok(ExtractionResult::new()
            .with_table(self.table.clone(), table)
            .with_metric(format!("{}.rows_read", self.descriptor.name), rows))
    }
}
