use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::debug;

use crate::pipeline::{Dependencies, ExtractionContext, ExtractionResult, Extractor, ExtractorDescriptor};
use crate::schema::{SchemaRegistry, TableContract};
use crate::sources::{load_yaml, records_in};

use super::yaml_records::records_table;

/// Reference tables read from a single generics file, each stored under a
/// top-level key of the same name.
pub const GENERIC_TABLES: [&str; 3] = ["school_sizes", "school_grades", "school_epochs"];

/// Loads every generic reference table from one YAML document.
pub struct GenericsExtractor {
    descriptor: ExtractorDescriptor,
    path: PathBuf,
    contracts: Vec<Option<TableContract>>,
}

impl GenericsExtractor {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            descriptor: ExtractorDescriptor::new(name).outputs(GENERIC_TABLES),
            path: path.into(),
            contracts: vec![None; GENERIC_TABLES.len()],
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

    /// Coerce each table to its registered contract.
    pub fn with_registry(mut self, registry: &SchemaRegistry) -> Self {
        self.contracts = GENERIC_TABLES.iter().map(|t| registry.get(t).cloned()).collect();
        self
    }
}

impl Extractor for GenericsExtractor {
    fn descriptor(&self) -> &ExtractorDescriptor {
        &self.descriptor
    }

    fn extract(
        &self,
        context: &ExtractionContext,
        _dependencies: &Dependencies<'_>,
    ) -> anyhow::Result<ExtractionResult> {
        let path = context.paths.resolve(&self.path);
        debug!(extractor = %self.descriptor.name, path = %path.display(), "reading generics file");
        let document = load_yaml(&path)?;

        let mut result = ExtractionResult::new();
        let mut total = 0;
        for (table, contract) in GENERIC_TABLES.iter().zip(&self.contracts) {
            let records = records_in(&document, &path, Some(table))
                .with_context(|| format!("{} could not load '{}'", self.descriptor.name, table))?;
            if records.is_empty() {
                bail!("no {} records found in {}", table, path.display());
            }
            total += records.len();
            result = result.with_table(*table, records_table(&records, contract.as_ref())?);
        }
        Ok(result.with_metric(format!("{}.rows_read", self.descriptor.name), total))
    }
}
