use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::anyhow;

use crate::types::Table;

/// Name, outputs and upstream dependencies of an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorDescriptor {
    pub name: String,
    pub outputs: Vec<String>,
    pub depends_on: Vec<String>,
}

impl ExtractorDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outputs: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn outputs<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn depends_on<I, S>(mut self, extractors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = extractors.into_iter().map(Into::into).collect();
        self
    }
}

/// Local inputs every extractor may read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePaths {
    pub data_dir: PathBuf,
}

impl SourcePaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Resolve `path` against the data directory unless it is absolute.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}

/// Read-only context handed to every extractor.
///
/// The pipeline passes it through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionContext {
    pub paths: SourcePaths,
    pub settings: BTreeMap<String, String>,
}

impl ExtractionContext {
    pub fn new(paths: SourcePaths) -> Self {
        Self {
            paths,
            settings: BTreeMap::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}

/// Tables an extractor returned, plus any metrics it wants recorded.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub tables: BTreeMap<String, Table>,
    pub metrics: BTreeMap<String, serde_json::Value>,
}

impl ExtractionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, table: Table) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }
}

/// Upstream tables visible to one extractor.
///
/// Only the outputs of extractors named in `depends_on` are present, so an
/// extractor cannot read around the dependency graph.
#[derive(Debug, Default)]
pub struct Dependencies<'a> {
    tables: BTreeMap<&'a str, &'a Table>,
    producers: BTreeMap<&'a str, Vec<&'a str>>,
}

impl<'a> Dependencies<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, producer: &'a str, table_name: &'a str, table: &'a Table) {
        self.tables.insert(table_name, table);
        self.producers.entry(producer).or_default().push(table_name);
    }

    pub fn get(&self, table: &str) -> Option<&'a Table> {
        self.tables.get(table).copied()
    }

    /// Like [`Dependencies::get`], failing when the table is not an upstream output.
    pub fn table(&self, table: &str) -> anyhow::Result<&'a Table> {
        self.get(table).ok_or_else(|| {
            anyhow!(
                "table '{}' is not provided by any declared dependency (available: {})",
                table,
                self.table_names().collect::<Vec<_>>().join(", ")
            )
        })
    }

    /// Tables produced by the named upstream extractor.
    pub fn from_extractor(&self, extractor: &str) -> Vec<(&'a str, &'a Table)> {
        self.producers
            .get(extractor)
            .map(|names| names.iter().map(|n| (*n, self.tables[n])).collect())
            .unwrap_or_default()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.tables.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// A unit of work producing one or more tables.
pub trait Extractor {
    fn descriptor(&self) -> &ExtractorDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Produce every declared output from the context and upstream tables.
    fn extract(
        &self,
        context: &ExtractionContext,
        dependencies: &Dependencies<'_>,
    ) -> anyhow::Result<ExtractionResult>;
}

type ExtractFn =
    dyn Fn(&ExtractionContext, &Dependencies<'_>) -> anyhow::Result<ExtractionResult>;

/// Extractor backed by a closure, for small derived tables and tests.
pub struct FnExtractor {
    descriptor: ExtractorDescriptor,
    extract: Box<ExtractFn>,
}

impl FnExtractor {
    pub fn new<F>(descriptor: ExtractorDescriptor, extract: F) -> Self
    where
        F: Fn(&ExtractionContext, &Dependencies<'_>) -> anyhow::Result<ExtractionResult> + 'static,
    {
        Self {
            descriptor,
            extract: Box::new(extract),
        }
    }
}

impl Extractor for FnExtractor {
    fn descriptor(&self) -> &ExtractorDescriptor {
        &self.descriptor
    }

    fn extract(
        &self,
        context: &ExtractionContext,
        dependencies: &Dependencies<'_>,
    ) -> anyhow::Result<ExtractionResult> {
        (self.extract)(context, dependencies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_under_data_dir() {
        let paths = SourcePaths::new("/srv/data");
        assert_eq!(paths.resolve("psgc.csv"), PathBuf::from("/srv/data/psgc.csv"));
        assert_eq!(paths.resolve("/tmp/x.csv"), PathBuf::from("/tmp/x.csv"));
    }

    #[test]
    fn dependencies_only_expose_upstream_tables() {
        let table = Table::new(["id"]);
        let mut deps = Dependencies::new();
        deps.insert("base", "x", &table);

        assert!(deps.table("x").is_ok());
        let err = deps.table("y").unwrap_err().to_string();
        assert!(err.contains("'y'"), "{err}");
        assert_eq!(deps.from_extractor("base").len(), 1);
        assert!(deps.from_extractor("other").is_empty());
    }

    #[test]
    fn fn_extractor_delegates_to_closure() {
        let extractor = FnExtractor::new(
            ExtractorDescriptor::new("constant").outputs(["t"]),
            |_, _| Ok(ExtractionResult::new().with_table("t", Table::new(["a"]))),
        );
        let ctx = ExtractionContext::new(SourcePaths::new("."));
        let result = extractor.extract(&ctx, &Dependencies::new()).unwrap();
        assert_eq!(extractor.name(), "constant");
        assert!(result.tables.contains_key("t"));
    }
}
