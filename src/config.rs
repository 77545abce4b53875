//! `foundation.toml` loading and the objects built from it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::constants::{
    DEFAULT_CONFIG_FILE, DEFAULT_DATA_DIR, DEFAULT_DB_FILE, DEFAULT_LOG_DIR, DEFAULT_LOG_FILE,
    DEFAULT_SAMPLE_ROWS, ENV_CONFIG, ENV_DATA_DIR, ENV_DB_FILE, ENV_LOG_DIR,
};
use crate::error::{ConfigError, DefinitionError};
use crate::extractors::{CsvTableExtractor, GenericsExtractor, YamlRecordsExtractor};
use crate::pipeline::{ExtractionContext, Extractor, SourcePaths, Validator};
use crate::schema::{SchemaRegistry, TableContract};
use crate::sources::CsvOptions;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    pub data_dir: PathBuf,
    pub db_file: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            db_file: PathBuf::from(DEFAULT_DB_FILE),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationSettings {
    pub sample_rows: usize,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            sample_rows: DEFAULT_SAMPLE_ROWS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    pub dir: PathBuf,
    pub file: String,
    /// Also write JSON lines to a daily-rolling file under `dir`.
    pub json_file: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_LOG_DIR),
            file: DEFAULT_LOG_FILE.to_string(),
            json_file: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Csv,
    Yaml,
    /// One YAML file holding the school_sizes, school_grades and school_epochs lists.
    Generics,
}

/// One `[[extractors]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractorConfig {
    pub name: String,
    pub kind: SourceKind,
    pub path: PathBuf,
    /// Output table; defaults to the extractor name. Not used by generics.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// YAML only: top-level key holding the record list.
    #[serde(default)]
    pub key: Option<String>,
    /// CSV only: single-byte field delimiter.
    #[serde(default)]
    pub delimiter: Option<char>,
}

fn enabled_by_default() -> bool {
    true
}

impl ExtractorConfig {
    pub fn table(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("extractor with an empty name".into()));
        }
        match self.kind {
            SourceKind::Csv if self.key.is_some() => Err(ConfigError::Invalid(format!(
                "extractor '{}': `key` only applies to yaml sources",
                self.name
            ))),
            SourceKind::Yaml if self.delimiter.is_some() => Err(ConfigError::Invalid(format!(
                "extractor '{}': `delimiter` only applies to csv sources",
                self.name
            ))),
            SourceKind::Generics
                if self.table.is_some() || self.key.is_some() || self.delimiter.is_some() =>
            {
                Err(ConfigError::Invalid(format!(
                    "extractor '{}': generics sources take no `table`, `key` or `delimiter`",
                    self.name
                )))
            }
            _ => match self.delimiter {
                Some(d) if !d.is_ascii() => Err(ConfigError::Invalid(format!(
                    "extractor '{}': delimiter '{}' is not a single byte",
                    self.name, d
                ))),
                _ => Ok(()),
            },
        }
    }

    fn build(&self, registry: &SchemaRegistry) -> Box<dyn Extractor> {
        let contract = registry.get(self.table()).cloned();
        match self.kind {
            SourceKind::Csv => {
                let mut extractor = CsvTableExtractor::new(&self.name, self.table(), &self.path)
                    .depends_on(self.depends_on.iter().cloned());
                if let Some(d) = self.delimiter {
                    extractor = extractor.with_options(CsvOptions { delimiter: d as u8 });
                }
                if let Some(contract) = contract {
                    extractor = extractor.with_contract(contract);
                }
                Box::new(extractor)
            }
            SourceKind::Yaml => {
                let mut extractor = YamlRecordsExtractor::new(&self.name, self.table(), &self.path)
                    .depends_on(self.depends_on.iter().cloned());
                if let Some(key) = &self.key {
                    extractor = extractor.under_key(key);
                }
                if let Some(contract) = contract {
                    extractor = extractor.with_contract(contract);
                }
                Box::new(extractor)
            }
            SourceKind::Generics => Box::new(
                GenericsExtractor::new(&self.name, &self.path)
                    .depends_on(self.depends_on.iter().cloned())
                    .with_registry(registry),
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub paths: PathSettings,
    pub validation: ValidationSettings,
    pub logging: LoggingSettings,
    /// Free-form values handed to every extractor.
    pub settings: BTreeMap<String, String>,
    /// Contracts beyond the built-in ones.
    pub tables: Vec<TableContract>,
    pub extractors: Vec<ExtractorConfig>,
    /// File this configuration was read from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load configuration.
    ///
    /// Lookup order: `explicit`, then `FOUNDATION_CONFIG`, then
    /// `foundation.toml` in the working directory. Only the last may be
    /// absent, in which case defaults apply. Relative paths inside the file
    /// resolve against the file's directory.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(ENV_CONFIG).map(PathBuf::from));
        let mut config = match named {
            Some(path) => Self::from_file(&path)?,
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    debug!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        config.check()?;
        Ok(config)
    }

    /// Parse a config file without consulting the environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.rebase(base);
        }
        debug!(path = %path.display(), extractors = config.extractors.len(), "parsed configuration");
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    fn rebase(&mut self, base: &Path) {
        for path in [
            &mut self.paths.data_dir,
            &mut self.paths.db_file,
            &mut self.logging.dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Some(dir) = std::env::var_os(ENV_DATA_DIR) {
            self.paths.data_dir = PathBuf::from(dir);
        }
        if let Some(db) = std::env::var_os(ENV_DB_FILE) {
            self.paths.db_file = PathBuf::from(db);
        }
        if let Some(dir) = std::env::var_os(ENV_LOG_DIR) {
            self.logging.dir = PathBuf::from(dir);
        }
    }

    /// Checks that need no contracts; dependency and table checks happen when
    /// the pipeline is assembled.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.validation.sample_rows == 0 {
            return Err(ConfigError::Invalid(
                "validation.sample_rows must be at least 1".into(),
            ));
        }
        for extractor in &self.extractors {
            extractor.check()?;
        }
        Ok(())
    }

    /// Built-in contracts plus `[[tables]]`.
    pub fn registry(&self) -> Result<SchemaRegistry, DefinitionError> {
        let mut registry = SchemaRegistry::with_builtins()?;
        for contract in &self.tables {
            registry.register(contract.clone())?;
        }
        Ok(registry)
    }

    /// Enabled extractors, in file order.
    pub fn extractors(&self, registry: &SchemaRegistry) -> Vec<Box<dyn Extractor>> {
        self.extractors
            .iter()
            .filter(|e| {
                if !e.enabled {
                    info!(extractor = %e.name, "extractor disabled, skipping");
                }
                e.enabled
            })
            .map(|e| e.build(registry))
            .collect()
    }

    pub fn context(&self) -> ExtractionContext {
        let mut context = ExtractionContext::new(SourcePaths::new(&self.paths.data_dir));
        for (key, value) in &self.settings {
            context = context.with_setting(key, value);
        }
        context
    }

    pub fn validator(&self) -> Validator {
        Validator::new(self.validation.sample_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[paths]
data_dir = "inputs"

[validation]
sample_rows = 3

[logging]
json_file = false

[settings]
school_year = "2023-2024"

[[tables]]
name = "schools"
primary_key = ["school_id"]
columns = [
  { name = "school_id", type = "integer", nullable = false },
  { name = "name", type = "text" },
]

[[extractors]]
name = "schools"
kind = "csv"
path = "schools.csv"
delimiter = ";"

[[extractors]]
name = "regions"
kind = "yaml"
path = "regions.yml"
table = "region_names"
key = "region_names"
depends_on = ["schools"]

[[extractors]]
name = "legacy"
kind = "csv"
path = "legacy.csv"
enabled = false
"#;

    #[test]
    fn parses_every_section() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.paths.data_dir, PathBuf::from("inputs"));
        assert_eq!(config.paths.db_file, PathBuf::from(DEFAULT_DB_FILE));
        assert_eq!(config.validation.sample_rows, 3);
        assert!(!config.logging.json_file);
        assert_eq!(config.extractors.len(), 3);
        assert_eq!(config.extractors[1].table(), "region_names");
        assert_eq!(config.extractors[0].table(), "schools");
        assert_eq!(config.extractors[0].delimiter, Some(';'));
        config.check().unwrap();
    }

    #[test]
    fn disabled_extractors_are_not_built() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let registry = config.registry().unwrap();
        let names: Vec<String> = config
            .extractors(&registry)
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["schools", "regions"]);
    }

    #[test]
    fn registry_adds_configured_tables_to_builtins() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let registry = config.registry().unwrap();
        assert!(registry.contains("schools"));
        assert!(registry.contains("psgc"));
    }

    #[test]
    fn redefining_a_builtin_contract_is_rejected() {
        let config = Config::from_toml(
            r#"
[[tables]]
name = "psgc"
columns = [{ name = "id", type = "integer" }]
"#,
        )
        .unwrap();
        assert!(matches!(
            config.registry().unwrap_err(),
            DefinitionError::DuplicateContract { .. }
        ));
    }

    #[test]
    fn settings_reach_the_context() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.context().setting("school_year"), Some("2023-2024"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("[paths]\ndata = \"x\"\n").is_err());
    }

    #[test]
    fn misplaced_source_options_are_rejected() {
        let config = Config::from_toml(
            "[[extractors]]\nname = \"a\"\nkind = \"csv\"\npath = \"a.csv\"\nkey = \"rows\"\n",
        )
        .unwrap();
        assert!(matches!(config.check(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn file_paths_resolve_next_to_the_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foundation.toml");
        fs::write(&path, SAMPLE).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
        assert_eq!(config.paths.data_dir, dir.path().join("inputs"));
        assert_eq!(config.paths.db_file, dir.path().join(DEFAULT_DB_FILE));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Config::from_file(Path::new("/nonexistent/foundation.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn defaults_have_no_source_file() {
        assert!(Config::from_toml("").unwrap().source.is_none());
    }

    #[test]
    fn generics_extractor_emits_the_reference_tables() {
        let config = Config::from_toml(
            "[[extractors]]\nname = \"generics\"\nkind = \"generics\"\npath = \"generics.yml\"\n",
        )
        .unwrap();
        config.check().unwrap();
        let registry = config.registry().unwrap();
        let extractors = config.extractors(&registry);
        assert_eq!(
            extractors[0].descriptor().outputs,
            vec!["school_sizes", "school_grades", "school_epochs"]
        );
    }

    #[test]
    fn generics_extractor_takes_no_table() {
        let config = Config::from_toml(
            "[[extractors]]\nname = \"g\"\nkind = \"generics\"\npath = \"g.yml\"\ntable = \"school_sizes\"\n",
        )
        .unwrap();
        assert!(matches!(config.check(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_sample_rows_is_invalid() {
        let config = Config::from_toml("[validation]\nsample_rows = 0\n").unwrap();
        assert!(config.check().is_err());
    }
}
