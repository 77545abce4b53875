use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::validate::ValidationFailure;

/// Authoring errors in extractor descriptors or table contracts.
///
/// These are detected while the pipeline is being assembled, before any
/// extractor runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DefinitionError {
    #[error("extractor '{name}' is registered more than once")]
    DuplicateExtractor { name: String },

    #[error("extractor '{extractor}' declares no output tables")]
    NoOutputs { extractor: String },

    #[error("extractor '{extractor}' declares output '{table}' more than once")]
    DuplicateOutput { extractor: String, table: String },

    #[error("extractor '{extractor}' depends on itself")]
    SelfDependency { extractor: String },

    #[error("extractor '{extractor}' depends on '{dependency}', which is not registered")]
    UnknownDependency { extractor: String, dependency: String },

    #[error("dependency cycle detected: {}", format_cycle(.members))]
    Cycle { members: Vec<String> },

    #[error("table '{table}' is produced by both '{first}' and '{second}'")]
    DuplicateProducer {
        table: String,
        first: String,
        second: String,
    },

    #[error("extractor '{extractor}' outputs '{table}', which has no registered contract")]
    UnregisteredTable { extractor: String, table: String },

    #[error("contract for table '{table}' is registered more than once")]
    DuplicateContract { table: String },

    #[error("contract for table '{table}' declares no columns")]
    EmptyContract { table: String },

    #[error("contract for table '{table}' declares column '{column}' more than once")]
    DuplicateColumn { table: String, column: String },

    #[error("primary key of table '{table}' names unknown column '{column}'")]
    UnknownKeyColumn { table: String, column: String },
}

fn format_cycle(members: &[String]) -> String {
    match members.first() {
        Some(first) => format!("{} -> {}", members.join(" -> "), first),
        None => String::from("<empty>"),
    }
}

/// A produced table broke the contract of its extractor or its schema.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractViolation {
    #[error("declared output table '{table}' was not returned")]
    MissingOutput { table: String },

    #[error("returned table '{table}' is not a declared output")]
    UndeclaredOutput { table: String },

    #[error("{0}")]
    Validation(ValidationFailure),
}

/// Top-level categories a run failure falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Extraction,
    ContractViolation,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Extraction => "extraction",
            ErrorCategory::ContractViolation => "contract violation",
            ErrorCategory::Internal => "internal",
        };
        f.write_str(label)
    }
}

/// The single terminal failure of a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] DefinitionError),

    #[error("extractor '{extractor}' failed: {cause:#}")]
    Extraction {
        extractor: String,
        cause: anyhow::Error,
    },

    #[error("extractor '{extractor}' violated its contract: {violation}")]
    Contract {
        extractor: String,
        violation: ContractViolation,
    },

    #[error("pipeline defect: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::Configuration(_) => ErrorCategory::Configuration,
            PipelineError::Extraction { .. } => ErrorCategory::Extraction,
            PipelineError::Contract { .. } => ErrorCategory::ContractViolation,
            PipelineError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Name of the extractor responsible, when the failure happened mid-run.
    pub fn extractor(&self) -> Option<&str> {
        match self {
            PipelineError::Extraction { extractor, .. }
            | PipelineError::Contract { extractor, .. } => Some(extractor),
            _ => None,
        }
    }

    pub fn validation_failure(&self) -> Option<&ValidationFailure> {
        match self {
            PipelineError::Contract {
                violation: ContractViolation::Validation(failure),
                ..
            } => Some(failure),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self.category() {
            ErrorCategory::Configuration => 2,
            ErrorCategory::Extraction => 3,
            ErrorCategory::ContractViolation => 4,
            ErrorCategory::Internal => 70,
        }
    }
}

/// Errors raised while assembling a table row by row.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("row has {found} values but the table has {expected} columns")]
    ArityMismatch { expected: usize, found: usize },

    #[error("record has column '{0}', which the table does not declare")]
    UnknownColumn(String),
}

/// Errors loading the configuration file or environment.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure of a whole `build`: the pipeline itself, or persisting its output.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("failed to persist tables to '{path}': {cause:#}")]
    Persistence { path: PathBuf, cause: anyhow::Error },
}

impl BuildError {
    /// Human label of the failure category.
    pub fn category_label(&self) -> String {
        match self {
            BuildError::Config(_) => ErrorCategory::Configuration.to_string(),
            BuildError::Pipeline(e) => e.category().to_string(),
            BuildError::Persistence { .. } => String::from("persistence"),
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            BuildError::Config(_) => 2,
            BuildError::Pipeline(e) => e.exit_code(),
            BuildError::Persistence { .. } => 5,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_closes_the_loop() {
        let err = DefinitionError::Cycle {
            members: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn categories_map_to_distinct_exit_codes() {
        let config = PipelineError::from(DefinitionError::SelfDependency {
            extractor: "a".into(),
        });
        let extraction = PipelineError::Extraction {
            extractor: "a".into(),
            cause: anyhow::anyhow!("missing file"),
        };
        let internal = PipelineError::Internal("store overwrite".into());

        assert_eq!(config.category(), ErrorCategory::Configuration);
        assert_eq!(extraction.category(), ErrorCategory::Extraction);
        assert_eq!(extraction.extractor(), Some("a"));
        assert_eq!(internal.category(), ErrorCategory::Internal);
        assert_ne!(config.exit_code(), extraction.exit_code());
        assert_ne!(extraction.exit_code(), internal.exit_code());
    }

    #[test]
    fn extraction_message_carries_the_whole_cause_chain() {
        let cause = anyhow::anyhow!("No such file or directory").context("failed to read data/psgc.csv");
        let err = PipelineError::Extraction {
            extractor: "psgc".into(),
            cause,
        };
        assert_eq!(
            err.to_string(),
            "extractor 'psgc' failed: failed to read data/psgc.csv: No such file or directory"
        );
    }
}
