pub mod build;
pub mod config;
pub mod constants;
pub mod error;
pub mod extractors;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod schema;
pub mod sources;
pub mod storage;
pub mod types;

pub use error::{BuildError, ContractViolation, DefinitionError, ErrorCategory, PipelineError};
pub use pipeline::{Extractor, ExtractorDescriptor, Pipeline, PipelineRun};
pub use schema::{ColumnContract, SchemaRegistry, TableContract};
pub use types::{LogicalType, Table, Value};
