//! Extractor orchestration: ordering, execution, validation and the result store.

pub mod executor;
pub mod extractor;
pub mod resolve;
pub mod store;
pub mod validate;

pub use executor::{ExtractorOutcome, OutcomeStatus, Pipeline, PipelineRun};
pub use extractor::{
    Dependencies, ExtractionContext, ExtractionResult, Extractor, ExtractorDescriptor, FnExtractor,
    SourcePaths,
};
pub use resolve::resolve_order;
pub use store::{ResultStore, StoredTable};
pub use validate::{ValidationFailure, Validator, Verdict, Violation, ViolationKind};
