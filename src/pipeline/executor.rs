use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::error::{ContractViolation, DefinitionError, PipelineError};
use crate::metrics;
use crate::schema::SchemaRegistry;

use super::extractor::{Dependencies, ExtractionContext, Extractor, ExtractionResult};
use super::resolve::resolve_order;
use super::store::ResultStore;
use super::validate::{Validator, Verdict};

/// What happened to one extractor during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeStatus {
    /// Validated tables with their row counts, in declared output order.
    Succeeded { tables: Vec<(String, usize)> },
    Failed { diagnostic: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorOutcome {
    pub extractor: String,
    pub status: OutcomeStatus,
    pub elapsed_ms: u128,
}

/// Transient state of one pipeline run.
#[derive(Debug)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub store: ResultStore,
    pub outcomes: Vec<ExtractorOutcome>,
    pub metrics: BTreeMap<String, serde_json::Value>,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRun {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            store: ResultStore::new(),
            outcomes: Vec::new(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn into_store(self) -> ResultStore {
        self.store
    }

    /// Names of extractors that completed, in the order they ran.
    pub fn completed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Succeeded { .. }))
            .map(|o| o.extractor.as_str())
            .collect()
    }
}

/// Extractors plus the contracts their outputs must satisfy, ordered and
/// checked for consistency up front.
pub struct Pipeline {
    extractors: Vec<Box<dyn Extractor>>,
    order: Vec<usize>,
    registry: SchemaRegistry,
    validator: Validator,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("order", &self.execution_order())
            .field("contracts", &self.registry.len())
            .field("validator", &self.validator)
            .finish()
    }
}

impl Pipeline {
    /// Assemble a pipeline, rejecting any authoring error before anything runs.
    ///
    /// `extractors` is the static registry; its order is the tie-break for
    /// extractors with no ordering constraint between them.
    pub fn new(
        extractors: Vec<Box<dyn Extractor>>,
        registry: SchemaRegistry,
    ) -> Result<Self, PipelineError> {
        check_outputs(&extractors, &registry)?;
        let descriptors: Vec<_> = extractors.iter().map(|e| e.descriptor()).collect();
        let order = resolve_order(&descriptors)?;
        Ok(Self {
            extractors,
            order,
            registry,
            validator: Validator::default(),
        })
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// Extractors in the order they will run.
    pub fn ordered(&self) -> impl Iterator<Item = &dyn Extractor> {
        self.order.iter().map(|&i| self.extractors[i].as_ref())
    }

    pub fn execution_order(&self) -> Vec<&str> {
        self.ordered().map(|e| e.name()).collect()
    }

    /// Run every extractor once and return the populated run.
    pub fn run(&self, context: &ExtractionContext) -> Result<PipelineRun, PipelineError> {
        let mut run = PipelineRun::new();
        self.execute(context, &mut run)?;
        Ok(run)
    }

    /// Run into a caller-owned [`PipelineRun`], so the partial state stays
    /// inspectable after a failure.
    pub fn execute(
        &self,
        context: &ExtractionContext,
        run: &mut PipelineRun,
    ) -> Result<(), PipelineError> {
        let span = info_span!("pipeline_run", run_id = %run.run_id);
        let _enter = span.enter();
        info!(extractors = self.extractors.len(), order = %self.execution_order().join(", "), "starting pipeline run");

        for extractor in self.ordered() {
            let name = extractor.name().to_string();
            let timer = metrics::time_extractor(&name);
            let started = Instant::now();

            let outcome = self.run_one(extractor, context, run);
            let elapsed_ms = started.elapsed().as_millis();
            drop(timer);

            match outcome {
                Ok(tables) => {
                    metrics::record_extractor_success(&name, tables.iter().map(|(_, rows)| *rows).sum());
                    run.outcomes.push(ExtractorOutcome {
                        extractor: name,
                        status: OutcomeStatus::Succeeded { tables },
                        elapsed_ms,
                    });
                }
                Err(err) => {
                    error!(extractor = %name, category = %err.category(), "{err}");
                    metrics::record_extractor_failure(&name, err.category());
                    run.outcomes.push(ExtractorOutcome {
                        extractor: name,
                        status: OutcomeStatus::Failed {
                            diagnostic: err.to_string(),
                        },
                        elapsed_ms,
                    });
                    return Err(err);
                }
            }
        }

        info!(
            tables = run.store.len(),
            rows = run.store.total_rows(),
            "pipeline run completed"
        );
        Ok(())
    }

    fn run_one(
        &self,
        extractor: &dyn Extractor,
        context: &ExtractionContext,
        run: &mut PipelineRun,
    ) -> Result<Vec<(String, usize)>, PipelineError> {
        let descriptor = extractor.descriptor();
        info!(extractor = %descriptor.name, depends_on = ?descriptor.depends_on, "starting extractor");

        let result = {
            let dependencies = self.gather(extractor, &run.store)?;
            extractor
                .extract(context, &dependencies)
                .map_err(|cause| PipelineError::Extraction {
                    extractor: descriptor.name.clone(),
                    cause,
                })?
        };

        let ExtractionResult {
            mut tables,
            metrics: reported,
        } = result;
        let contract_error = |violation| PipelineError::Contract {
            extractor: descriptor.name.clone(),
            violation,
        };

        if let Some(extra) = tables.keys().find(|t| !descriptor.outputs.contains(t)) {
            return Err(contract_error(ContractViolation::UndeclaredOutput {
                table: extra.clone(),
            }));
        }
        if let Some(missing) = descriptor.outputs.iter().find(|t| !tables.contains_key(*t)) {
            return Err(contract_error(ContractViolation::MissingOutput {
                table: missing.clone(),
            }));
        }

        for table_name in &descriptor.outputs {
            let contract = self.registry.get(table_name).ok_or_else(|| {
                PipelineError::Internal(format!(
                    "contract for '{table_name}' disappeared after pipeline construction"
                ))
            })?;
            if let Verdict::Fail(failure) = self.validator.validate(&tables[table_name], contract) {
                metrics::record_validation_failure(table_name, failure.kind);
                return Err(contract_error(ContractViolation::Validation(failure)));
            }
        }

        // everything validated; only now does anything become visible downstream
        let mut summary = Vec::with_capacity(descriptor.outputs.len());
        for table_name in &descriptor.outputs {
            let raw = tables.remove(table_name).ok_or_else(|| {
                PipelineError::Internal(format!("validated table '{table_name}' vanished"))
            })?;
            let contract = self.registry.get(table_name).ok_or_else(|| {
                PipelineError::Internal(format!("contract for '{table_name}' vanished"))
            })?;
            // stored values carry their declared logical type
            let table = raw.coerced(contract.column_types());
            let rows = table.len();
            run.store.insert(table_name.clone(), descriptor.name.clone(), table)?;
            info!(extractor = %descriptor.name, table = %table_name, rows, "validated table");
            summary.push((table_name.clone(), rows));
        }

        for (key, value) in reported {
            if run.metrics.insert(key.clone(), value).is_some() {
                warn!(extractor = %descriptor.name, metric = %key, "metric reported twice, keeping latest");
            }
        }
        Ok(summary)
    }

    fn gather<'s>(
        &'s self,
        extractor: &'s dyn Extractor,
        store: &'s ResultStore,
    ) -> Result<Dependencies<'s>, PipelineError> {
        let mut dependencies = Dependencies::new();
        let descriptor = extractor.descriptor();
        for upstream_name in &descriptor.depends_on {
            let upstream = self
                .extractors
                .iter()
                .find(|e| e.name() == upstream_name)
                .ok_or_else(|| {
                    PipelineError::Internal(format!(
                        "'{}' depends on '{}', which vanished after resolution",
                        descriptor.name, upstream_name
                    ))
                })?;
            for table_name in &upstream.descriptor().outputs {
                let table = store.get(table_name).ok_or_else(|| {
                    PipelineError::Internal(format!(
                        "'{}' needs table '{}' from '{}', but it is not in the result store",
                        descriptor.name, table_name, upstream_name
                    ))
                })?;
                dependencies.insert(upstream.name(), table_name, table);
            }
        }
        Ok(dependencies)
    }
}

/// Every extractor declares outputs, no table has two producers, and every
/// output has a contract.
fn check_outputs(
    extractors: &[Box<dyn Extractor>],
    registry: &SchemaRegistry,
) -> Result<(), DefinitionError> {
    let mut producers: HashMap<&str, &str> = HashMap::new();
    for extractor in extractors {
        let descriptor = extractor.descriptor();
        if descriptor.outputs.is_empty() {
            return Err(DefinitionError::NoOutputs {
                extractor: descriptor.name.clone(),
            });
        }
        let mut own = HashSet::new();
        for table in &descriptor.outputs {
            if !own.insert(table.as_str()) {
                return Err(DefinitionError::DuplicateOutput {
                    extractor: descriptor.name.clone(),
                    table: table.clone(),
                });
            }
            if let Some(first) = producers.insert(table.as_str(), descriptor.name.as_str()) {
                return Err(DefinitionError::DuplicateProducer {
                    table: table.clone(),
                    first: first.to_string(),
                    second: descriptor.name.clone(),
                });
            }
            if !registry.contains(table) {
                return Err(DefinitionError::UnregisteredTable {
                    extractor: descriptor.name.clone(),
                    table: table.clone(),
                });
            }
        }
    }
    Ok(())
}
