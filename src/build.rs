//! The operations behind the command line: build, plan and contracts.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{BuildError, PipelineError};
use crate::pipeline::{ExtractionContext, Pipeline, PipelineRun};
use crate::schema::TableContract;
use crate::storage::SqliteWriter;

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Overrides `paths.db_file`.
    pub db: Option<PathBuf>,
    /// Run and validate without touching the database.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub producer: String,
    pub rows: usize,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub order: Vec<String>,
    pub tables: Vec<TableSummary>,
    /// Database written, `None` for a dry run.
    pub database: Option<PathBuf>,
    pub metrics: BTreeMap<String, serde_json::Value>,
}

impl BuildSummary {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub extractor: String,
    pub outputs: Vec<String>,
    pub depends_on: Vec<String>,
}

/// Build the pipeline and extraction context described by `config`.
pub fn assemble(config: &Config) -> Result<(Pipeline, ExtractionContext), PipelineError> {
    let registry = config.registry()?;
    let extractors = config.extractors(&registry);
    let pipeline = Pipeline::new(extractors, registry)?.with_validator(config.validator());
    Ok((pipeline, config.context()))
}

/// Run every extractor, then persist the validated tables unless this is a dry run.
pub fn build(config: &Config, options: &BuildOptions) -> Result<BuildSummary, BuildError> {
    let (pipeline, context) = assemble(config)?;
    if pipeline.is_empty() {
        warn!("no extractors configured, nothing to build");
    }

    let mut run = PipelineRun::new();
    pipeline.execute(&context, &mut run)?;

    let database = if options.dry_run {
        info!("dry run, skipping persistence");
        None
    } else {
        let path = options.db.clone().unwrap_or_else(|| config.paths.db_file.clone());
        SqliteWriter::open(&path)
            .and_then(|mut writer| writer.write_store(&run.store, pipeline.registry()))
            .map_err(|cause| BuildError::Persistence {
                path: path.clone(),
                cause,
            })?;
        Some(path)
    };

    let tables = run
        .store
        .iter()
        .map(|entry| TableSummary {
            table: entry.name.clone(),
            producer: entry.producer.clone(),
            rows: entry.table.len(),
            fingerprint: entry.table.fingerprint(),
        })
        .collect();

    Ok(BuildSummary {
        run_id: run.run_id,
        started_at: run.started_at,
        order: pipeline.execution_order().into_iter().map(String::from).collect(),
        tables,
        database,
        metrics: run.metrics,
    })
}

/// Resolved execution order without running anything.
pub fn plan(config: &Config) -> Result<Vec<PlanEntry>, PipelineError> {
    let (pipeline, _) = assemble(config)?;
    Ok(pipeline
        .ordered()
        .map(|e| {
            let d = e.descriptor();
            PlanEntry {
                extractor: d.name.clone(),
                outputs: d.outputs.clone(),
                depends_on: d.depends_on.clone(),
            }
        })
        .collect())
}

/// Every registered contract, built-ins first.
pub fn contracts(config: &Config) -> Result<Vec<TableContract>, PipelineError> {
    let registry = config.registry()?;
    Ok(registry.iter().cloned().collect())
}
