//! Pipeline metrics, emitted through the `metrics` facade.
//!
//! No recorder is installed by this crate; an embedding application may
//! install one before running the pipeline. Without one, every call is a no-op.

pub mod core;

pub use self::core::{time_operation, TimingGuard};

use crate::error::ErrorCategory;
use crate::pipeline::validate::ViolationKind;

/// Builds `foundation_<phase>_<name>` metric names.
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("foundation_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("foundation_", $phase, "_", $name)
    };
}

pub const EXTRACTOR_DURATION: &str = phase_metric!(histogram, "pipeline", "extractor_duration_seconds");
pub const EXTRACTOR_SUCCESS: &str = phase_metric!(counter, "pipeline", "extractor_success");
pub const EXTRACTOR_FAILURE: &str = phase_metric!(counter, "pipeline", "extractor_failure");
pub const ROWS_VALIDATED: &str = phase_metric!(counter, "pipeline", "rows_validated");
pub const VALIDATION_FAILURE: &str = phase_metric!(counter, "validation", "failure");
pub const TABLES_WRITTEN: &str = phase_metric!(counter, "storage", "tables_written");
pub const ROWS_WRITTEN: &str = phase_metric!(counter, "storage", "rows_written");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

pub fn metric_docs() -> Vec<MetricDoc> {
    vec![
        MetricDoc {
            name: EXTRACTOR_DURATION,
            metric_type: MetricType::Histogram,
            help: "Wall time spent in one extractor, validation included",
            labels: &["extractor"],
        },
        MetricDoc {
            name: EXTRACTOR_SUCCESS,
            metric_type: MetricType::Counter,
            help: "Extractors whose outputs all validated",
            labels: &["extractor"],
        },
        MetricDoc {
            name: EXTRACTOR_FAILURE,
            metric_type: MetricType::Counter,
            help: "Extractors that stopped the run",
            labels: &["extractor", "category"],
        },
        MetricDoc {
            name: ROWS_VALIDATED,
            metric_type: MetricType::Counter,
            help: "Rows accepted into the result store",
            labels: &["extractor"],
        },
        MetricDoc {
            name: VALIDATION_FAILURE,
            metric_type: MetricType::Counter,
            help: "Tables rejected by their contract",
            labels: &["table", "kind"],
        },
        MetricDoc {
            name: TABLES_WRITTEN,
            metric_type: MetricType::Counter,
            help: "Tables persisted to the database",
            labels: &[],
        },
        MetricDoc {
            name: ROWS_WRITTEN,
            metric_type: MetricType::Counter,
            help: "Rows persisted to the database",
            labels: &[],
        },
    ]
}

/// Attach help text to every metric on the installed recorder.
pub fn register_metrics() {
    for doc in metric_docs() {
        match doc.metric_type {
            MetricType::Counter => ::metrics::describe_counter!(doc.name, doc.help),
            MetricType::Histogram => ::metrics::describe_histogram!(doc.name, doc.help),
        }
    }
}

pub fn time_extractor(extractor: &str) -> TimingGuard {
    time_operation(EXTRACTOR_DURATION).with_label("extractor", extractor)
}

pub fn record_extractor_success(extractor: &str, rows: usize) {
    ::metrics::counter!(EXTRACTOR_SUCCESS, "extractor" => extractor.to_string()).increment(1);
    ::metrics::counter!(ROWS_VALIDATED, "extractor" => extractor.to_string()).increment(rows as u64);
}

pub fn record_extractor_failure(extractor: &str, category: ErrorCategory) {
    ::metrics::counter!(
        EXTRACTOR_FAILURE,
        "extractor" => extractor.to_string(),
        "category" => category.to_string()
    )
    .increment(1);
}

pub fn record_validation_failure(table: &str, kind: ViolationKind) {
    ::metrics::counter!(
        VALIDATION_FAILURE,
        "table" => table.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

pub fn record_tables_written(tables: usize, rows: usize) {
    ::metrics::counter!(TABLES_WRITTEN).increment(tables as u64);
    ::metrics::counter!(ROWS_WRITTEN).increment(rows as u64);
}
