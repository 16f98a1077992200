//! Crate-wide error types.

use thiserror::Error;

use crate::{LogKind, Metric};

pub type TraceGridResult<T> = Result<T, TraceGridError>;

#[derive(Debug, Error)]
pub enum TraceGridError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("run {run:?}: {kind} log has no records, relative time has no zero-point")]
    EmptyInput { run: String, kind: LogKind },

    #[error("run {run:?}: metric group {group:?} references {metric}, which the run never observed")]
    MissingMetric {
        run: String,
        group: String,
        metric: Metric,
    },

    #[error("run {run:?}: metric group {group:?} has no values to bound the y axis")]
    EmptyMetricGroup { run: String, group: String },

    #[error("run {run:?}: malformed {kind} record at line {line}: {reason}")]
    MalformedRecord {
        run: String,
        kind: LogKind,
        line: u64,
        reason: String,
    },

    #[error("render error: {0}")]
    Render(String),
}

impl TraceGridError {
    /// Stable machine-readable code used by the JSON CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Toml(_) => "toml",
            Self::Csv(_) => "csv",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::EmptyInput { .. } => "empty_input",
            Self::MissingMetric { .. } => "missing_metric",
            Self::EmptyMetricGroup { .. } => "empty_metric_group",
            Self::MalformedRecord { .. } => "malformed_record",
            Self::Render(_) => "render",
        }
    }
}
