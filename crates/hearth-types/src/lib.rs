//! Shared types, errors, configuration, and report records for the Hearth pipeline.
//!
//! This crate provides the foundational types used across all other Hearth crates:
//! - `HearthError`: unified error taxonomy
//! - `PipelineConfig`: typed, validated run configuration
//! - `Candidate`: closed set of trainable model kinds with their hyperparameters
//! - `ValidationReport` / `EvaluationMetrics`: persisted stage records

pub mod candidate;
pub mod config;
pub mod report;

pub use candidate::{BoostingParams, Candidate, ForestParams, LinearParams};
pub use config::{
    DataConfig, MetricsConfig, ModelConfig, PipelineConfig, StoreConfig, TrackingConfig,
};
pub use report::{EvaluationMetrics, ValidationReport, ValidationStatus};

/// Unified error type for all Hearth subsystems.
#[derive(Debug, thiserror::Error)]
pub enum HearthError {
    // === Configuration Errors ===
    #[error("Missing required config key '{key}'")]
    MissingConfigKey { key: String },

    #[error("Invalid config value for '{key}': {message}")]
    InvalidConfig { key: String, message: String },

    #[error("Unsupported candidate model '{name}'")]
    UnsupportedCandidate { name: String },

    // === Data Errors ===
    #[error("Target column '{column}' not found")]
    MissingTargetColumn { column: String },

    #[error("Malformed table '{source_name}': {message}")]
    MalformedTable {
        source_name: String,
        message: String,
    },

    // === Model Errors ===
    #[error("Fitting {model} failed: {message}")]
    FitFailed { model: String, message: String },

    #[error("Invalid model artifact: {0}")]
    InvalidArtifact(String),

    #[error("Artifact not found at {path}")]
    ArtifactMissing { path: String },

    // === Remote Errors ===
    #[error("Fetching {url} failed (HTTP {status}): {message}")]
    FetchFailed {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Model store {operation} on {location} failed: {message}")]
    StoreError {
        operation: String,
        location: String,
        message: String,
    },

    #[error("Model store object {location} changed since it was read: {message}")]
    StorePreconditionFailed { location: String, message: String },

    #[error("Experiment tracker error: {0}")]
    TrackerError(String),

    // === Pipeline Errors ===
    #[error("Stage {stage} failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<HearthError>,
    },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Other(String),
}

impl HearthError {
    /// Wrap an error with the pipeline stage it escaped from.
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        HearthError::StageFailed {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Returns `true` for errors raised while loading or validating configuration.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            HearthError::MissingConfigKey { .. }
                | HearthError::InvalidConfig { .. }
                | HearthError::UnsupportedCandidate { .. }
        )
    }

    /// The innermost error, unwrapping any number of `StageFailed` layers.
    pub fn root_cause(&self) -> &HearthError {
        match self {
            HearthError::StageFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Name of the outermost stage that failed, if the error was stage-wrapped.
    pub fn failed_stage(&self) -> Option<&str> {
        match self {
            HearthError::StageFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, HearthError>`.
pub type Result<T> = std::result::Result<T, HearthError>;
