//! Orchestrator states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One state of a pipeline run. Every stage maps to exactly one state;
/// `Promoting` and `Retaining` are the two outcomes of evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Ingesting,
    Validating,
    Transforming,
    Training,
    ReportingDrift,
    Evaluating,
    Promoting,
    Retaining,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Ingesting => "INGESTING",
            PipelineState::Validating => "VALIDATING",
            PipelineState::Transforming => "TRANSFORMING",
            PipelineState::Training => "TRAINING",
            PipelineState::ReportingDrift => "REPORTING_DRIFT",
            PipelineState::Evaluating => "EVALUATING",
            PipelineState::Promoting => "PROMOTING",
            PipelineState::Retaining => "RETAINING",
            PipelineState::Done => "DONE",
            PipelineState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
