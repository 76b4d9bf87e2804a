//! Pipeline orchestration for Hearth.
//!
//! This crate wires the seven stages (ingestion, validation, transformation,
//! training, drift reporting, evaluation, promotion) into a strictly sequential
//! state machine, with a broadcast event stream for observers.

pub mod components;
pub mod engine;
pub mod events;
pub mod state;

pub use components::{
    select_best, ChampionLookup, DataIngestion, DataTransformation, DataValidation, DriftReporter,
    Evaluation, ModelEvaluator, ModelPusher, ModelTrainer, SplitPaths, TrainingOutcome,
};
pub use engine::{ArtifactPaths, PipelineExecutor, PipelineResult, PromotionDecision};
pub use events::{drain, EventEmitter, PipelineEvent};
pub use state::PipelineState;
