//! The seven pipeline stages, in run order.

pub mod drift;
pub mod evaluator;
pub mod ingestion;
pub mod pusher;
pub mod trainer;
pub mod transformation;
pub mod validation;

pub use drift::DriftReporter;
pub use evaluator::{ChampionLookup, Evaluation, ModelEvaluator};
pub use ingestion::DataIngestion;
pub use pusher::ModelPusher;
pub use trainer::{select_best, ModelTrainer, TrainingOutcome};
pub use transformation::{DataTransformation, SplitPaths};
pub use validation::DataValidation;
