//! Pipeline execution engine: the ingest-to-promotion state machine.
//!
//! States run strictly in order:
//! `INGESTING → VALIDATING → TRANSFORMING → TRAINING → REPORTING_DRIFT →
//! EVALUATING → (PROMOTING | RETAINING) → DONE`. Any stage error moves the run
//! to `FAILED` and is returned wrapped with the failing state's name.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use hearth_store::{ExperimentTracker, ModelStore};
use hearth_types::{EvaluationMetrics, PipelineConfig, Result};

use crate::components::{
    DataIngestion, DataTransformation, DataValidation, DriftReporter, ModelEvaluator, ModelPusher,
    ModelTrainer,
};
use crate::events::{EventEmitter, PipelineEvent};
use crate::state::PipelineState;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionDecision {
    Promoted,
    Retained,
}

/// Files produced by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub raw_data: PathBuf,
    pub validation_report: PathBuf,
    pub train: PathBuf,
    pub test: PathBuf,
    pub model: PathBuf,
    pub drift_report: PathBuf,
    pub evaluation: PathBuf,
}

/// The result of a completed pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub final_state: PipelineState,
    pub visited_states: Vec<PipelineState>,
    pub decision: PromotionDecision,
    pub metrics: EvaluationMetrics,
    pub best_model: String,
    pub artifacts: ArtifactPaths,
    /// Store version written on promotion.
    pub pushed_version: Option<String>,
    pub duration_ms: u64,
}

/// Drives one run against a fixed configuration, model store, and tracker.
pub struct PipelineExecutor {
    config: Arc<PipelineConfig>,
    store: Arc<dyn ModelStore>,
    tracker: Arc<dyn ExperimentTracker>,
    events: EventEmitter,
}

// ---------------------------------------------------------------------------
// PipelineExecutor
// ---------------------------------------------------------------------------

impl PipelineExecutor {
    pub fn new(
        config: Arc<PipelineConfig>,
        store: Arc<dyn ModelStore>,
        tracker: Arc<dyn ExperimentTracker>,
    ) -> Self {
        Self {
            config,
            store,
            tracker,
            events: EventEmitter::default(),
        }
    }

    /// Use `events` instead of a fresh emitter.
    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage in order.
    pub async fn run(&self) -> Result<PipelineResult> {
        let cfg = &*self.config;
        let started = Instant::now();
        let mut visited = Vec::new();

        tracing::info!(
            experiment = %cfg.mlflow.experiment_name,
            store = %self.store.location(),
            store_backend = self.store.name(),
            tracker = self.tracker.name(),
            "Starting pipeline run"
        );
        self.events.emit(PipelineEvent::PipelineStarted {
            experiment: cfg.mlflow.experiment_name.clone(),
            candidates: cfg
                .model
                .candidates
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
        });

        let ingestion = DataIngestion::new(&cfg.data, self.events.clone());
        let raw_data = self
            .stage(&mut visited, PipelineState::Ingesting, ingestion.run())
            .await?;

        let validation = DataValidation::new(&cfg.data.target, &cfg.metrics, self.events.clone());
        self.stage(&mut visited, PipelineState::Validating, validation.run(&raw_data))
            .await?;

        let transformation = DataTransformation::new(&cfg.data, self.events.clone());
        let split = self
            .stage(&mut visited, PipelineState::Transforming, transformation.run(&raw_data))
            .await?;

        let trainer = ModelTrainer::new(
            &cfg.data.target,
            cfg.model.candidates.clone(),
            cfg.model_path(),
            self.tracker.clone(),
            self.events.clone(),
        );
        let training = self
            .stage(&mut visited, PipelineState::Training, trainer.run(&split.train))
            .await?;

        let drift = DriftReporter::new(&cfg.metrics, self.events.clone());
        let drift_report = self
            .stage(
                &mut visited,
                PipelineState::ReportingDrift,
                drift.run(&split.train, &split.test),
            )
            .await?;

        let evaluator = ModelEvaluator::new(
            &cfg.data.target,
            &cfg.metrics,
            self.store.clone(),
            self.events.clone(),
        );
        let evaluation = self
            .stage(
                &mut visited,
                PipelineState::Evaluating,
                evaluator.run(&training.model_path, &split.test),
            )
            .await?;

        let (decision, pushed_version) = if evaluation.metrics.promote {
            tracing::info!("New model approved for promotion");
            let pusher = ModelPusher::new(self.store.clone(), self.events.clone());
            let version = self
                .stage(
                    &mut visited,
                    PipelineState::Promoting,
                    pusher.run(&training.model_path, &evaluation.push_precondition),
                )
                .await?;
            (PromotionDecision::Promoted, version)
        } else {
            tracing::info!("New model rejected; production model retained");
            self.stage(&mut visited, PipelineState::Retaining, async { Result::<()>::Ok(()) })
                .await?;
            (PromotionDecision::Retained, None)
        };

        visited.push(PipelineState::Done);
        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(decision = ?decision, duration_ms, "Pipeline completed");
        self.events.emit(PipelineEvent::PipelineCompleted {
            final_state: PipelineState::Done,
            visited_states: visited.clone(),
            duration_ms,
        });

        Ok(PipelineResult {
            final_state: PipelineState::Done,
            visited_states: visited,
            decision,
            metrics: evaluation.metrics,
            best_model: training.best_model,
            artifacts: ArtifactPaths {
                raw_data,
                validation_report: validation.report_path(),
                train: split.train,
                test: split.test,
                model: training.model_path,
                drift_report,
                evaluation: evaluation.metrics_path,
            },
            pushed_version,
            duration_ms,
        })
    }

    /// Enter `state`, await its work, and record the transition.
    async fn stage<T, F>(
        &self,
        visited: &mut Vec<PipelineState>,
        state: PipelineState,
        work: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        visited.push(state);
        tracing::info!(stage = %state, "Stage started");
        self.events.emit(PipelineEvent::StageStarted { state });
        let started = Instant::now();

        match work.await {
            Ok(value) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                tracing::debug!(stage = %state, duration_ms, "Stage completed");
                self.events.emit(PipelineEvent::StageCompleted { state, duration_ms });
                Ok(value)
            }
            Err(e) => {
                tracing::error!(stage = %state, error = %e, "Stage failed");
                visited.push(PipelineState::Failed);
                self.events.emit(PipelineEvent::StageFailed {
                    state,
                    error: e.to_string(),
                });
                self.events.emit(PipelineEvent::PipelineFailed {
                    state,
                    error: e.to_string(),
                });
                Err(e.in_stage(state.as_str()))
            }
        }
    }
}
