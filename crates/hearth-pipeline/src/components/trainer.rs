//! Fit every configured candidate, track each run, keep the best.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hearth_data::Table;
use hearth_models::ModelArtifact;
use hearth_store::{ExperimentTracker, TrackedRun};
use hearth_types::{Candidate, HearthError, Result};

use crate::events::{EventEmitter, PipelineEvent};

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    pub model_path: PathBuf,
    pub best_model: String,
    pub best_train_r2: f64,
    /// `(candidate name, train R²)` in configuration order.
    pub scores: Vec<(String, f64)>,
}

pub struct ModelTrainer {
    target: String,
    candidates: Vec<Candidate>,
    model_path: PathBuf,
    tracker: Arc<dyn ExperimentTracker>,
    events: EventEmitter,
}

/// Index of the highest score. Only a strictly greater score displaces the
/// current best, so ties keep the earliest candidate.
pub fn select_best(scores: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &score) in scores.iter().enumerate() {
        match best {
            Some(b) if score <= scores[b] => {}
            _ => best = Some(i),
        }
    }
    best
}

impl ModelTrainer {
    pub fn new(
        target: &str,
        candidates: Vec<Candidate>,
        model_path: PathBuf,
        tracker: Arc<dyn ExperimentTracker>,
        events: EventEmitter,
    ) -> Self {
        Self {
            target: target.to_string(),
            candidates,
            model_path,
            tracker,
            events,
        }
    }

    pub async fn run(&self, train_path: &Path) -> Result<TrainingOutcome> {
        let train = Table::read_csv(train_path)?;
        tracing::info!(
            rows = train.row_count(),
            candidates = self.candidates.len(),
            tracker = self.tracker.name(),
            "Training candidates"
        );

        let mut artifacts = Vec::with_capacity(self.candidates.len());
        for candidate in &self.candidates {
            let artifact = ModelArtifact::train(candidate, &train, &self.target)?;
            let bytes = artifact.to_bytes()?;

            let run = TrackedRun::new(candidate.name())
                .with_params(candidate.params())
                .with_metric("train_r2", artifact.train_r2)
                .with_metric("train_rows", artifact.train_rows as f64)
                .with_tag("model_name", candidate.name());
            let run_id = self.tracker.record_run(&run, &bytes).await?;

            tracing::info!(
                model = candidate.name(),
                train_r2 = artifact.train_r2,
                run_id = %run_id,
                "Candidate trained"
            );
            self.events.emit(PipelineEvent::CandidateTrained {
                model_name: candidate.name().to_string(),
                train_r2: artifact.train_r2,
                run_id,
            });
            artifacts.push(artifact);
        }

        let scores: Vec<f64> = artifacts.iter().map(|a| a.train_r2).collect();
        let best_idx = select_best(&scores).ok_or_else(|| HearthError::FitFailed {
            model: "<none>".into(),
            message: "no candidates to train".into(),
        })?;
        let best = &artifacts[best_idx];
        best.save(&self.model_path)?;

        tracing::info!(
            model = best.model_name(),
            train_r2 = best.train_r2,
            path = %self.model_path.display(),
            "Best model saved"
        );
        self.events.emit(PipelineEvent::ModelSelected {
            model_name: best.model_name().to_string(),
            train_r2: best.train_r2,
        });

        Ok(TrainingOutcome {
            model_path: self.model_path.clone(),
            best_model: best.model_name().to_string(),
            best_train_r2: best.train_r2,
            scores: artifacts
                .iter()
                .map(|a| (a.model_name().to_string(), a.train_r2))
                .collect(),
        })
    }
}
