//! Champion/challenger comparison on the held-out partition.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hearth_data::Table;
use hearth_models::ModelArtifact;
use hearth_store::{ModelStore, WritePrecondition};
use hearth_types::{EvaluationMetrics, HearthError, MetricsConfig, Result};

use crate::events::{EventEmitter, PipelineEvent};
use crate::state::PipelineState;

pub const EVALUATION_FILE: &str = "model_evaluation.json";

/// Outcome of looking up the production model.
#[derive(Debug, Clone, PartialEq)]
pub enum ChampionLookup {
    /// A champion exists and was scored on the test partition.
    Found { r2: f64, version: Option<String> },
    /// The store holds no object at the configured key.
    Absent,
    /// The store could not be read, or its object could not be loaded or scored.
    Unavailable(String),
}

impl ChampionLookup {
    pub fn r2(&self) -> Option<f64> {
        match self {
            ChampionLookup::Found { r2, .. } => Some(*r2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub metrics: EvaluationMetrics,
    pub champion: ChampionLookup,
    /// Condition the pusher's write must satisfy: the store must still hold
    /// whatever this evaluation compared against.
    pub push_precondition: WritePrecondition,
    pub metrics_path: PathBuf,
}

pub struct ModelEvaluator {
    target: String,
    metrics_dir: PathBuf,
    store: Arc<dyn ModelStore>,
    events: EventEmitter,
}

impl ModelEvaluator {
    pub fn new(
        target: &str,
        metrics: &MetricsConfig,
        store: Arc<dyn ModelStore>,
        events: EventEmitter,
    ) -> Self {
        Self {
            target: target.to_string(),
            metrics_dir: metrics.metrics_dir.clone(),
            store,
            events,
        }
    }

    pub async fn run(&self, model_path: &Path, test_path: &Path) -> Result<Evaluation> {
        let test = Table::read_csv(test_path)?;
        let challenger = ModelArtifact::load(model_path)?;
        if challenger.encoder.target() != self.target {
            return Err(HearthError::InvalidArtifact(format!(
                "{} predicts '{}' but the configured target is '{}'",
                model_path.display(),
                challenger.encoder.target(),
                self.target
            )));
        }
        let new_model_r2 = challenger.score(&test)?;
        tracing::info!(model = challenger.model_name(), r2 = new_model_r2, "New model scored");

        let (champion, push_precondition) = self.lookup_champion(&test).await;
        match &champion {
            ChampionLookup::Found { r2, .. } => tracing::info!(r2 = *r2, "Production model scored"),
            ChampionLookup::Absent => self.events.warn(
                PipelineState::Evaluating,
                format!(
                    "no production model at {}; assuming first deployment",
                    self.store.location()
                ),
            ),
            ChampionLookup::Unavailable(reason) => self.events.warn(
                PipelineState::Evaluating,
                format!("production model unavailable ({reason}); treating as absent"),
            ),
        }

        let old_model_r2 = champion.r2();
        let metrics = EvaluationMetrics::decide(new_model_r2, old_model_r2);

        tokio::fs::create_dir_all(&self.metrics_dir).await?;
        let metrics_path = self.metrics_dir.join(EVALUATION_FILE);
        metrics.save(&metrics_path)?;

        tracing::info!(
            new_model_r2,
            old_model_r2 = ?old_model_r2,
            promote = metrics.promote,
            path = %metrics_path.display(),
            "Promotion decision"
        );
        self.events.emit(PipelineEvent::PromotionDecided {
            new_model_r2,
            old_model_r2,
            promote: metrics.promote,
        });

        Ok(Evaluation {
            metrics,
            champion,
            push_precondition,
            metrics_path,
        })
    }

    /// Fetch and score the production model. Never fails: every problem is
    /// folded into [`ChampionLookup::Unavailable`].
    async fn lookup_champion(&self, test: &Table) -> (ChampionLookup, WritePrecondition) {
        let stored = match self.store.fetch().await {
            Ok(Some(stored)) => stored,
            Ok(None) => return (ChampionLookup::Absent, WritePrecondition::Absent),
            Err(e) => return (ChampionLookup::Unavailable(e.to_string()), WritePrecondition::Any),
        };

        let precondition = match &stored.version {
            Some(version) => WritePrecondition::Version(version.clone()),
            None => WritePrecondition::Any,
        };
        let scored = ModelArtifact::from_bytes(&stored.bytes).and_then(|m| {
            if m.encoder.target() == self.target {
                m.score(test)
            } else {
                Err(HearthError::InvalidArtifact(format!(
                    "production model predicts '{}', not '{}'",
                    m.encoder.target(),
                    self.target
                )))
            }
        });
        match scored {
            Ok(r2) => (
                ChampionLookup::Found {
                    r2,
                    version: stored.version,
                },
                precondition,
            ),
            Err(e) => (ChampionLookup::Unavailable(e.to_string()), precondition),
        }
    }
}
