//! Run events for observability.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel. Each
//! component receives the run's [`EventEmitter`] at construction, so observers
//! (the CLI, tests) see exactly one run's events without global state.

use serde::{Deserialize, Serialize};

use crate::state::PipelineState;

/// Events emitted during a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
    PipelineStarted {
        experiment: String,
        candidates: Vec<String>,
    },
    PipelineCompleted {
        final_state: PipelineState,
        visited_states: Vec<PipelineState>,
        duration_ms: u64,
    },
    PipelineFailed {
        state: PipelineState,
        error: String,
    },
    StageStarted {
        state: PipelineState,
    },
    StageCompleted {
        state: PipelineState,
        duration_ms: u64,
    },
    StageFailed {
        state: PipelineState,
        error: String,
    },
    /// A non-fatal condition worth surfacing (missing values, absent champion).
    Warning {
        state: PipelineState,
        message: String,
    },
    CandidateTrained {
        model_name: String,
        train_r2: f64,
        run_id: String,
    },
    ModelSelected {
        model_name: String,
        train_r2: f64,
    },
    DriftSummarized {
        drifted_columns: usize,
        total_columns: usize,
        dataset_drift: bool,
    },
    PromotionDecided {
        new_model_r2: f64,
        old_model_r2: Option<f64>,
        promote: bool,
    },
    ModelPushed {
        location: String,
        version: Option<String>,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    /// Emit a [`PipelineEvent::Warning`] and log it.
    pub fn warn(&self, state: PipelineState, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(stage = %state, "{message}");
        self.emit(PipelineEvent::Warning { state, message });
    }

    /// Subscribe to events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

/// Drain every event currently buffered in `rx`.
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
