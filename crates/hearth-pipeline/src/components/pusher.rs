//! Promote a model artifact to the production store.

use std::path::Path;
use std::sync::Arc;

use hearth_store::{ModelStore, WritePrecondition};
use hearth_types::{HearthError, Result};

use crate::events::{EventEmitter, PipelineEvent};

pub struct ModelPusher {
    store: Arc<dyn ModelStore>,
    events: EventEmitter,
}

impl ModelPusher {
    pub fn new(store: Arc<dyn ModelStore>, events: EventEmitter) -> Self {
        Self { store, events }
    }

    /// Upload `model_path`, overwriting the production object if
    /// `precondition` still holds. Returns the new version token, if any.
    pub async fn run(
        &self,
        model_path: &Path,
        precondition: &WritePrecondition,
    ) -> Result<Option<String>> {
        if !model_path.exists() {
            return Err(HearthError::ArtifactMissing {
                path: model_path.display().to_string(),
            });
        }
        let bytes = tokio::fs::read(model_path).await?;
        let size = bytes.len();

        let version = self.store.put(bytes, precondition).await?;
        let location = self.store.location();
        tracing::info!(
            location = %location,
            bytes = size,
            version = ?version,
            "Model pushed to store"
        );
        self.events.emit(PipelineEvent::ModelPushed { location, version: version.clone() });
        Ok(version)
    }
}
