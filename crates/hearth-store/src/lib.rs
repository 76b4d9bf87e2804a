//! Remote collaborators of the pipeline: the production model store and the
//! experiment tracker.
//!
//! Both are traits so the orchestrator can be driven against in-memory doubles.
//! The store has S3 (`object_store`), plain-HTTP, and local-filesystem
//! backends; the tracker has an MLflow REST backend and a local one. Both are
//! selected from configuration.

pub mod model_store;
pub mod tracker;

pub use model_store::{
    content_fingerprint, store_from_config, HttpModelStore, LocalModelStore, ModelStore,
    ObjectModelStore, StoredModel, WritePrecondition, STORE_TOKEN_ENV,
};
pub use tracker::{tracker_from_config, ExperimentTracker, FileTracker, MlflowTracker, TrackedRun};
