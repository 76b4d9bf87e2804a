//! Experiment tracking: one run per trained candidate.
//!
//! `http(s)://` tracking URIs talk to an MLflow tracking server over its REST
//! API; `file:` URIs and bare paths write runs as JSON under a local directory.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;

use hearth_types::{HearthError, Result, TrackingConfig};

/// Everything logged for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedRun {
    pub run_name: String,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
}

impl TrackedRun {
    pub fn new(run_name: impl Into<String>) -> Self {
        Self {
            run_name: run_name.into(),
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// ExperimentTracker
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ExperimentTracker: Send + Sync {
    /// Record a finished run and its serialized model. Returns the run id.
    async fn record_run(&self, run: &TrackedRun, model: &[u8]) -> Result<String>;

    fn name(&self) -> &str;
}

/// Build the tracker selected by `mlflow.tracking_uri`.
pub fn tracker_from_config(config: &TrackingConfig) -> Result<Arc<dyn ExperimentTracker>> {
    let uri = config.tracking_uri.trim();
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return Ok(Arc::new(MlflowTracker::new(
            uri.to_string(),
            config.experiment_name.clone(),
        )));
    }
    let path = uri
        .strip_prefix("file://")
        .or_else(|| uri.strip_prefix("file:"))
        .unwrap_or(uri);
    if path.is_empty() || path.contains("://") {
        return Err(HearthError::InvalidConfig {
            key: "mlflow.tracking_uri".into(),
            message: format!("unsupported tracking URI '{uri}'"),
        });
    }
    Ok(Arc::new(FileTracker::new(path, config.experiment_name.clone())))
}

// ---------------------------------------------------------------------------
// FileTracker
// ---------------------------------------------------------------------------

/// Writes `<root>/<experiment>/<run_id>/{run.json,model.bin}`.
#[derive(Debug, Clone)]
pub struct FileTracker {
    root: PathBuf,
    experiment_name: String,
}

#[derive(Serialize)]
struct RunRecord<'a> {
    run_id: &'a str,
    experiment_name: &'a str,
    recorded_at: String,
    #[serde(flatten)]
    run: &'a TrackedRun,
}

impl FileTracker {
    pub fn new(root: impl Into<PathBuf>, experiment_name: String) -> Self {
        Self {
            root: root.into(),
            experiment_name,
        }
    }

    pub fn experiment_dir(&self) -> PathBuf {
        self.root.join(&self.experiment_name)
    }
}

#[async_trait]
impl ExperimentTracker for FileTracker {
    async fn record_run(&self, run: &TrackedRun, model: &[u8]) -> Result<String> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let dir = self.experiment_dir().join(&run_id);
        tokio::fs::create_dir_all(&dir).await?;

        let record = RunRecord {
            run_id: &run_id,
            experiment_name: &self.experiment_name,
            recorded_at: chrono::Utc::now().to_rfc3339(),
            run,
        };
        tokio::fs::write(dir.join("run.json"), serde_json::to_string_pretty(&record)?).await?;
        tokio::fs::write(dir.join("model.bin"), model).await?;

        tracing::debug!(run_id = %run_id, run_name = %run.run_name, "Recorded run locally");
        Ok(run_id)
    }

    fn name(&self) -> &str {
        "file"
    }
}

// ---------------------------------------------------------------------------
// MlflowTracker
// ---------------------------------------------------------------------------

/// MLflow tracking server client (REST API 2.0).
#[derive(Debug)]
pub struct MlflowTracker {
    client: reqwest::Client,
    base_url: String,
    experiment_name: String,
    experiment_id: OnceCell<String>,
}

impl MlflowTracker {
    pub fn new(base_url: String, experiment_name: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            experiment_name,
            experiment_id: OnceCell::new(),
        }
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow/{}", self.base_url, path)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<serde_json::Value> {
        let resp = request
            .send()
            .await
            .map_err(|e| HearthError::TrackerError(format!("{what}: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| HearthError::TrackerError(format!("{what}: {e}")))?;
        if !status.is_success() {
            return Err(HearthError::TrackerError(format!(
                "{what}: HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body)
            )));
        }
        if body.trim().is_empty() {
            return Ok(json!({}));
        }
        serde_json::from_str(&body)
            .map_err(|e| HearthError::TrackerError(format!("{what}: invalid JSON response: {e}")))
    }

    /// Experiment id, resolved once per tracker.
    async fn experiment_id(&self) -> Result<&str> {
        let id = self
            .experiment_id
            .get_or_try_init(|| self.resolve_experiment())
            .await?;
        Ok(id.as_str())
    }

    /// Look the experiment up by name, creating it if the server has none.
    async fn resolve_experiment(&self) -> Result<String> {
        let lookup = self
            .client
            .get(self.api("experiments/get-by-name"))
            .query(&[("experiment_name", self.experiment_name.as_str())])
            .send()
            .await
            .map_err(|e| HearthError::TrackerError(format!("experiments/get-by-name: {e}")))?;

        if lookup.status().is_success() {
            let body: serde_json::Value = lookup
                .json()
                .await
                .map_err(|e| HearthError::TrackerError(format!("experiments/get-by-name: {e}")))?;
            if let Some(id) = body["experiment"]["experiment_id"].as_str() {
                return Ok(id.to_string());
            }
        }

        tracing::info!(experiment = %self.experiment_name, "Creating MLflow experiment");
        let created = self
            .send(
                self.client
                    .post(self.api("experiments/create"))
                    .json(&json!({ "name": self.experiment_name })),
                "experiments/create",
            )
            .await?;
        created["experiment_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                HearthError::TrackerError("experiments/create: missing experiment_id".into())
            })
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}

fn create_run_body(experiment_id: &str, run: &TrackedRun, start_time: i64) -> serde_json::Value {
    json!({
        "experiment_id": experiment_id,
        "run_name": run.run_name,
        "start_time": start_time,
        "tags": [{ "key": "mlflow.runName", "value": run.run_name }],
    })
}

fn log_batch_body(run_id: &str, run: &TrackedRun, timestamp: i64) -> serde_json::Value {
    let metrics: Vec<_> = run
        .metrics
        .iter()
        .map(|(k, v)| json!({ "key": k, "value": v, "timestamp": timestamp, "step": 0 }))
        .collect();
    let params: Vec<_> = run
        .params
        .iter()
        .map(|(k, v)| json!({ "key": k, "value": v }))
        .collect();
    let tags: Vec<_> = run
        .tags
        .iter()
        .map(|(k, v)| json!({ "key": k, "value": v }))
        .collect();
    json!({ "run_id": run_id, "metrics": metrics, "params": params, "tags": tags })
}

/// Relative artifact path under the proxied artifact root for a run's model.
fn model_artifact_path(artifact_uri: Option<&str>, experiment_id: &str, run_id: &str) -> String {
    let root = artifact_uri
        .and_then(|uri| uri.strip_prefix("mlflow-artifacts:/"))
        .map(|rest| rest.trim_matches('/').to_string())
        .unwrap_or_else(|| format!("{experiment_id}/{run_id}/artifacts"));
    format!("{root}/model/model.bin")
}

#[async_trait]
impl ExperimentTracker for MlflowTracker {
    async fn record_run(&self, run: &TrackedRun, model: &[u8]) -> Result<String> {
        let experiment_id = self.experiment_id().await?.to_string();
        let now = chrono::Utc::now().timestamp_millis();

        let created = self
            .send(
                self.client
                    .post(self.api("runs/create"))
                    .json(&create_run_body(&experiment_id, run, now)),
                "runs/create",
            )
            .await?;
        let info = &created["run"]["info"];
        let run_id = info["run_id"]
            .as_str()
            .ok_or_else(|| HearthError::TrackerError("runs/create: missing run_id".into()))?
            .to_string();

        self.send(
            self.client
                .post(self.api("runs/log-batch"))
                .json(&log_batch_body(&run_id, run, now)),
            "runs/log-batch",
        )
        .await?;

        let artifact = model_artifact_path(info["artifact_uri"].as_str(), &experiment_id, &run_id);
        self.send(
            self.client
                .put(format!("{}/api/2.0/mlflow-artifacts/artifacts/{}", self.base_url, artifact))
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(model.to_vec()),
            "mlflow-artifacts upload",
        )
        .await?;

        self.send(
            self.client.post(self.api("runs/update")).json(&json!({
                "run_id": run_id,
                "status": "FINISHED",
                "end_time": chrono::Utc::now().timestamp_millis(),
            })),
            "runs/update",
        )
        .await?;

        tracing::debug!(run_id = %run_id, run_name = %run.run_name, "Recorded MLflow run");
        Ok(run_id)
    }

    fn name(&self) -> &str {
        "mlflow"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
