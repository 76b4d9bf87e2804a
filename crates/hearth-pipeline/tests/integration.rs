//! End-to-end pipeline runs against a generated housing dataset.
//!
//! The production store and the experiment tracker are in-memory doubles, so
//! every run is hermetic: all artifacts land in a temporary directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use hearth_data::Table;
use hearth_models::ModelArtifact;
use hearth_pipeline::{
    drain, EventEmitter, PipelineEvent, PipelineExecutor, PipelineResult, PipelineState,
    PromotionDecision,
};
use hearth_store::{ExperimentTracker, ModelStore, StoredModel, TrackedRun, WritePrecondition};
use hearth_types::{
    EvaluationMetrics, HearthError, PipelineConfig, Result, ValidationReport, ValidationStatus,
};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Single-object store with monotonically increasing versions.
#[derive(Default)]
struct InMemoryStore {
    object: Mutex<Option<(Vec<u8>, String)>>,
    writes: AtomicUsize,
    puts: AtomicUsize,
    preconditions: Mutex<Vec<WritePrecondition>>,
}

impl InMemoryStore {
    fn seeded(bytes: Vec<u8>) -> Self {
        let store = Self::default();
        *store.object.lock().unwrap() = Some((bytes, "v0".into()));
        store
    }

    fn bytes(&self) -> Option<Vec<u8>> {
        self.object.lock().unwrap().as_ref().map(|(b, _)| b.clone())
    }

    fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    fn preconditions(&self) -> Vec<WritePrecondition> {
        self.preconditions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelStore for InMemoryStore {
    async fn fetch(&self) -> Result<Option<StoredModel>> {
        Ok(self
            .object
            .lock()
            .unwrap()
            .as_ref()
            .map(|(bytes, version)| StoredModel {
                bytes: bytes.clone(),
                version: Some(version.clone()),
            }))
    }

    async fn put(
        &self,
        bytes: Vec<u8>,
        precondition: &WritePrecondition,
    ) -> Result<Option<String>> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.preconditions.lock().unwrap().push(precondition.clone());
        let mut object = self.object.lock().unwrap();
        let current = object.as_ref().map(|(_, v)| v.as_str());
        let holds = match precondition {
            WritePrecondition::Any => true,
            WritePrecondition::Absent => current.is_none(),
            WritePrecondition::Version(expected) => current == Some(expected.as_str()),
        };
        if !holds {
            return Err(HearthError::StorePreconditionFailed {
                location: self.location(),
                message: format!("expected {precondition:?}, found {current:?}"),
            });
        }
        let version = format!("v{}", self.writes.fetch_add(1, Ordering::SeqCst) + 1);
        *object = Some((bytes, version.clone()));
        Ok(Some(version))
    }

    fn location(&self) -> String {
        "memory://models/model.bin".into()
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Lets a rival writer win the race between evaluation and promotion.
struct RacingStore {
    inner: InMemoryStore,
}

#[async_trait]
impl ModelStore for RacingStore {
    async fn fetch(&self) -> Result<Option<StoredModel>> {
        self.inner.fetch().await
    }

    async fn put(
        &self,
        bytes: Vec<u8>,
        precondition: &WritePrecondition,
    ) -> Result<Option<String>> {
        self.inner
            .put(b"rival".to_vec(), &WritePrecondition::Any)
            .await?;
        self.inner.put(bytes, precondition).await
    }

    fn location(&self) -> String {
        self.inner.location()
    }

    fn name(&self) -> &str {
        "racing"
    }
}

/// Reads always fail; writes go through.
#[derive(Default)]
struct UnreadableStore {
    inner: InMemoryStore,
}

#[async_trait]
impl ModelStore for UnreadableStore {
    async fn fetch(&self) -> Result<Option<StoredModel>> {
        Err(HearthError::StoreError {
            operation: "fetch".into(),
            location: self.location(),
            message: "HTTP 503: SlowDown".into(),
        })
    }

    async fn put(
        &self,
        bytes: Vec<u8>,
        precondition: &WritePrecondition,
    ) -> Result<Option<String>> {
        self.inner.put(bytes, precondition).await
    }

    fn location(&self) -> String {
        self.inner.location()
    }

    fn name(&self) -> &str {
        "unreadable"
    }
}

#[derive(Default)]
struct RecordingTracker {
    runs: Mutex<Vec<(TrackedRun, usize)>>,
}

impl RecordingTracker {
    fn runs(&self) -> Vec<(TrackedRun, usize)> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExperimentTracker for RecordingTracker {
    async fn record_run(&self, run: &TrackedRun, model_bytes: &[u8]) -> Result<String> {
        let mut runs = self.runs.lock().unwrap();
        runs.push((run.clone(), model_bytes.len()));
        Ok(format!("run-{}", runs.len()))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct OfflineTracker;

#[async_trait]
impl ExperimentTracker for OfflineTracker {
    async fn record_run(&self, _run: &TrackedRun, _model_bytes: &[u8]) -> Result<String> {
        Err(HearthError::TrackerError("connection refused".into()))
    }

    fn name(&self) -> &str {
        "offline"
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const LINEAR: &str = "LinearRegression: {}";
const STUMP: &str = "RandomForest: {n_estimators: 1, max_depth: 1, random_state: 7}";

/// A housing-like table whose target is an exact function of the features
/// plus a small deterministic wobble.
fn write_dataset(dir: &Path, rows: usize) -> PathBuf {
    let oceans = ["INLAND", "NEAR BAY", "<1H OCEAN"];
    let mut csv = String::from("rooms,age,ocean,median_house_value\n");
    for i in 0..rows {
        let rooms = 1 + (i * 7) % 9;
        let age = 5 + (i * 13) % 40;
        let ocean = oceans[i % oceans.len()];
        let bonus = match ocean {
            "INLAND" => 0.0,
            "NEAR BAY" => 40_000.0,
            _ => 25_000.0,
        };
        let wobble = ((i * 37) % 11) as f64 * 100.0;
        let value = 20_000.0 * rooms as f64 + 800.0 * age as f64 + bonus + wobble;
        csv.push_str(&format!("{rooms},{age},\"{ocean}\",{value}\n"));
    }
    let path = dir.join("housing_source.csv");
    std::fs::write(&path, csv).unwrap();
    path
}

fn config_yaml(root: &Path, source: &Path, target: &str, candidates: &[&str]) -> String {
    let candidates: String = candidates
        .iter()
        .map(|c| format!("    {c}\n"))
        .collect();
    let dir = |name: &str| root.join(name).display().to_string();
    format!(
        r#"
data:
  url: '{source}'
  target: {target}
  raw_dir: '{raw}'
  processed_dir: '{processed}'
  test_size: 0.2
model:
  model_dir: '{model}'
  model_name: model.bin
  candidates:
{candidates}mlflow:
  tracking_uri: 'file:{mlruns}'
  experiment_name: housing
metrics:
  metrics_dir: '{metrics}'
  reports_dir: '{reports}'
s3:
  bucket: models
  model_key: housing/model.bin
"#,
        source = source.display(),
        raw = dir("raw"),
        processed = dir("processed"),
        model = dir("model"),
        mlruns = dir("mlruns"),
        metrics = dir("metrics"),
        reports = dir("reports"),
    )
}

struct Workspace {
    dir: tempfile::TempDir,
    source: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source = write_dataset(dir.path(), 1000);
        Self { dir, source }
    }

    /// A fresh run directory so consecutive runs never share artifacts.
    fn config(&self, run: &str, candidates: &[&str]) -> PipelineConfig {
        self.config_with_target(run, "median_house_value", candidates)
    }

    fn config_with_target(&self, run: &str, target: &str, candidates: &[&str]) -> PipelineConfig {
        let root = self.dir.path().join(run);
        PipelineConfig::from_yaml_str(&config_yaml(&root, &self.source, target, candidates))
            .unwrap()
    }
}

async fn run_pipeline(
    config: PipelineConfig,
    store: Arc<dyn ModelStore>,
    tracker: Arc<dyn ExperimentTracker>,
) -> Result<PipelineResult> {
    PipelineExecutor::new(Arc::new(config), store, tracker)
        .run()
        .await
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_run_promotes_and_writes_every_artifact() {
    let ws = Workspace::new();
    let store = Arc::new(InMemoryStore::default());
    let tracker = Arc::new(RecordingTracker::default());

    let result = run_pipeline(ws.config("first", &[LINEAR]), store.clone(), tracker)
        .await
        .unwrap();

    assert_eq!(result.final_state, PipelineState::Done);
    assert_eq!(result.decision, PromotionDecision::Promoted);
    assert_eq!(
        result.visited_states,
        vec![
            PipelineState::Ingesting,
            PipelineState::Validating,
            PipelineState::Transforming,
            PipelineState::Training,
            PipelineState::ReportingDrift,
            PipelineState::Evaluating,
            PipelineState::Promoting,
            PipelineState::Done,
        ]
    );
    assert!(result.metrics.old_model_r2.is_none());
    assert!(result.metrics.promote);
    assert!(result.metrics.new_model_r2 > 0.9);
    assert_eq!(result.pushed_version.as_deref(), Some("v1"));

    let a = &result.artifacts;
    for path in [
        &a.raw_data,
        &a.validation_report,
        &a.train,
        &a.test,
        &a.model,
        &a.drift_report,
        &a.evaluation,
    ] {
        assert!(path.exists(), "missing artifact {}", path.display());
    }

    assert_eq!(Table::read_csv(&a.raw_data).unwrap().row_count(), 1000);
    assert_eq!(Table::read_csv(&a.train).unwrap().row_count(), 800);
    assert_eq!(Table::read_csv(&a.test).unwrap().row_count(), 200);

    let report = ValidationReport::load(&a.validation_report).unwrap();
    assert_eq!(report.status, ValidationStatus::Passed);

    let html = std::fs::read_to_string(&a.drift_report).unwrap();
    assert!(html.contains("rooms"));

    let saved = EvaluationMetrics::load(&a.evaluation).unwrap();
    assert!(saved.promote);
    assert!(saved.old_model_r2.is_none());

    assert_eq!(store.bytes().unwrap(), std::fs::read(&a.model).unwrap());
    assert_eq!(store.put_count(), 1);
}

#[tokio::test]
async fn identical_rerun_ties_and_retains() {
    let ws = Workspace::new();
    let store = Arc::new(InMemoryStore::default());
    let tracker = Arc::new(RecordingTracker::default());

    let first = run_pipeline(ws.config("a", &[LINEAR]), store.clone(), tracker.clone())
        .await
        .unwrap();
    let second = run_pipeline(ws.config("b", &[LINEAR]), store.clone(), tracker)
        .await
        .unwrap();

    assert_eq!(first.decision, PromotionDecision::Promoted);
    assert_eq!(second.decision, PromotionDecision::Retained);
    assert_eq!(second.metrics.old_model_r2, Some(second.metrics.new_model_r2));
    assert!(!second.metrics.promote);
    assert!(second.visited_states.contains(&PipelineState::Retaining));
    assert!(!second.visited_states.contains(&PipelineState::Promoting));
    assert!(second.pushed_version.is_none());
    assert_eq!(store.put_count(), 1);
}

#[tokio::test]
async fn weaker_challenger_is_retained() {
    let ws = Workspace::new();
    let store = Arc::new(InMemoryStore::default());
    let tracker = Arc::new(RecordingTracker::default());

    run_pipeline(ws.config("linear", &[LINEAR]), store.clone(), tracker.clone())
        .await
        .unwrap();
    let champion = store.bytes().unwrap();

    let result = run_pipeline(ws.config("stump", &[STUMP]), store.clone(), tracker)
        .await
        .unwrap();

    assert_eq!(result.decision, PromotionDecision::Retained);
    let old = result.metrics.old_model_r2.unwrap();
    assert!(result.metrics.new_model_r2 < old);
    assert_eq!(store.bytes().unwrap(), champion);
    assert_eq!(store.put_count(), 1);
}

#[tokio::test]
async fn stronger_challenger_replaces_champion() {
    let ws = Workspace::new();
    let store = Arc::new(InMemoryStore::default());
    let tracker = Arc::new(RecordingTracker::default());

    run_pipeline(ws.config("stump", &[STUMP]), store.clone(), tracker.clone())
        .await
        .unwrap();
    let result = run_pipeline(ws.config("linear", &[LINEAR]), store.clone(), tracker)
        .await
        .unwrap();

    assert_eq!(result.decision, PromotionDecision::Promoted);
    assert!(result.metrics.new_model_r2 > result.metrics.old_model_r2.unwrap());
    assert_eq!(result.pushed_version.as_deref(), Some("v2"));
    assert_eq!(store.bytes().unwrap(), std::fs::read(&result.artifacts.model).unwrap());
}

#[tokio::test]
async fn unreadable_champion_is_replaced() {
    let ws = Workspace::new();
    let store = Arc::new(InMemoryStore::seeded(b"not a model".to_vec()));
    let tracker = Arc::new(RecordingTracker::default());
    let events = EventEmitter::default();
    let mut rx = events.subscribe();

    let result = PipelineExecutor::new(
        Arc::new(ws.config("garbage", &[LINEAR])),
        store.clone(),
        tracker,
    )
    .with_events(events)
    .run()
    .await
    .unwrap();

    assert_eq!(result.decision, PromotionDecision::Promoted);
    assert!(result.metrics.old_model_r2.is_none());
    assert_eq!(result.pushed_version.as_deref(), Some("v1"));

    let warned = drain(&mut rx).into_iter().any(|e| {
        matches!(e, PipelineEvent::Warning { state: PipelineState::Evaluating, .. })
    });
    assert!(warned);
}

#[tokio::test]
async fn best_candidate_is_persisted_and_every_candidate_tracked() {
    let ws = Workspace::new();
    let store = Arc::new(InMemoryStore::default());
    let tracker = Arc::new(RecordingTracker::default());

    let result = run_pipeline(
        ws.config("both", &[STUMP, LINEAR]),
        store,
        tracker.clone(),
    )
    .await
    .unwrap();

    assert_eq!(result.best_model, "LinearRegression");
    let saved = ModelArtifact::load(&result.artifacts.model).unwrap();
    assert_eq!(saved.model_name(), "LinearRegression");

    let runs = tracker.runs();
    assert_eq!(runs.len(), 2);
    let names: Vec<&str> = runs.iter().map(|(r, _)| r.run_name.as_str()).collect();
    assert_eq!(names, vec!["RandomForest", "LinearRegression"]);
    for (run, model_len) in &runs {
        assert!(*model_len > 0);
        assert_eq!(run.metrics["train_rows"], 800.0);
        assert!(run.metrics["train_r2"] <= saved.train_r2);
        assert_eq!(run.tags["model_name"], run.run_name);
    }
    let forest_params: &BTreeMap<String, String> = &runs[0].0.params;
    assert_eq!(forest_params["n_estimators"], "1");
}

#[tokio::test]
async fn events_follow_state_order() {
    let ws = Workspace::new();
    let events = EventEmitter::default();
    let mut rx = events.subscribe();

    PipelineExecutor::new(
        Arc::new(ws.config("events", &[LINEAR])),
        Arc::new(InMemoryStore::default()),
        Arc::new(RecordingTracker::default()),
    )
    .with_events(events)
    .run()
    .await
    .unwrap();

    let all = drain(&mut rx);
    assert!(matches!(all.first(), Some(PipelineEvent::PipelineStarted { .. })));

    let started: Vec<PipelineState> = all
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::StageStarted { state } => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        started,
        vec![
            PipelineState::Ingesting,
            PipelineState::Validating,
            PipelineState::Transforming,
            PipelineState::Training,
            PipelineState::ReportingDrift,
            PipelineState::Evaluating,
            PipelineState::Promoting,
        ]
    );

    match all.last() {
        Some(PipelineEvent::PipelineCompleted {
            final_state,
            visited_states,
            ..
        }) => {
            assert_eq!(*final_state, PipelineState::Done);
            assert_eq!(visited_states.last(), Some(&PipelineState::Done));
        }
        other => panic!("expected PipelineCompleted last, got {other:?}"),
    }
    assert!(all
        .iter()
        .any(|e| matches!(e, PipelineEvent::ModelPushed { .. })));
    assert!(all
        .iter()
        .any(|e| matches!(e, PipelineEvent::DriftSummarized { total_columns: 4, .. })));
}

#[tokio::test]
async fn store_read_error_is_swallowed_and_push_is_unconditional() {
    let ws = Workspace::new();
    let store = Arc::new(UnreadableStore::default());
    let events = EventEmitter::default();
    let mut rx = events.subscribe();

    let result = PipelineExecutor::new(
        Arc::new(ws.config("unreadable", &[LINEAR])),
        store.clone(),
        Arc::new(RecordingTracker::default()),
    )
    .with_events(events)
    .run()
    .await
    .unwrap();

    assert_eq!(result.decision, PromotionDecision::Promoted);
    assert!(result.metrics.old_model_r2.is_none());
    assert_eq!(store.inner.put_count(), 1);
    assert_eq!(store.inner.preconditions(), vec![WritePrecondition::Any]);
    assert_eq!(
        store.inner.bytes().unwrap(),
        std::fs::read(&result.artifacts.model).unwrap()
    );

    let warnings: Vec<String> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            PipelineEvent::Warning {
                state: PipelineState::Evaluating,
                message,
            } => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("SlowDown"));
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn unsupported_candidate_fails_at_load() {
    let ws = Workspace::new();
    let root = ws.dir.path().join("xgb");
    let yaml = config_yaml(
        &root,
        &ws.source,
        "median_house_value",
        &["XGBoost: {max_depth: 4}"],
    );

    let err = PipelineConfig::from_yaml_str(&yaml).unwrap_err();
    assert!(err.is_config());
    assert!(matches!(err, HearthError::UnsupportedCandidate { .. }));
    assert!(!root.join("model").exists());
}

#[tokio::test]
async fn missing_target_fails_in_validating() {
    let ws = Workspace::new();
    let config = ws.config_with_target("notarget", "price", &[LINEAR]);
    let report_path = config.metrics.metrics_dir.join("data_validation_report.json");
    let store = Arc::new(InMemoryStore::default());
    let tracker = Arc::new(RecordingTracker::default());
    let events = EventEmitter::default();
    let mut rx = events.subscribe();

    let err = PipelineExecutor::new(Arc::new(config), store.clone(), tracker.clone())
        .with_events(events)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.failed_stage(), Some("VALIDATING"));
    assert!(matches!(
        err.root_cause(),
        HearthError::MissingTargetColumn { column } if column == "price"
    ));
    assert!(!report_path.exists());
    assert_eq!(store.put_count(), 0);
    assert!(tracker.runs().is_empty());

    let all = drain(&mut rx);
    assert!(all.iter().any(|e| matches!(
        e,
        PipelineEvent::PipelineFailed { state: PipelineState::Validating, .. }
    )));
    assert!(!all
        .iter()
        .any(|e| matches!(e, PipelineEvent::StageStarted { state: PipelineState::Transforming })));
}

#[tokio::test]
async fn concurrent_promotion_fails_in_promoting() {
    let ws = Workspace::new();
    let store = Arc::new(RacingStore {
        inner: InMemoryStore::default(),
    });

    let err = run_pipeline(
        ws.config("race", &[LINEAR]),
        store.clone(),
        Arc::new(RecordingTracker::default()),
    )
    .await
    .unwrap_err();

    assert_eq!(err.failed_stage(), Some("PROMOTING"));
    assert!(matches!(
        err.root_cause(),
        HearthError::StorePreconditionFailed { .. }
    ));
    assert_eq!(store.inner.bytes().unwrap(), b"rival".to_vec());
}

#[tokio::test]
async fn unreachable_source_fails_in_ingesting() {
    let ws = Workspace::new();
    let root = ws.dir.path().join("nosource");
    let yaml = config_yaml(
        &root,
        &ws.dir.path().join("does_not_exist.csv"),
        "median_house_value",
        &[LINEAR],
    );
    let config = PipelineConfig::from_yaml_str(&yaml).unwrap();

    let err = run_pipeline(
        config,
        Arc::new(InMemoryStore::default()),
        Arc::new(RecordingTracker::default()),
    )
    .await
    .unwrap_err();

    assert_eq!(err.failed_stage(), Some("INGESTING"));
    assert!(matches!(err.root_cause(), HearthError::FetchFailed { .. }));
}

#[tokio::test]
async fn tracker_failure_aborts_in_training() {
    let ws = Workspace::new();
    let config = ws.config("offline", &[LINEAR]);
    let model_path = config.model_path();
    let store = Arc::new(InMemoryStore::default());
    let events = EventEmitter::default();
    let mut rx = events.subscribe();

    let err = PipelineExecutor::new(Arc::new(config), store.clone(), Arc::new(OfflineTracker))
        .with_events(events)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.failed_stage(), Some("TRAINING"));
    assert!(matches!(err.root_cause(), HearthError::TrackerError(_)));
    assert!(!model_path.exists());
    assert_eq!(store.put_count(), 0);

    let started: Vec<PipelineState> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            PipelineEvent::StageStarted { state } => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(started.last(), Some(&PipelineState::Training));
}

#[tokio::test]
async fn drift_report_failure_aborts_before_evaluation() {
    let ws = Workspace::new();
    let config = ws.config("blocked", &[LINEAR]);
    // A plain file where the reports directory should go.
    std::fs::create_dir_all(config.metrics.reports_dir.parent().unwrap()).unwrap();
    std::fs::write(&config.metrics.reports_dir, b"not a directory").unwrap();
    let evaluation_path = config.metrics.metrics_dir.join("model_evaluation.json");
    let store = Arc::new(InMemoryStore::default());

    let err = run_pipeline(config, store.clone(), Arc::new(RecordingTracker::default()))
        .await
        .unwrap_err();

    assert_eq!(err.failed_stage(), Some("REPORTING_DRIFT"));
    assert!(!evaluation_path.exists());
    assert_eq!(store.put_count(), 0);
}
