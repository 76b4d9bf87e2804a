//! Reference-vs-current drift report over the train and test partitions.

use std::path::{Path, PathBuf};

use hearth_data::{compute_drift, Table};
use hearth_types::{MetricsConfig, Result};

use crate::events::{EventEmitter, PipelineEvent};

pub const DRIFT_REPORT_FILE: &str = "data_drift_report.html";

pub struct DriftReporter {
    reports_dir: PathBuf,
    events: EventEmitter,
}

impl DriftReporter {
    pub fn new(metrics: &MetricsConfig, events: EventEmitter) -> Self {
        Self {
            reports_dir: metrics.reports_dir.clone(),
            events,
        }
    }

    /// Write the HTML report and return its path. The verdict is informational
    /// only; it never influences promotion.
    pub async fn run(&self, train_path: &Path, test_path: &Path) -> Result<PathBuf> {
        let reference = Table::read_csv(train_path)?;
        let current = Table::read_csv(test_path)?;
        let summary = compute_drift(&reference, &current)?;

        tokio::fs::create_dir_all(&self.reports_dir).await?;
        let path = self.reports_dir.join(DRIFT_REPORT_FILE);
        let html = summary.to_html(&chrono::Utc::now().to_rfc3339());
        tokio::fs::write(&path, html).await?;

        tracing::info!(
            path = %path.display(),
            drifted_columns = summary.drifted_columns,
            total_columns = summary.columns.len(),
            dataset_drift = summary.dataset_drift,
            "Drift report saved"
        );
        self.events.emit(PipelineEvent::DriftSummarized {
            drifted_columns: summary.drifted_columns,
            total_columns: summary.columns.len(),
            dataset_drift: summary.dataset_drift,
        });
        Ok(path)
    }
}
