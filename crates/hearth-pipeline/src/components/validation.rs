//! Data-quality gate: the run only continues when the target column exists.

use std::path::{Path, PathBuf};

use hearth_data::{duplicate_row_count, missing_value_counts, Table};
use hearth_types::{HearthError, MetricsConfig, Result, ValidationReport, ValidationStatus};

use crate::events::EventEmitter;
use crate::state::PipelineState;

pub const VALIDATION_REPORT_FILE: &str = "data_validation_report.json";

pub struct DataValidation {
    target: String,
    metrics_dir: PathBuf,
    events: EventEmitter,
}

impl DataValidation {
    pub fn new(target: &str, metrics: &MetricsConfig, events: EventEmitter) -> Self {
        Self {
            target: target.to_string(),
            metrics_dir: metrics.metrics_dir.clone(),
            events,
        }
    }

    pub fn report_path(&self) -> PathBuf {
        self.metrics_dir.join(VALIDATION_REPORT_FILE)
    }

    /// Validate the raw dataset and write a `PASSED` report.
    ///
    /// Returns `Ok(true)` on success. A missing target column is an error and
    /// leaves no report behind; this never returns `Ok(false)`.
    pub async fn run(&self, raw_path: &Path) -> Result<bool> {
        let table = Table::read_csv(raw_path)?;
        let (rows, columns) = table.shape();
        tracing::info!(path = %raw_path.display(), rows, columns, "Validating dataset");

        let missing_values = missing_value_counts(&table);
        if missing_values.is_empty() {
            tracing::info!("No missing values found");
        } else {
            self.events.warn(
                PipelineState::Validating,
                format!("missing values found in columns: {missing_values:?}"),
            );
        }

        let duplicate_rows = duplicate_row_count(&table);
        if duplicate_rows > 0 {
            self.events.warn(
                PipelineState::Validating,
                format!("duplicate rows detected: {duplicate_rows}"),
            );
        }

        if !table.has_column(&self.target) {
            tracing::error!(target_column = %self.target, "Target column is missing");
            return Err(HearthError::MissingTargetColumn {
                column: self.target.clone(),
            });
        }

        let report = ValidationReport {
            file_path: raw_path.display().to_string(),
            row_count: rows,
            column_count: columns,
            missing_values,
            duplicate_rows,
            target_column_present: true,
            status: ValidationStatus::Passed,
        };
        tokio::fs::create_dir_all(&self.metrics_dir).await?;
        let path = self.report_path();
        report.save(&path)?;
        tracing::info!(path = %path.display(), "Validation report saved");
        Ok(true)
    }
}
