//! Structured records persisted by the validation and evaluation stages.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Passed,
    Failed,
}

/// Data-quality summary of the raw dataset.
///
/// `status` is `PASSED` only when the target column exists. Missing values and
/// duplicate rows are reported but never fail validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub file_path: String,
    pub row_count: usize,
    pub column_count: usize,
    /// Only columns with at least one missing cell.
    pub missing_values: BTreeMap<String, usize>,
    pub duplicate_rows: usize,
    pub target_column_present: bool,
    pub status: ValidationStatus,
}

impl ValidationReport {
    /// Serialize this report as pretty JSON and write it to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// Champion/challenger scores and the resulting promotion decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub new_model_r2: f64,
    /// `None` when no production model could be scored.
    pub old_model_r2: Option<f64>,
    pub promote: bool,
}

impl EvaluationMetrics {
    /// Promote when there is no champion, or when the challenger strictly beats it.
    pub fn decide(new_model_r2: f64, old_model_r2: Option<f64>) -> Self {
        let promote = match old_model_r2 {
            None => true,
            Some(old) => new_model_r2 > old,
        };
        Self {
            new_model_r2,
            old_model_r2,
            promote,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}
