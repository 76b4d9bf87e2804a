//! Persisted model artifact.
//!
//! An artifact bundles the fitted regressor with the feature encoder it was
//! trained behind, so a consumer only needs raw column values to predict.
//!
//! # Format
//!
//! ```text
//! magic "HRTH" (4) | format version u16 LE (2) | reserved (2) | postcard payload
//! ```

use std::collections::HashMap;
use std::path::Path;

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use hearth_data::{FeatureEncoder, Table};
use hearth_types::{Candidate, HearthError, Result};

use crate::metrics::r2_score;
use crate::regressor::{Predictor, Regressor};

pub const MAGIC: &[u8; 4] = b"HRTH";
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub candidate: Candidate,
    pub encoder: FeatureEncoder,
    pub regressor: Regressor,
    pub train_r2: f64,
    pub train_rows: usize,
}

impl ModelArtifact {
    /// Fit `candidate` on `train`, encoding every non-target column.
    pub fn train(candidate: &Candidate, train: &Table, target: &str) -> Result<Self> {
        let encoder = FeatureEncoder::fit(train, target)?;
        let x = encoder.transform(train)?;
        let y = encoder.target_values(train)?;

        let regressor = Regressor::fit(candidate, x.view(), y.view())?;
        let preds = regressor.predict(x.view());
        if preds.iter().any(|p| !p.is_finite()) {
            return Err(HearthError::FitFailed {
                model: candidate.name().to_string(),
                message: "model produced non-finite predictions".into(),
            });
        }

        Ok(Self {
            candidate: candidate.clone(),
            encoder,
            regressor,
            train_r2: r2_score(y.view(), preds.view()),
            train_rows: train.row_count(),
        })
    }

    pub fn model_name(&self) -> &'static str {
        self.candidate.name()
    }

    /// Predict every row of `table`. The target column, if present, is ignored.
    pub fn predict_table(&self, table: &Table) -> Result<Array1<f64>> {
        let x = self.encoder.transform(table)?;
        Ok(self.regressor.predict(x.view()))
    }

    /// Predict one record of raw column values keyed by column name.
    pub fn predict_record(&self, record: &HashMap<String, String>) -> f64 {
        let features = self.encoder.encode_record(record);
        self.regressor.predict_row(ArrayView1::from(&features))
    }

    /// R² against the target column of `table`.
    pub fn score(&self, table: &Table) -> Result<f64> {
        let y = self.encoder.target_values(table)?;
        let preds = self.predict_table(table)?;
        Ok(r2_score(y.view(), preds.view()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = postcard::to_stdvec(self)
            .map_err(|e| HearthError::InvalidArtifact(format!("encode failed: {e}")))?;
        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&[0, 0]);
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(HearthError::InvalidArtifact(format!(
                "{} bytes is shorter than the header",
                bytes.len()
            )));
        }
        if &bytes[..4] != MAGIC {
            return Err(HearthError::InvalidArtifact("bad magic bytes".into()));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(HearthError::InvalidArtifact(format!(
                "unsupported format version {version} (expected {FORMAT_VERSION})"
            )));
        }
        postcard::from_bytes(&bytes[HEADER_SIZE..])
            .map_err(|e| HearthError::InvalidArtifact(format!("decode failed: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HearthError::ArtifactMissing {
                path: path.display().to_string(),
            });
        }
        Self::from_bytes(&std::fs::read(path)?)
    }
}
