//! The fitted-model sum type and the shared prediction trait.

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use hearth_types::{Candidate, HearthError, Result};

use crate::boosting::GradientBoosting;
use crate::forest::RandomForest;
use crate::linear::LinearModel;

/// Row-wise prediction over encoded feature vectors.
pub trait Predictor {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64;

    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.outer_iter().map(|row| self.predict_row(row)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Regressor {
    Linear(LinearModel),
    Forest(RandomForest),
    Boosting(GradientBoosting),
}

impl Regressor {
    /// Fit the model described by `candidate`.
    pub fn fit(candidate: &Candidate, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(HearthError::FitFailed {
                model: candidate.name().to_string(),
                message: format!("{} feature rows but {} targets", x.nrows(), y.len()),
            });
        }
        Ok(match candidate {
            Candidate::LinearRegression(p) => Regressor::Linear(LinearModel::fit(x, y, p)?),
            Candidate::RandomForest(p) => Regressor::Forest(RandomForest::fit(x, y, p)?),
            Candidate::GradientBoosting(p) => Regressor::Boosting(GradientBoosting::fit(x, y, p)?),
        })
    }
}

impl Predictor for Regressor {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        match self {
            Regressor::Linear(m) => m.predict_row(row),
            Regressor::Forest(m) => m.predict_row(row),
            Regressor::Boosting(m) => m.predict_row(row),
        }
    }
}
