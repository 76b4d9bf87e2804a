//! Random forest: bagged regression trees averaged at prediction time.

use ndarray::{ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use hearth_types::{ForestParams, HearthError, Result};

use crate::tree::{RegressionTree, TreeParams};
use crate::Predictor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>, params: &ForestParams) -> Result<Self> {
        let (n, p) = x.dim();
        if n == 0 {
            return Err(HearthError::FitFailed {
                model: "RandomForest".into(),
                message: "no training rows".into(),
            });
        }

        let seed = params.random_state.unwrap_or_else(rand::random);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            max_features: Some(features_per_split(p, params.max_features)),
        };

        let mut trees = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators {
            let rows: Vec<usize> = if params.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            trees.push(RegressionTree::fit(x, y, rows, &tree_params, &mut rng));
        }

        tracing::debug!(trees = trees.len(), seed, "Fitted random forest");
        Ok(Self { trees })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

/// `ceil(fraction * n_features)`, at least one.
fn features_per_split(n_features: usize, fraction: f64) -> usize {
    ((n_features as f64 * fraction).ceil() as usize).clamp(1, n_features.max(1))
}

impl Predictor for RandomForest {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
        total / self.trees.len() as f64
    }
}
