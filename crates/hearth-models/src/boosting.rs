//! Least-squares gradient boosting.
//!
//! Starts from the target mean and fits each tree to the current residuals,
//! adding its prediction scaled by the learning rate. With `subsample < 1` each
//! round sees a random subset of rows drawn without replacement.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::index;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use hearth_types::{BoostingParams, HearthError, Result};

use crate::tree::{RegressionTree, TreeParams};
use crate::Predictor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoosting {
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>, params: &BoostingParams) -> Result<Self> {
        let n = x.nrows();
        if n == 0 {
            return Err(HearthError::FitFailed {
                model: "GradientBoosting".into(),
                message: "no training rows".into(),
            });
        }

        let seed = params.random_state.unwrap_or_else(rand::random);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let tree_params = TreeParams {
            max_depth: Some(params.max_depth),
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            max_features: None,
        };
        let rows_per_round = ((n as f64 * params.subsample).ceil() as usize).clamp(1, n);

        let base_score = y.sum() / n as f64;
        let mut current = Array1::from_elem(n, base_score);
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            let residuals = &y - &current;
            let rows = if rows_per_round < n {
                index::sample(&mut rng, n, rows_per_round).into_vec()
            } else {
                (0..n).collect()
            };
            let tree = RegressionTree::fit(x, residuals.view(), rows, &tree_params, &mut rng);
            for (i, row) in x.outer_iter().enumerate() {
                current[i] += params.learning_rate * tree.predict_row(row);
            }
            trees.push(tree);
        }

        tracing::debug!(trees = trees.len(), seed, "Fitted gradient boosting");
        Ok(Self {
            base_score,
            learning_rate: params.learning_rate,
            trees,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Predictor for GradientBoosting {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.base_score
            + self.learning_rate * self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }
}
