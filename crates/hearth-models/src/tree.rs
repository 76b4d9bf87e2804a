//! CART regression tree grown by exhaustive variance-reduction splits.
//!
//! Nodes live in a flat arena; `Split` children are indices into it. Rows with
//! `value <= threshold` go left.

use ndarray::{ArrayView1, ArrayView2};
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::Predictor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Growth limits for a single tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features examined per split. `None` examines all of them.
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    /// Grow a tree on the given row indices (repeats allowed, as in a bootstrap
    /// sample). `rows` must be non-empty.
    pub fn fit<R: Rng + ?Sized>(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        rows: Vec<usize>,
        params: &TreeParams,
        rng: &mut R,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(x, y, rows, 0, params, rng);
        tree
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    fn grow<R: Rng + ?Sized>(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        rows: Vec<usize>,
        depth: usize,
        params: &TreeParams,
        rng: &mut R,
    ) -> usize {
        let id = self.nodes.len();
        let n = rows.len();
        let sum: f64 = rows.iter().map(|&r| y[r]).sum();
        let mean = if n == 0 { 0.0 } else { sum / n as f64 };
        self.nodes.push(Node::Leaf { value: mean });

        let depth_reached = params.max_depth.is_some_and(|d| depth >= d);
        if depth_reached
            || n < 2
            || n < params.min_samples_split
            || n < 2 * params.min_samples_leaf
        {
            return id;
        }
        let first = y[rows[0]];
        if rows.iter().all(|&r| y[r] == first) {
            return id;
        }

        let n_features = x.ncols();
        let features: Vec<usize> = match params.max_features {
            Some(k) if k < n_features => index::sample(rng, n_features, k.max(1)).into_vec(),
            _ => (0..n_features).collect(),
        };

        let Some(split) = best_split(x, y, &rows, &features, params.min_samples_leaf) else {
            return id;
        };
        if split.gain <= 0.0 {
            return id;
        }

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| x[[r, split.feature]] <= split.threshold);

        let left = self.grow(x, y, left_rows, depth + 1, params, rng);
        let right = self.grow(x, y, right_rows, depth + 1, params, rng);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }
}

/// Best split over `features` by reduction in squared error.
fn best_split(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    rows: &[usize],
    features: &[usize],
    min_leaf: usize,
) -> Option<SplitCandidate> {
    let n = rows.len();
    let total: f64 = rows.iter().map(|&r| y[r]).sum();
    let base = total * total / n as f64;

    let mut best: Option<SplitCandidate> = None;
    let mut sorted: Vec<(f64, f64)> = Vec::with_capacity(n);

    for &feature in features {
        sorted.clear();
        sorted.extend(rows.iter().map(|&r| (x[[r, feature]], y[r])));
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_sum = 0.0;
        for i in 0..n - 1 {
            left_sum += sorted[i].1;
            let n_left = i + 1;
            let n_right = n - n_left;
            if sorted[i].0 == sorted[i + 1].0 || n_left < min_leaf || n_right < min_leaf {
                continue;
            }
            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64
                - base;

            if best.as_ref().map_or(true, |b| gain > b.gain) {
                let (lo, hi) = (sorted[i].0, sorted[i + 1].0);
                let mid = lo + (hi - lo) / 2.0;
                // Adjacent floats can round the midpoint up onto `hi`.
                let threshold = if mid < hi { mid } else { lo };
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    gain,
                });
            }
        }
    }
    best
}

impl Predictor for RegressionTree {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }
}
