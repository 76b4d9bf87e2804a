//! Ordinary least squares via the normal equations.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use hearth_types::{HearthError, LinearParams, Result};

use crate::Predictor;

/// Relative ridge term added to the Gram diagonal. Keeps collinear designs
/// (e.g. a full one-hot block next to an intercept) solvable without visibly
/// shrinking well-conditioned coefficients.
const RIDGE_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    coef: Vec<f64>,
    intercept: f64,
}

impl LinearModel {
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>, params: &LinearParams) -> Result<Self> {
        let (n, p) = x.dim();
        if n == 0 {
            return Err(fit_error("no training rows"));
        }

        let (x_mean, y_mean) = if params.fit_intercept {
            (
                x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(p)),
                y.sum() / n as f64,
            )
        } else {
            (Array1::zeros(p), 0.0)
        };

        let xc = &x - &x_mean;
        let yc = &y - y_mean;

        let mut gram: Array2<f64> = xc.t().dot(&xc);
        let rhs: Array1<f64> = xc.t().dot(&yc);

        let scale = if p == 0 {
            1.0
        } else {
            (gram.diag().sum() / p as f64).max(1.0)
        };
        for i in 0..p {
            gram[[i, i]] += RIDGE_EPSILON * scale;
        }

        let coef = solve(gram, rhs)?;
        let intercept = if params.fit_intercept {
            y_mean - coef.dot(&x_mean)
        } else {
            0.0
        };

        Ok(Self {
            coef: coef.to_vec(),
            intercept,
        })
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coef
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Predictor for LinearModel {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.intercept + self.coef.iter().zip(row.iter()).map(|(c, v)| c * v).sum::<f64>()
    }
}

/// Solve `a · x = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if !(a[[pivot, col]].abs() > f64::MIN_POSITIVE) {
            return Err(fit_error("singular design matrix"));
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }

        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    if x.iter().any(|v: &f64| !v.is_finite()) {
        return Err(fit_error("solution is not finite"));
    }
    Ok(x)
}

fn fit_error(message: &str) -> HearthError {
    HearthError::FitFailed {
        model: "LinearRegression".into(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn recovers_exact_linear_relation() {
        let x = array![[1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0], [5.0, 3.0]];
        let y = x.column(0).mapv(|a| 2.0 * a) + x.column(1).mapv(|b| -3.0 * b) + 7.0;
        let model = LinearModel::fit(x.view(), y.view(), &LinearParams::default()).unwrap();
        assert_abs_diff_eq!(model.coefficients()[0], 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(model.coefficients()[1], -3.0, epsilon = 1e-5);
        assert_abs_diff_eq!(model.intercept(), 7.0, epsilon = 1e-4);
        assert_abs_diff_eq!(model.predict_row(array![10.0, 2.0].view()), 21.0, epsilon = 1e-3);
    }

    #[test]
    fn without_intercept_passes_through_origin() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![2.0, 4.0, 6.0];
        let params = LinearParams { fit_intercept: false };
        let model = LinearModel::fit(x.view(), y.view(), &params).unwrap();
        assert_eq!(model.intercept(), 0.0);
        assert_abs_diff_eq!(model.coefficients()[0], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn collinear_one_hot_block_is_solvable() {
        // Two dummies that always sum to one, plus an intercept.
        let x = array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0]];
        let y = array![10.0, 20.0, 10.0, 20.0];
        let model = LinearModel::fit(x.view(), y.view(), &LinearParams::default()).unwrap();
        let preds = model.predict(x.view());
        for (p, t) in preds.iter().zip(y.iter()) {
            assert_abs_diff_eq!(*p, *t, epsilon = 1e-3);
        }
    }

    #[test]
    fn no_features_predicts_mean() {
        let x = Array2::<f64>::zeros((3, 0));
        let y = array![1.0, 2.0, 6.0];
        let model = LinearModel::fit(x.view(), y.view(), &LinearParams::default()).unwrap();
        assert_abs_diff_eq!(model.intercept(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_input_fails() {
        let x = Array2::<f64>::zeros((0, 2));
        let y = Array1::<f64>::zeros(0);
        let err = LinearModel::fit(x.view(), y.view(), &LinearParams::default()).unwrap_err();
        assert!(matches!(err, HearthError::FitFailed { .. }));
    }
}
