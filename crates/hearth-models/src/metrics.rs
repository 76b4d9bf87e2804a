//! Regression scores.

use ndarray::ArrayView1;

/// Coefficient of determination, `1 - SS_res / SS_tot`.
///
/// A constant target scores 1.0 when predicted exactly and 0.0 otherwise. An
/// empty input scores 0.0.
pub fn r2_score(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> f64 {
    let n = y_true.len();
    if n == 0 {
        return 0.0;
    }
    let mean = y_true.sum() / n as f64;
    let (ss_res, ss_tot) = y_true
        .iter()
        .zip(y_pred.iter())
        .fold((0.0, 0.0), |(res, tot), (&t, &p)| {
            (res + (t - p) * (t - p), tot + (t - mean) * (t - mean))
        });

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Mean squared error.
pub fn mean_squared_error(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let sum: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(&t, &p)| (t - p) * (t - p))
        .sum();
    sum / y_true.len() as f64
}
