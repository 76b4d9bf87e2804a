//! Column-wise data drift between a reference table and a current table.
//!
//! Numeric columns use the two-sample Kolmogorov–Smirnov test; categorical
//! columns use the Jensen–Shannon distance between level frequencies. The
//! dataset counts as drifted when at least [`DATASET_DRIFT_SHARE`] of its columns
//! drift.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use hearth_types::{HearthError, Result};

use crate::table::{is_missing, parse_number, Table};

/// Column drifts when the KS p-value falls below this.
pub const KS_P_VALUE_THRESHOLD: f64 = 0.05;
/// Column drifts when the JS distance reaches this.
pub const JS_DISTANCE_THRESHOLD: f64 = 0.1;
pub const DATASET_DRIFT_SHARE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriftTest {
    KolmogorovSmirnov,
    JensenShannon,
}

impl DriftTest {
    pub fn label(&self) -> &'static str {
        match self {
            DriftTest::KolmogorovSmirnov => "K-S p-value",
            DriftTest::JensenShannon => "Jensen-Shannon distance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDrift {
    pub column: String,
    pub kind: ColumnKind,
    pub test: DriftTest,
    pub score: f64,
    pub threshold: f64,
    pub drifted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftSummary {
    pub reference_rows: usize,
    pub current_rows: usize,
    pub columns: Vec<ColumnDrift>,
    pub drifted_columns: usize,
    pub share_drifted: f64,
    pub dataset_drift: bool,
}

/// Compare every column of `reference` against the same column in `current`.
pub fn compute_drift(reference: &Table, current: &Table) -> Result<DriftSummary> {
    let mut columns = Vec::with_capacity(reference.column_count());

    for (ref_idx, name) in reference.columns().iter().enumerate() {
        let cur_idx = current
            .column_index(name)
            .ok_or_else(|| HearthError::MalformedTable {
                source_name: "current data".into(),
                message: format!("column '{name}' present in reference data is missing"),
            })?;

        let ref_cells: Vec<&str> = reference
            .column_values(ref_idx)
            .filter(|c| !is_missing(c))
            .collect();
        let cur_cells: Vec<&str> = current
            .column_values(cur_idx)
            .filter(|c| !is_missing(c))
            .collect();

        let ref_nums: Vec<f64> = ref_cells.iter().filter_map(|c| parse_number(c)).collect();
        let cur_nums: Vec<f64> = cur_cells.iter().filter_map(|c| parse_number(c)).collect();
        let numeric = ref_nums.len() == ref_cells.len() && cur_nums.len() == cur_cells.len();

        let drift = if numeric {
            let (_, p_value) = ks_two_sample(ref_nums, cur_nums);
            ColumnDrift {
                column: name.clone(),
                kind: ColumnKind::Numeric,
                test: DriftTest::KolmogorovSmirnov,
                score: p_value,
                threshold: KS_P_VALUE_THRESHOLD,
                drifted: p_value < KS_P_VALUE_THRESHOLD,
            }
        } else {
            let distance = jensen_shannon_distance(&ref_cells, &cur_cells);
            ColumnDrift {
                column: name.clone(),
                kind: ColumnKind::Categorical,
                test: DriftTest::JensenShannon,
                score: distance,
                threshold: JS_DISTANCE_THRESHOLD,
                drifted: distance >= JS_DISTANCE_THRESHOLD,
            }
        };
        columns.push(drift);
    }

    let drifted_columns = columns.iter().filter(|c| c.drifted).count();
    let share_drifted = if columns.is_empty() {
        0.0
    } else {
        drifted_columns as f64 / columns.len() as f64
    };

    tracing::debug!(
        columns = columns.len(),
        drifted = drifted_columns,
        share = share_drifted,
        "Computed column drift"
    );

    Ok(DriftSummary {
        reference_rows: reference.row_count(),
        current_rows: current.row_count(),
        columns,
        drifted_columns,
        share_drifted,
        dataset_drift: share_drifted >= DATASET_DRIFT_SHARE,
    })
}

/// Two-sample Kolmogorov–Smirnov statistic and asymptotic p-value.
///
/// An empty sample on either side yields `(0.0, 1.0)`.
pub fn ks_two_sample(mut a: Vec<f64>, mut b: Vec<f64>) -> (f64, f64) {
    if a.is_empty() || b.is_empty() {
        return (0.0, 1.0);
    }
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);

    let (n, m) = (a.len(), b.len());
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;
    while i < n && j < m {
        let x = a[i].min(b[j]);
        while i < n && a[i] <= x {
            i += 1;
        }
        while j < m && b[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n as f64 - j as f64 / m as f64).abs());
    }

    let en = ((n * m) as f64 / (n + m) as f64).sqrt();
    let lambda = (en + 0.12 + 0.11 / en) * d;
    (d, kolmogorov_q(lambda))
}

/// Complementary Kolmogorov distribution `Q_KS(λ)`.
fn kolmogorov_q(lambda: f64) -> f64 {
    if lambda < 1e-3 {
        return 1.0;
    }
    let a2 = -2.0 * lambda * lambda;
    let mut sum = 0.0;
    let mut sign = 1.0;
    let mut prev_term = 0.0f64;
    for j in 1..=100 {
        let jf = j as f64;
        let term = sign * 2.0 * (a2 * jf * jf).exp();
        sum += term;
        if term.abs() <= 1e-10 * prev_term.abs() || term.abs() <= 1e-16 * sum.abs() {
            return sum.clamp(0.0, 1.0);
        }
        sign = -sign;
        prev_term = term;
    }
    // Series did not converge, which only happens for tiny lambda.
    1.0
}

/// Jensen–Shannon distance (base 2, in `[0, 1]`) between level frequencies.
pub fn jensen_shannon_distance(reference: &[&str], current: &[&str]) -> f64 {
    if reference.is_empty() || current.is_empty() {
        return 0.0;
    }
    let mut counts: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for c in reference {
        counts.entry(c.trim()).or_default().0 += 1.0;
    }
    for c in current {
        counts.entry(c.trim()).or_default().1 += 1.0;
    }

    let (n_ref, n_cur) = (reference.len() as f64, current.len() as f64);
    let mut divergence = 0.0;
    for &(r, c) in counts.values() {
        let p = r / n_ref;
        let q = c / n_cur;
        let m = 0.5 * (p + q);
        if p > 0.0 {
            divergence += 0.5 * p * (p / m).log2();
        }
        if q > 0.0 {
            divergence += 0.5 * q * (q / m).log2();
        }
    }
    divergence.max(0.0).sqrt().min(1.0)
}

impl DriftSummary {
    /// Render a standalone HTML report.
    pub fn to_html(&self, generated_at: &str) -> String {
        let mut html = String::with_capacity(4096);
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
        html.push_str("<title>Data Drift Report</title>\n<style>\n");
        html.push_str(
            "body{font-family:sans-serif;margin:2rem;color:#222}\
             table{border-collapse:collapse;width:100%}\
             th,td{border:1px solid #ccc;padding:.4rem .6rem;text-align:left}\
             th{background:#f3f3f3}\
             .drift{color:#b00020;font-weight:bold}.ok{color:#1b5e20}\n",
        );
        html.push_str("</style>\n</head>\n<body>\n<h1>Data Drift Report</h1>\n");

        let verdict = if self.dataset_drift {
            "<span class=\"drift\">Dataset drift detected</span>"
        } else {
            "<span class=\"ok\">No dataset drift detected</span>"
        };
        let _ = writeln!(html, "<p>{verdict}</p>");
        let _ = writeln!(
            html,
            "<p>Drifted columns: {} of {} ({:.1}%). Threshold share: {:.0}%.</p>",
            self.drifted_columns,
            self.columns.len(),
            self.share_drifted * 100.0,
            DATASET_DRIFT_SHARE * 100.0
        );
        let _ = writeln!(
            html,
            "<p>Reference rows: {} &middot; Current rows: {} &middot; Generated: {}</p>",
            self.reference_rows,
            self.current_rows,
            escape_html(generated_at)
        );

        html.push_str(
            "<table>\n<thead><tr><th>Column</th><th>Type</th><th>Test</th>\
             <th>Score</th><th>Threshold</th><th>Drift</th></tr></thead>\n<tbody>\n",
        );
        for col in &self.columns {
            let kind = match col.kind {
                ColumnKind::Numeric => "numeric",
                ColumnKind::Categorical => "categorical",
            };
            let flag = if col.drifted {
                "<span class=\"drift\">Detected</span>"
            } else {
                "<span class=\"ok\">Not detected</span>"
            };
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.4}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&col.column),
                kind,
                col.test.label(),
                col.score,
                col.threshold,
                flag
            );
        }
        html.push_str("</tbody>\n</table>\n</body>\n</html>\n");
        html
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
