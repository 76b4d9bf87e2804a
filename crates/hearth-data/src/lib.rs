//! Tabular data handling for the Hearth pipeline.
//!
//! - `Table`: raw CSV table with lossless round-tripping
//! - quality checks (missing cells, duplicate rows)
//! - seeded train/test split
//! - `FeatureEncoder`: numeric imputation plus one-hot encoding
//! - drift statistics and the HTML drift report

pub mod drift;
pub mod encoder;
pub mod quality;
pub mod split;
pub mod table;

pub use drift::{compute_drift, ColumnDrift, ColumnKind, DriftSummary, DriftTest};
pub use encoder::{FeatureColumn, FeatureEncoder};
pub use quality::{duplicate_row_count, missing_value_counts};
pub use split::{test_row_count, train_test_split, SPLIT_SEED};
pub use table::{is_missing, parse_number, Table, NA_TOKENS};
