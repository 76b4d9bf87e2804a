//! Regression models and the persisted model artifact.
//!
//! - `Regressor`: fitted linear / random forest / gradient boosting model
//! - `Predictor`: row-wise prediction over encoded features
//! - `ModelArtifact`: regressor plus feature encoder, stored as a framed postcard blob
//! - `r2_score`: the comparison metric used for selection and promotion

pub mod artifact;
pub mod boosting;
pub mod forest;
pub mod linear;
pub mod metrics;
pub mod regressor;
pub mod tree;

pub use artifact::{ModelArtifact, FORMAT_VERSION, MAGIC};
pub use boosting::GradientBoosting;
pub use forest::RandomForest;
pub use linear::LinearModel;
pub use metrics::{mean_squared_error, r2_score};
pub use regressor::{Predictor, Regressor};
pub use tree::{Node, RegressionTree, TreeParams};
