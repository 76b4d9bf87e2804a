//! Candidate model kinds and their hyperparameter schemas.
//!
//! The set of trainable models is closed: a candidate name in the configuration
//! either resolves to one of the [`Candidate`] variants when the configuration is
//! loaded, or the load fails with [`HearthError::UnsupportedCandidate`].

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{HearthError, Result};

/// Ordinary least squares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinearParams {
    pub fit_intercept: bool,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            fit_intercept: true,
        }
    }
}

/// Bagged regression trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of features considered at each split.
    pub max_features: f64,
    pub bootstrap: bool,
    pub random_state: Option<u64>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 1.0,
            bootstrap: true,
            random_state: None,
        }
    }
}

/// Least-squares gradient boosting over shallow regression trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows sampled (without replacement) per boosting round.
    pub subsample: f64,
    pub random_state: Option<u64>,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: None,
        }
    }
}

/// One named model configuration considered during training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Candidate {
    LinearRegression(LinearParams),
    RandomForest(ForestParams),
    GradientBoosting(BoostingParams),
}

impl Candidate {
    /// The configuration name of this candidate, also used as the tracked run name.
    pub fn name(&self) -> &'static str {
        match self {
            Candidate::LinearRegression(_) => "LinearRegression",
            Candidate::RandomForest(_) => "RandomForest",
            Candidate::GradientBoosting(_) => "GradientBoosting",
        }
    }

    /// Resolve a `name: params` entry from the configuration file.
    ///
    /// A null or empty params value yields the variant's defaults.
    pub fn from_entry(name: &str, params: serde_yaml::Value) -> Result<Self> {
        let candidate = match name {
            "LinearRegression" => Candidate::LinearRegression(parse_params(name, params)?),
            "RandomForest" => Candidate::RandomForest(parse_params(name, params)?),
            "GradientBoosting" => Candidate::GradientBoosting(parse_params(name, params)?),
            other => {
                return Err(HearthError::UnsupportedCandidate {
                    name: other.to_string(),
                })
            }
        };
        candidate.validate()?;
        Ok(candidate)
    }

    /// Range checks on hyperparameters that would otherwise surface as fit failures.
    pub fn validate(&self) -> Result<()> {
        let key = |field: &str| format!("model.candidates.{}.{}", self.name(), field);
        let invalid = |field: &str, message: &str| HearthError::InvalidConfig {
            key: key(field),
            message: message.to_string(),
        };

        match self {
            Candidate::LinearRegression(_) => Ok(()),
            Candidate::RandomForest(p) => {
                if p.n_estimators == 0 {
                    return Err(invalid("n_estimators", "must be at least 1"));
                }
                if p.max_depth == Some(0) {
                    return Err(invalid("max_depth", "must be at least 1"));
                }
                if p.min_samples_split < 2 {
                    return Err(invalid("min_samples_split", "must be at least 2"));
                }
                if p.min_samples_leaf == 0 {
                    return Err(invalid("min_samples_leaf", "must be at least 1"));
                }
                if !(p.max_features > 0.0 && p.max_features <= 1.0) {
                    return Err(invalid("max_features", "must be in (0, 1]"));
                }
                Ok(())
            }
            Candidate::GradientBoosting(p) => {
                if p.n_estimators == 0 {
                    return Err(invalid("n_estimators", "must be at least 1"));
                }
                if !(p.learning_rate > 0.0 && p.learning_rate.is_finite()) {
                    return Err(invalid("learning_rate", "must be a positive number"));
                }
                if p.max_depth == 0 {
                    return Err(invalid("max_depth", "must be at least 1"));
                }
                if p.min_samples_split < 2 {
                    return Err(invalid("min_samples_split", "must be at least 2"));
                }
                if p.min_samples_leaf == 0 {
                    return Err(invalid("min_samples_leaf", "must be at least 1"));
                }
                if !(p.subsample > 0.0 && p.subsample <= 1.0) {
                    return Err(invalid("subsample", "must be in (0, 1]"));
                }
                Ok(())
            }
        }
    }

    /// Hyperparameters flattened to strings for experiment tracking.
    ///
    /// Unset optional parameters are omitted.
    pub fn params(&self) -> BTreeMap<String, String> {
        let value = match self {
            Candidate::LinearRegression(p) => serde_json::to_value(p),
            Candidate::RandomForest(p) => serde_json::to_value(p),
            Candidate::GradientBoosting(p) => serde_json::to_value(p),
        };
        let mut out = BTreeMap::new();
        if let Ok(serde_json::Value::Object(map)) = value {
            for (k, v) in map {
                match v {
                    serde_json::Value::Null => {}
                    serde_json::Value::String(s) => {
                        out.insert(k, s);
                    }
                    other => {
                        out.insert(k, other.to_string());
                    }
                }
            }
        }
        out
    }
}

fn parse_params<T: DeserializeOwned + Default>(name: &str, params: serde_yaml::Value) -> Result<T> {
    if params.is_null() {
        return Ok(T::default());
    }
    serde_yaml::from_value(params).map_err(|e| HearthError::InvalidConfig {
        key: format!("model.candidates.{name}"),
        message: e.to_string(),
    })
}
