//! Typed pipeline configuration.
//!
//! The configuration file is YAML with five sections (`data`, `model`, `mlflow`,
//! `metrics`, `s3`), deserialized straight into the section structs below.
//! Errors carry the full dotted key path, and the result is validated once and
//! immutable for the rest of the run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::{HearthError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Dataset source: an `http(s)://` URL, a `file://` URL, or a local path.
    pub url: String,
    pub target: String,
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub test_size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    pub model_dir: PathBuf,
    pub model_name: String,
    /// Candidates in the order they appear in the configuration file.
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub tracking_uri: String,
    pub experiment_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub metrics_dir: PathBuf,
    pub reports_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub bucket: String,
    pub model_key: String,
    /// Unset for Amazon S3, `file://<dir>` for a local store, or an `http(s)`
    /// base URL for a plain-HTTP gateway.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl StoreConfig {
    /// Human-readable `s3://bucket/key` form used in logs and errors.
    pub fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.model_key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub model: ModelConfig,
    pub mlflow: TrackingConfig,
    pub metrics: MetricsConfig,
    pub s3: StoreConfig,
}

/// `model` section as written: candidates stay an ordered name-to-params
/// mapping until each entry is resolved to a [`Candidate`].
#[derive(Deserialize)]
struct ModelSection {
    model_dir: PathBuf,
    model_name: String,
    candidates: serde_yaml::Mapping,
}

#[derive(Deserialize)]
struct ConfigFile {
    data: DataConfig,
    model: ModelSection,
    mlflow: TrackingConfig,
    metrics: MetricsConfig,
    s3: StoreConfig,
}

impl PipelineConfig {
    /// Read, parse, and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| HearthError::InvalidConfig {
            key: path.display().to_string(),
            message: format!("cannot read config file: {e}"),
        })?;
        let config = Self::from_yaml_str(&source)?;
        tracing::debug!(
            path = %path.display(),
            candidates = config.model.candidates.len(),
            "Config loaded"
        );
        Ok(config)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(source);
        let file: ConfigFile =
            serde_path_to_error::deserialize(deserializer).map_err(config_error)?;

        let mut candidates = Vec::with_capacity(file.model.candidates.len());
        for (name, params) in file.model.candidates {
            let name = name.as_str().ok_or_else(|| HearthError::InvalidConfig {
                key: "model.candidates".into(),
                message: "candidate names must be strings".into(),
            })?;
            candidates.push(Candidate::from_entry(name, params)?);
        }

        let config = PipelineConfig {
            data: file.data,
            model: ModelConfig {
                model_dir: file.model.model_dir,
                model_name: file.model.model_name,
                candidates,
            },
            mlflow: file.mlflow,
            metrics: file.metrics,
            s3: file.s3,
        };
        config.validate()?;
        Ok(config)
    }

    /// Semantic checks that parsing alone cannot express.
    pub fn validate(&self) -> Result<()> {
        let ts = self.data.test_size;
        if !(ts > 0.0 && ts < 1.0) {
            return Err(HearthError::InvalidConfig {
                key: "data.test_size".into(),
                message: format!("{ts} is outside the open interval (0, 1)"),
            });
        }
        if self.data.target.trim().is_empty() {
            return Err(HearthError::InvalidConfig {
                key: "data.target".into(),
                message: "must not be empty".into(),
            });
        }
        if self.model.model_name.trim().is_empty()
            || self.model.model_name.contains(['/', '\\'])
        {
            return Err(HearthError::InvalidConfig {
                key: "model.model_name".into(),
                message: "must be a plain file name".into(),
            });
        }
        if self.model.candidates.is_empty() {
            return Err(HearthError::InvalidConfig {
                key: "model.candidates".into(),
                message: "at least one candidate is required".into(),
            });
        }
        for candidate in &self.model.candidates {
            candidate.validate()?;
        }
        Ok(())
    }

    /// Resolve every relative local path against `root`: artifact
    /// directories, a path-like `data.url`, a `file:` tracking URI, and a
    /// `file://` store endpoint. Remote URLs and absolute paths are kept.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = root.join(&*p);
            }
        };
        rebase(&mut self.data.raw_dir);
        rebase(&mut self.data.processed_dir);
        rebase(&mut self.model.model_dir);
        rebase(&mut self.metrics.metrics_dir);
        rebase(&mut self.metrics.reports_dir);

        self.data.url = rebase_locator(&self.data.url, root);
        self.mlflow.tracking_uri = rebase_locator(&self.mlflow.tracking_uri, root);
        if let Some(endpoint) = self.s3.endpoint.take() {
            self.s3.endpoint = Some(rebase_locator(&endpoint, root));
        }
        self
    }

    /// Where the trainer persists the selected model.
    pub fn model_path(&self) -> PathBuf {
        self.model.model_dir.join(&self.model.model_name)
    }
}

/// Rebase the path part of a `file://`, `file:`, or bare-path locator.
fn rebase_locator(locator: &str, root: &Path) -> String {
    let (scheme, rest) = if let Some(rest) = locator.strip_prefix("file://") {
        ("file://", rest)
    } else if let Some(rest) = locator.strip_prefix("file:") {
        ("file:", rest)
    } else if locator.contains("://") {
        return locator.to_string();
    } else {
        ("", locator)
    };
    if rest.is_empty() || Path::new(rest).is_absolute() {
        return locator.to_string();
    }
    let rest = rest.strip_prefix("./").unwrap_or(rest);
    format!("{scheme}{}", root.join(rest).display())
}

/// Turn a deserialization failure into a config error keyed by dotted path.
fn config_error(err: serde_path_to_error::Error<serde_yaml::Error>) -> HearthError {
    let path = err.path().to_string();
    let message = err.into_inner().to_string();

    if let Some(field) = missing_field(&message) {
        let key = if path == "." {
            field.to_string()
        } else {
            format!("{path}.{field}")
        };
        return HearthError::MissingConfigKey { key };
    }

    let key = if path == "." { "<root>".to_string() } else { path };
    HearthError::InvalidConfig { key, message }
}

/// Field name out of serde's "missing field `name`" message.
fn missing_field(message: &str) -> Option<&str> {
    let rest = message.split("missing field `").nth(1)?;
    rest.split('`').next()
}
