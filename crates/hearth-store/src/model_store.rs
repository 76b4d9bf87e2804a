//! The production model store: one object at a fixed bucket/key.
//!
//! Reads return the object together with a version token. Writes take a
//! [`WritePrecondition`] so a promotion only lands if the champion it was
//! compared against is still the one in the store.
//!
//! Three backends, chosen by `s3.endpoint`:
//!
//! - unset: Amazon S3 through `object_store`, signed with the usual `AWS_*`
//!   environment credentials ([`ObjectModelStore::s3`])
//! - `http(s)://...`: plain GET/PUT against an S3-compatible gateway
//!   ([`HttpModelStore`])
//! - `file://<dir>`: a local directory ([`LocalModelStore`])

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use object_store::aws::{AmazonS3Builder, S3ConditionalPut};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload, UpdateVersion};
use reqwest::header::{AUTHORIZATION, ETAG, IF_MATCH, IF_NONE_MATCH};
use reqwest::StatusCode;
use tokio::sync::Mutex;

use hearth_types::{HearthError, Result, StoreConfig};

/// Environment variable holding an optional bearer token for the HTTP store.
pub const STORE_TOKEN_ENV: &str = "HEARTH_STORE_TOKEN";

/// A model object read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredModel {
    pub bytes: Vec<u8>,
    /// Opaque version token (ETag or content fingerprint). `None` when the
    /// backend reported none.
    pub version: Option<String>,
}

/// Condition a write must satisfy against the object currently stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritePrecondition {
    /// Overwrite unconditionally.
    Any,
    /// The object must not exist yet.
    Absent,
    /// The stored object must still carry this version token.
    Version(String),
}

// ---------------------------------------------------------------------------
// ModelStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Fetch the current production model, `Ok(None)` if the key does not exist.
    async fn fetch(&self) -> Result<Option<StoredModel>>;

    /// Write `bytes` to the key if `precondition` holds. Returns the new version.
    async fn put(&self, bytes: Vec<u8>, precondition: &WritePrecondition) -> Result<Option<String>>;

    /// `s3://bucket/key` style location for logs and errors.
    fn location(&self) -> String;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// Build the store selected by `s3.endpoint`.
pub fn store_from_config(config: &StoreConfig) -> Result<Arc<dyn ModelStore>> {
    match config.endpoint.as_deref() {
        None => Ok(Arc::new(ObjectModelStore::s3(config)?)),
        Some(endpoint) if endpoint.starts_with("file://") => {
            let root = PathBuf::from(endpoint.trim_start_matches("file://"));
            Ok(Arc::new(LocalModelStore::new(
                root,
                &config.bucket,
                &config.model_key,
            )))
        }
        Some(endpoint) if endpoint.starts_with("http://") || endpoint.starts_with("https://") => {
            let url = format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                config.bucket,
                config.model_key
            );
            Ok(Arc::new(
                HttpModelStore::new(url, config.location()).with_env_token(),
            ))
        }
        Some(other) => Err(HearthError::InvalidConfig {
            key: "s3.endpoint".into(),
            message: format!("unsupported endpoint '{other}' (expected file:// or http(s)://)"),
        }),
    }
}

/// Version token for stores without native versioning.
pub fn content_fingerprint(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:x}-{:016x}", bytes.len(), hasher.finish())
}

// ---------------------------------------------------------------------------
// LocalModelStore
// ---------------------------------------------------------------------------

/// Store rooted in a local directory: the object lives at `<root>/<bucket>/<key>`.
pub struct LocalModelStore {
    path: PathBuf,
    location: String,
    write_lock: Mutex<()>,
}

impl LocalModelStore {
    pub fn new(root: impl Into<PathBuf>, bucket: &str, key: &str) -> Self {
        let path = root.into().join(bucket).join(key);
        Self {
            path,
            location: format!("s3://{bucket}/{key}"),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_current(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.error("read", e.to_string())),
        }
    }

    fn error(&self, operation: &str, message: String) -> HearthError {
        HearthError::StoreError {
            operation: operation.into(),
            location: self.location.clone(),
            message,
        }
    }
}

#[async_trait]
impl ModelStore for LocalModelStore {
    async fn fetch(&self) -> Result<Option<StoredModel>> {
        Ok(self.read_current().await?.map(|bytes| StoredModel {
            version: Some(content_fingerprint(&bytes)),
            bytes,
        }))
    }

    async fn put(
        &self,
        bytes: Vec<u8>,
        precondition: &WritePrecondition,
    ) -> Result<Option<String>> {
        let _guard = self.write_lock.lock().await;

        let current = self.read_current().await?;
        let current_version = current.as_deref().map(content_fingerprint);
        let violation = match (precondition, &current_version) {
            (WritePrecondition::Any, _) => None,
            (WritePrecondition::Absent, Some(found)) => {
                Some(format!("expected no object, found version {found}"))
            }
            (WritePrecondition::Absent, None) => None,
            (WritePrecondition::Version(expected), Some(found)) if expected == found => None,
            (WritePrecondition::Version(expected), found) => Some(format!(
                "expected version {expected}, found {}",
                found.as_deref().unwrap_or("no object")
            )),
        };
        if let Some(message) = violation {
            return Err(HearthError::StorePreconditionFailed {
                location: self.location.clone(),
                message,
            });
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error("put", e.to_string()))?;
        }
        let staging = self.path.with_extension("partial");
        tokio::fs::write(&staging, &bytes)
            .await
            .map_err(|e| self.error("put", e.to_string()))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| self.error("put", e.to_string()))?;

        tracing::debug!(
            path = %self.path.display(),
            bytes = bytes.len(),
            "Wrote local model object"
        );
        Ok(Some(content_fingerprint(&bytes)))
    }

    fn location(&self) -> String {
        self.location.clone()
    }

    fn name(&self) -> &str {
        "file"
    }
}

// ---------------------------------------------------------------------------
// ObjectModelStore
// ---------------------------------------------------------------------------

/// Store backed by an [`ObjectStore`], Amazon S3 in production.
///
/// Version tokens are ETags; conditional writes map onto `PutMode::Create` and
/// `PutMode::Update`.
pub struct ObjectModelStore {
    store: Arc<dyn ObjectStore>,
    key: ObjectPath,
    location: String,
}

impl ObjectModelStore {
    pub fn new(store: Arc<dyn ObjectStore>, key: &str, location: String) -> Result<Self> {
        let key = ObjectPath::parse(key).map_err(|e| HearthError::InvalidConfig {
            key: "s3.model_key".into(),
            message: e.to_string(),
        })?;
        Ok(Self {
            store,
            key,
            location,
        })
    }

    /// S3 client for `config.bucket`, with region and credentials taken from
    /// the `AWS_*` environment variables (or the instance profile).
    pub fn s3(config: &StoreConfig) -> Result<Self> {
        let s3 = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_conditional_put(S3ConditionalPut::ETagMatch)
            .build()
            .map_err(|e| HearthError::InvalidConfig {
                key: "s3.bucket".into(),
                message: e.to_string(),
            })?;
        Self::new(Arc::new(s3), &config.model_key, config.location())
    }

    pub fn key(&self) -> &str {
        self.key.as_ref()
    }

    fn error(&self, operation: &str, e: object_store::Error) -> HearthError {
        HearthError::StoreError {
            operation: operation.into(),
            location: self.location.clone(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl ModelStore for ObjectModelStore {
    async fn fetch(&self) -> Result<Option<StoredModel>> {
        let result = match self.store.get(&self.key).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(self.error("fetch", e)),
        };
        let version = result.meta.e_tag.clone();
        let bytes = result
            .bytes()
            .await
            .map_err(|e| self.error("fetch", e))?
            .to_vec();
        tracing::debug!(
            location = %self.location,
            bytes = bytes.len(),
            version = ?version,
            "Fetched model object"
        );
        Ok(Some(StoredModel { bytes, version }))
    }

    async fn put(
        &self,
        bytes: Vec<u8>,
        precondition: &WritePrecondition,
    ) -> Result<Option<String>> {
        let mode = match precondition {
            WritePrecondition::Any => PutMode::Overwrite,
            WritePrecondition::Absent => PutMode::Create,
            WritePrecondition::Version(etag) => PutMode::Update(UpdateVersion {
                e_tag: Some(etag.clone()),
                version: None,
            }),
        };
        let options = PutOptions {
            mode,
            ..PutOptions::default()
        };

        match self
            .store
            .put_opts(&self.key, PutPayload::from(bytes), options)
            .await
        {
            Ok(result) => Ok(result.e_tag),
            Err(
                e @ (object_store::Error::Precondition { .. }
                | object_store::Error::AlreadyExists { .. }),
            ) => Err(HearthError::StorePreconditionFailed {
                location: self.location.clone(),
                message: e.to_string(),
            }),
            Err(e) => Err(self.error("put", e)),
        }
    }

    fn location(&self) -> String {
        self.location.clone()
    }

    fn name(&self) -> &str {
        "s3"
    }
}

// ---------------------------------------------------------------------------
// HttpModelStore
// ---------------------------------------------------------------------------

/// Object store reached over plain HTTP GET/PUT with ETag preconditions.
///
/// Requests are not SigV4-signed; an optional bearer token is sent when
/// configured. Used only for an explicit `http(s)://` endpoint.
#[derive(Debug)]
pub struct HttpModelStore {
    client: reqwest::Client,
    url: String,
    location: String,
    token: Option<String>,
}

impl HttpModelStore {
    pub fn new(url: String, location: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            location,
            token: None,
        }
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_env_token(self) -> Self {
        match std::env::var(STORE_TOKEN_ENV) {
            Ok(token) if !token.is_empty() => self.with_token(token),
            _ => self,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    fn transport_error(&self, operation: &str, e: reqwest::Error) -> HearthError {
        HearthError::StoreError {
            operation: operation.into(),
            location: self.location.clone(),
            message: e.to_string(),
        }
    }
}

fn etag_of(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Map a non-success response status to a store error.
fn map_status(operation: &str, location: &str, status: StatusCode, body: &str) -> HearthError {
    match status {
        StatusCode::PRECONDITION_FAILED => HearthError::StorePreconditionFailed {
            location: location.to_string(),
            message: "object version changed (HTTP 412)".into(),
        },
        _ => HearthError::StoreError {
            operation: operation.into(),
            location: location.to_string(),
            message: format!("HTTP {}: {}", status.as_u16(), body.trim()),
        },
    }
}

#[async_trait]
impl ModelStore for HttpModelStore {
    async fn fetch(&self) -> Result<Option<StoredModel>> {
        let resp = self
            .authorize(self.client.get(&self.url))
            .send()
            .await
            .map_err(|e| self.transport_error("fetch", e))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let version = etag_of(resp.headers());
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(map_status("fetch", &self.location, status, &body));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| self.transport_error("fetch", e))?
            .to_vec();
        tracing::debug!(
            url = %self.url,
            bytes = bytes.len(),
            version = ?version,
            "Fetched model object"
        );
        Ok(Some(StoredModel { bytes, version }))
    }

    async fn put(
        &self,
        bytes: Vec<u8>,
        precondition: &WritePrecondition,
    ) -> Result<Option<String>> {
        let mut request = self
            .authorize(self.client.put(&self.url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream");
        request = match precondition {
            WritePrecondition::Any => request,
            WritePrecondition::Absent => request.header(IF_NONE_MATCH, "*"),
            WritePrecondition::Version(etag) => request.header(IF_MATCH, etag.as_str()),
        };

        let resp = request
            .body(bytes)
            .send()
            .await
            .map_err(|e| self.transport_error("put", e))?;

        let status = resp.status();
        let version = etag_of(resp.headers());
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(map_status("put", &self.location, status, &body));
        }
        Ok(version)
    }

    fn location(&self) -> String {
        self.location.clone()
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
