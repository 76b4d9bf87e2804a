//! Fetch the source dataset and land it as `<raw_dir>/housing.csv`.

use std::path::{Path, PathBuf};

use hearth_data::Table;
use hearth_types::{DataConfig, HearthError, Result};

use crate::events::EventEmitter;
use crate::state::PipelineState;

pub const RAW_FILE_NAME: &str = "housing.csv";

pub struct DataIngestion {
    source: String,
    raw_dir: PathBuf,
    client: reqwest::Client,
    events: EventEmitter,
}

impl DataIngestion {
    pub fn new(config: &DataConfig, events: EventEmitter) -> Self {
        Self {
            source: config.url.clone(),
            raw_dir: config.raw_dir.clone(),
            client: reqwest::Client::new(),
            events,
        }
    }

    /// Read the whole source, check it parses as CSV, and write it out.
    pub async fn run(&self) -> Result<PathBuf> {
        tracing::info!(source = %self.source, "Reading source dataset");
        let bytes = self.read_source().await?;
        let table = Table::from_csv_bytes(&bytes, &self.source)?;
        if table.row_count() == 0 {
            self.events
                .warn(PipelineState::Ingesting, format!("source {} has no data rows", self.source));
        }

        tokio::fs::create_dir_all(&self.raw_dir).await?;
        let output = self.raw_dir.join(RAW_FILE_NAME);
        table.write_csv(&output)?;

        let (rows, columns) = table.shape();
        tracing::info!(path = %output.display(), rows, columns, "Raw data saved");
        Ok(output)
    }

    async fn read_source(&self) -> Result<Vec<u8>> {
        if self.source.starts_with("http://") || self.source.starts_with("https://") {
            return self.fetch_http().await;
        }
        let path = self.source.strip_prefix("file://").unwrap_or(&self.source);
        tokio::fs::read(Path::new(path)).await.map_err(|e| HearthError::FetchFailed {
            url: self.source.clone(),
            status: 0,
            message: e.to_string(),
        })
    }

    async fn fetch_http(&self) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(&self.source)
            .send()
            .await
            .map_err(|e| HearthError::FetchFailed {
                url: self.source.clone(),
                status: 0,
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HearthError::FetchFailed {
                url: self.source.clone(),
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| HearthError::FetchFailed {
            url: self.source.clone(),
            status: status.as_u16(),
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}
