//! Seeded train/test split of the raw dataset.

use std::path::{Path, PathBuf};

use hearth_data::{train_test_split, Table, SPLIT_SEED};
use hearth_types::{DataConfig, Result};

use crate::events::EventEmitter;
use crate::state::PipelineState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPaths {
    pub train: PathBuf,
    pub test: PathBuf,
}

pub struct DataTransformation {
    processed_dir: PathBuf,
    test_size: f64,
    events: EventEmitter,
}

impl DataTransformation {
    pub fn new(config: &DataConfig, events: EventEmitter) -> Self {
        Self {
            processed_dir: config.processed_dir.clone(),
            test_size: config.test_size,
            events,
        }
    }

    /// Split `raw_path` and write `train.csv` / `test.csv`.
    ///
    /// `test_size` is taken as given; configuration loading owns the range check.
    pub async fn run(&self, raw_path: &Path) -> Result<SplitPaths> {
        let table = Table::read_csv(raw_path)?;
        let (train, test) = train_test_split(&table, self.test_size, SPLIT_SEED);
        if train.row_count() == 0 || test.row_count() == 0 {
            self.events.warn(
                PipelineState::Transforming,
                format!(
                    "split produced an empty partition (train={}, test={})",
                    train.row_count(),
                    test.row_count()
                ),
            );
        }

        tokio::fs::create_dir_all(&self.processed_dir).await?;
        let paths = SplitPaths {
            train: self.processed_dir.join("train.csv"),
            test: self.processed_dir.join("test.csv"),
        };
        train.write_csv(&paths.train)?;
        test.write_csv(&paths.test)?;

        tracing::info!(
            train_rows = train.row_count(),
            test_rows = test.row_count(),
            seed = SPLIT_SEED,
            "Train/test split written"
        );
        Ok(paths)
    }
}
