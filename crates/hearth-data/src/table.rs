//! In-memory CSV table.
//!
//! Cells are kept as the raw strings read from disk so that writing a table back
//! out is lossless and byte-stable. Typed views (numeric columns, category
//! levels) are derived on demand by the encoder and the drift statistics.

use std::path::Path;

use hearth_types::{HearthError, Result};

/// Tokens treated as a missing cell, in addition to the empty string.
pub const NA_TOKENS: &[&str] = &["NA", "N/A", "NaN", "nan", "null", "NULL"];

/// Returns `true` when `cell` holds no value.
pub fn is_missing(cell: &str) -> bool {
    let trimmed = cell.trim();
    trimmed.is_empty() || NA_TOKENS.contains(&trimmed)
}

/// Parse a non-missing cell as a float.
pub fn parse_number(cell: &str) -> Option<f64> {
    if is_missing(cell) {
        return None;
    }
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table, checking that every row matches the header width.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if columns.is_empty() {
            return Err(HearthError::MalformedTable {
                source_name: "<memory>".into(),
                message: "table has no columns".into(),
            });
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(HearthError::MalformedTable {
                source_name: "<memory>".into(),
                message: format!(
                    "row {} has {} fields, expected {}",
                    i,
                    row.len(),
                    columns.len()
                ),
            });
        }
        Ok(Self { columns, rows })
    }

    /// Parse CSV text with a header row.
    pub fn from_csv_bytes(bytes: &[u8], source_name: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(bytes);
        Self::from_reader(&mut reader, source_name)
    }

    /// Read a CSV file with a header row.
    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;
        Self::from_reader(&mut reader, &path.display().to_string())
    }

    fn from_reader<R: std::io::Read>(
        reader: &mut csv::Reader<R>,
        source_name: &str,
    ) -> Result<Self> {
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
            return Err(HearthError::MalformedTable {
                source_name: source_name.to_string(),
                message: "missing header row".into(),
            });
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { columns, rows })
    }

    /// Write the table as CSV, header first, rows in their current order.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// `(rows, columns)`, as logged by every stage.
    pub fn shape(&self) -> (usize, usize) {
        (self.row_count(), self.column_count())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Iterate the raw cells of one column.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(move |row| row[index].as_str())
    }

    /// A new table containing the rows at `indices`, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}
