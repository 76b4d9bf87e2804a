//! Feature encoding shared by training, evaluation, and inference.
//!
//! Numeric columns pass through (missing cells take the training mean). Every
//! other column is one-hot encoded over the levels seen at fit time; unseen or
//! missing levels encode as all zeros. The fitted encoder travels inside the
//! model artifact so every consumer reproduces the training layout exactly.

use std::collections::HashMap;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use hearth_types::{HearthError, Result};

use crate::table::{is_missing, parse_number, Table};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureColumn {
    Numeric { name: String, fill: f64 },
    Categorical { name: String, levels: Vec<String> },
}

impl FeatureColumn {
    pub fn name(&self) -> &str {
        match self {
            FeatureColumn::Numeric { name, .. } | FeatureColumn::Categorical { name, .. } => {
                name.as_str()
            }
        }
    }

    /// Number of encoded features this column expands to.
    pub fn width(&self) -> usize {
        match self {
            FeatureColumn::Numeric { .. } => 1,
            FeatureColumn::Categorical { levels, .. } => levels.len(),
        }
    }

    fn encode_into(&self, cell: Option<&str>, out: &mut Vec<f64>) {
        match self {
            FeatureColumn::Numeric { fill, .. } => {
                out.push(cell.and_then(parse_number).unwrap_or(*fill));
            }
            FeatureColumn::Categorical { levels, .. } => {
                let cell = cell.filter(|c| !is_missing(c)).map(str::trim);
                out.extend(levels.iter().map(|l| {
                    if Some(l.as_str()) == cell {
                        1.0
                    } else {
                        0.0
                    }
                }));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    target: String,
    columns: Vec<FeatureColumn>,
}

impl FeatureEncoder {
    /// Learn the column layout from a training table.
    ///
    /// A column is numeric when every non-missing cell parses as a finite float.
    pub fn fit(table: &Table, target: &str) -> Result<Self> {
        if !table.has_column(target) {
            return Err(HearthError::MissingTargetColumn {
                column: target.to_string(),
            });
        }

        let mut columns = Vec::new();
        for (i, name) in table.columns().iter().enumerate() {
            if name == target {
                continue;
            }
            let present: Vec<&str> = table.column_values(i).filter(|c| !is_missing(c)).collect();
            let numbers: Vec<f64> = present.iter().filter_map(|c| parse_number(c)).collect();

            if numbers.len() == present.len() {
                let fill = if numbers.is_empty() {
                    0.0
                } else {
                    numbers.iter().sum::<f64>() / numbers.len() as f64
                };
                columns.push(FeatureColumn::Numeric {
                    name: name.clone(),
                    fill,
                });
            } else {
                let mut levels: Vec<String> =
                    present.iter().map(|c| c.trim().to_string()).collect();
                levels.sort();
                levels.dedup();
                columns.push(FeatureColumn::Categorical {
                    name: name.clone(),
                    levels,
                });
            }
        }

        Ok(Self {
            target: target.to_string(),
            columns,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn n_features(&self) -> usize {
        self.columns.iter().map(FeatureColumn::width).sum()
    }

    /// Encoded feature names: numeric columns keep their name, categorical
    /// levels become `<column>_<level>`.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.n_features());
        for col in &self.columns {
            match col {
                FeatureColumn::Numeric { name, .. } => names.push(name.clone()),
                FeatureColumn::Categorical { name, levels } => {
                    names.extend(levels.iter().map(|l| format!("{name}_{l}")));
                }
            }
        }
        names
    }

    /// Encode every row of `table` into a dense feature matrix.
    ///
    /// The table may contain extra columns (including the target); every column
    /// seen at fit time must be present.
    pub fn transform(&self, table: &Table) -> Result<Array2<f64>> {
        let indices = self.column_indices(table)?;
        let n_features = self.n_features();
        let mut data = Vec::with_capacity(table.row_count() * n_features);
        for row in table.rows() {
            for (col, &idx) in self.columns.iter().zip(&indices) {
                col.encode_into(Some(row[idx].as_str()), &mut data);
            }
        }
        Array2::from_shape_vec((table.row_count(), n_features), data)
            .map_err(|e| HearthError::Other(format!("feature matrix shape error: {e}")))
    }

    /// Numeric target vector. Missing or non-numeric targets are an error.
    pub fn target_values(&self, table: &Table) -> Result<Array1<f64>> {
        let idx = table
            .column_index(&self.target)
            .ok_or_else(|| HearthError::MissingTargetColumn {
                column: self.target.clone(),
            })?;
        let mut values = Vec::with_capacity(table.row_count());
        for (row, cell) in table.column_values(idx).enumerate() {
            let v = parse_number(cell).ok_or_else(|| HearthError::MalformedTable {
                source_name: format!("column '{}'", self.target),
                message: format!("row {row} has non-numeric target value '{cell}'"),
            })?;
            values.push(v);
        }
        Ok(Array1::from(values))
    }

    /// Encode a single record keyed by column name. Absent keys are treated as
    /// missing cells.
    pub fn encode_record(&self, record: &HashMap<String, String>) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.n_features());
        for col in &self.columns {
            col.encode_into(record.get(col.name()).map(String::as_str), &mut out);
        }
        out
    }

    fn column_indices(&self, table: &Table) -> Result<Vec<usize>> {
        self.columns
            .iter()
            .map(|col| {
                table
                    .column_index(col.name())
                    .ok_or_else(|| HearthError::MalformedTable {
                        source_name: "feature table".into(),
                        message: format!("column '{}' seen during training is missing", col.name()),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn table(csv: &str) -> Table {
        Table::from_csv_bytes(csv.as_bytes(), "inline").unwrap()
    }

    const TRAIN: &str = "rooms,ocean,price\n2,INLAND,100\n,NEAR BAY,200\n4,INLAND,300\n";

    #[test]
    fn fit_detects_column_kinds() {
        let enc = FeatureEncoder::fit(&table(TRAIN), "price").unwrap();
        assert_eq!(enc.columns().len(), 2);
        match &enc.columns()[0] {
            FeatureColumn::Numeric { name, fill } => {
                assert_eq!(name, "rooms");
                assert_relative_eq!(*fill, 3.0);
            }
            other => panic!("expected numeric column, got {other:?}"),
        }
        match &enc.columns()[1] {
            FeatureColumn::Categorical { levels, .. } => {
                assert_eq!(levels, &vec!["INLAND".to_string(), "NEAR BAY".to_string()]);
            }
            other => panic!("expected categorical column, got {other:?}"),
        }
        assert_eq!(enc.n_features(), 3);
        assert_eq!(enc.feature_names(), vec!["rooms", "ocean_INLAND", "ocean_NEAR BAY"]);
    }

    #[test]
    fn fit_without_target_fails() {
        let err = FeatureEncoder::fit(&table(TRAIN), "value").unwrap_err();
        assert!(matches!(err, HearthError::MissingTargetColumn { .. }));
    }

    #[test]
    fn transform_imputes_and_one_hot_encodes() {
        let t = table(TRAIN);
        let enc = FeatureEncoder::fit(&t, "price").unwrap();
        let x = enc.transform(&t).unwrap();
        assert_eq!(x.dim(), (3, 3));
        assert_eq!(x.row(0).to_vec(), vec![2.0, 1.0, 0.0]);
        assert_eq!(x.row(1).to_vec(), vec![3.0, 0.0, 1.0]);
    }

    #[test]
    fn unseen_level_encodes_as_zeros() {
        let enc = FeatureEncoder::fit(&table(TRAIN), "price").unwrap();
        let x = enc.transform(&table("ocean,rooms,price\nISLAND,1,5\n")).unwrap();
        assert_eq!(x.row(0).to_vec(), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn transform_requires_training_columns() {
        let enc = FeatureEncoder::fit(&table(TRAIN), "price").unwrap();
        let err = enc.transform(&table("rooms,price\n1,2\n")).unwrap_err();
        assert!(err.to_string().contains("ocean"));
    }

    #[test]
    fn target_values_must_be_numeric() {
        let t = table("a,price\n1,10\n2,cheap\n");
        let enc = FeatureEncoder::fit(&t, "price").unwrap();
        assert!(enc.target_values(&t).is_err());
    }

    #[test]
    fn target_values_parse() {
        let t = table(TRAIN);
        let enc = FeatureEncoder::fit(&t, "price").unwrap();
        assert_eq!(enc.target_values(&t).unwrap().to_vec(), vec![100.0, 200.0, 300.0]);
    }

    #[test]
    fn encode_record_matches_transform() {
        let t = table(TRAIN);
        let enc = FeatureEncoder::fit(&t, "price").unwrap();
        let mut record = HashMap::new();
        record.insert("rooms".to_string(), "4".to_string());
        record.insert("ocean".to_string(), "INLAND".to_string());
        assert_eq!(enc.encode_record(&record), enc.transform(&t).unwrap().row(2).to_vec());
    }

    #[test]
    fn encode_record_fills_absent_keys() {
        let enc = FeatureEncoder::fit(&table(TRAIN), "price").unwrap();
        assert_eq!(enc.encode_record(&HashMap::new()), vec![3.0, 0.0, 0.0]);
    }
}
