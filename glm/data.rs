//! # Tabular Input and Output
//!
//! Reads tab-separated tables with a header row into `ndarray` structures and
//! writes prediction columns back out.
//!
//! - Schema: one optional target column, selected by name; every other column
//!   is a numeric feature, kept in file order.
//! - User-centric errors: failures are assumed to be input mistakes, and
//!   `DataError` reports the row and column involved.

use ndarray::{Array1, Array2, ArrayView1};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// A parsed table split into features and an optional target.
#[derive(Debug)]
pub struct Table {
    /// Feature column names in file order.
    pub feature_names: Vec<String>,
    /// Shape: [n_rows, feature_names.len()].
    pub features: Array2<f64>,
    pub target: Option<Array1<f64>>,
}

impl Table {
    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Malformed TSV input: {0}")]
    CsvError(#[from] csv::Error),
    #[error("The target column '{0}' was not found in the input file. Please check spelling and case.")]
    ColumnNotFound(String),
    #[error("The input file has no feature columns besides the target.")]
    NoFeatures,
    #[error("The input file contains no data rows.")]
    NoRows,
    #[error("Row {row} has {found} fields, but the header declares {expected}.")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("Row {row}, column '{column}': '{value}' is not a number.")]
    NotNumeric {
        row: usize,
        column: String,
        value: String,
    },
    #[error("Row {row}, column '{column}': non-finite values (NaN or Infinity) are not allowed.")]
    NonFinite { row: usize, column: String },
    #[error("Failed to assemble the feature matrix: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Loads a TSV file. With `target`, that column becomes [`Table::target`];
/// every remaining column is a feature.
pub fn load_table(path: &Path, target: Option<&str>) -> Result<Table, DataError> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let target_idx = match target {
        Some(name) => Some(
            header
                .iter()
                .position(|column| column == name)
                .ok_or_else(|| DataError::ColumnNotFound(name.to_string()))?,
        ),
        None => None,
    };
    let feature_idx: Vec<usize> = (0..header.len())
        .filter(|&idx| Some(idx) != target_idx)
        .collect();
    if feature_idx.is_empty() {
        return Err(DataError::NoFeatures);
    }

    let mut values = Vec::new();
    let mut targets = Vec::new();
    let mut n_rows = 0;
    for (offset, record) in reader.records().enumerate() {
        let record = record?;
        // 1-based, counting the header line.
        let row = offset + 2;
        if record.len() != header.len() {
            return Err(DataError::RaggedRow {
                row,
                found: record.len(),
                expected: header.len(),
            });
        }
        let parse = |idx: usize| -> Result<f64, DataError> {
            let field = &record[idx];
            let value: f64 = field.parse().map_err(|_| DataError::NotNumeric {
                row,
                column: header[idx].clone(),
                value: field.to_string(),
            })?;
            if !value.is_finite() {
                return Err(DataError::NonFinite {
                    row,
                    column: header[idx].clone(),
                });
            }
            Ok(value)
        };
        for &idx in &feature_idx {
            values.push(parse(idx)?);
        }
        if let Some(idx) = target_idx {
            targets.push(parse(idx)?);
        }
        n_rows += 1;
    }
    if n_rows == 0 {
        return Err(DataError::NoRows);
    }

    let n_features = feature_idx.len();
    let features = Array2::from_shape_vec((n_rows, n_features), values)?;
    log::debug!(
        "loaded {} rows x {} features from {}",
        n_rows,
        n_features,
        path.display()
    );
    Ok(Table {
        feature_names: feature_idx.iter().map(|&idx| header[idx].clone()).collect(),
        features,
        target: target_idx.map(|_| Array1::from(targets)),
    })
}

/// Writes a one-column TSV with header `prediction`.
pub fn write_predictions(path: &Path, predictions: ArrayView1<f64>) -> Result<(), DataError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)?;
    writer.write_record(["prediction"])?;
    for value in predictions.iter() {
        writer.write_record([value.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}
