use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

// --- Public Data Structures ---
// The fitted model as written to and read from a human-readable TOML file.

/// Which closed-form estimator produced the coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Estimator {
    Ols,
    Ridge,
}

/// A fitted linear model artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub estimator: Estimator,
    /// Ridge shrinkage; absent for OLS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    pub fit_intercept: bool,
    pub normalize: bool,
    pub intercept: f64,
    /// Feature names in coefficient order.
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write model file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML model file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Model lists {names} feature names but {coefficients} coefficients.")]
    InconsistentModel { names: usize, coefficients: usize },
    #[error("Prediction data has {found} feature columns, but the model was trained on {expected}.")]
    MismatchedFeatureCount { found: usize, expected: usize },
    #[error("Feature column {index} is '{found}', but the model expects '{expected}'.")]
    MismatchedFeatureName {
        index: usize,
        found: String,
        expected: String,
    },
}

impl LinearModel {
    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    pub fn coef(&self) -> Array1<f64> {
        Array1::from(self.coefficients.clone())
    }

    /// Checks that prediction columns line up with the training features.
    pub fn check_features(&self, names: &[String]) -> Result<(), ModelError> {
        if names.len() != self.n_features() {
            return Err(ModelError::MismatchedFeatureCount {
                found: names.len(),
                expected: self.n_features(),
            });
        }
        for (index, (found, expected)) in names.iter().zip(&self.feature_names).enumerate() {
            if found != expected {
                return Err(ModelError::MismatchedFeatureName {
                    index,
                    found: found.clone(),
                    expected: expected.clone(),
                });
            }
        }
        Ok(())
    }

    /// Single-process evaluation of `x · coef + intercept`.
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        if x.ncols() != self.n_features() {
            return Err(ModelError::MismatchedFeatureCount {
                found: x.ncols(),
                expected: self.n_features(),
            });
        }
        let coef = ArrayView1::from(&self.coefficients);
        Ok(x.dot(&coef) + self.intercept)
    }

    /// Saves the model to a file in TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads a model from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let model: LinearModel = toml::from_str(&toml_string)?;
        if model.feature_names.len() != model.coefficients.len() {
            return Err(ModelError::InconsistentModel {
                names: model.feature_names.len(),
                coefficients: model.coefficients.len(),
            });
        }
        Ok(model)
    }
}
