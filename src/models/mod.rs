//! Reconstruction-based anomaly models
//!
//! Both variants fit on inlier rows and score any row by how badly the
//! model reconstructs it. Higher score = more anomalous.

pub mod autoencoder;
pub mod pca;

pub use autoencoder::{AutoencoderConfig, AutoencoderModel, OutputActivation};
pub use pca::PcaModel;

use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Trait for reconstruction-error anomaly models
pub trait AnomalyModel {
    /// Short model name (`ae`, `pca`)
    fn name(&self) -> &str;

    /// Whether parameters have been fitted or loaded
    fn is_trained(&self) -> bool;

    /// Column count the model expects
    fn n_features(&self) -> Option<usize>;

    /// Fit on inlier rows. `validation` is only monitored, never used to
    /// choose parameters.
    fn train(
        &mut self,
        train: ArrayView2<'_, f64>,
        validation: ArrayView2<'_, f64>,
    ) -> Result<(), ModelError>;

    /// One non-negative score per row: mean squared reconstruction error.
    fn compute_anomaly_score(&self, rows: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError>;

    /// Persist learned parameters inside `dir`.
    fn save_model(&self, dir: &Path) -> Result<(), ModelError>;

    /// Restore parameters from `dir`. Returns `false` without touching the
    /// model when `dir` does not exist.
    fn load_model(&mut self, dir: &Path) -> Result<bool, ModelError>;
}

/// Which model an experiment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Dense autoencoder
    Ae,
    /// Principal component reconstruction
    Pca,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Ae => "ae",
            ModelKind::Pca => "pca",
        }
    }
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ae" | "autoencoder" => Ok(ModelKind::Ae),
            "pca" => Ok(ModelKind::Pca),
            other => Err(format!("unknown model kind '{other}' (expected ae or pca)")),
        }
    }
}

/// Row-wise mean squared error between inputs and their reconstruction.
pub fn reconstruction_error(
    original: ArrayView2<'_, f64>,
    reconstruction: &Array2<f64>,
) -> Result<Array1<f64>, ModelError> {
    if original.dim() != reconstruction.dim() {
        return Err(ModelError::DimensionMismatch {
            expected: original.ncols(),
            found: reconstruction.ncols(),
        });
    }
    if original.ncols() == 0 {
        return Ok(Array1::zeros(original.nrows()));
    }
    let diff = &original - reconstruction;
    let squared = diff.mapv(|d| d * d);
    Ok(squared
        .mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::zeros(original.nrows())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_reconstruction_error() {
        let x = array![[1.0, 2.0], [0.0, 0.0]];
        let r = array![[1.0, 0.0], [1.0, 1.0]];
        let err = reconstruction_error(x.view(), &r).unwrap();
        assert_eq!(err.to_vec(), vec![2.0, 1.0]);
    }

    #[test]
    fn test_reconstruction_error_shape_mismatch() {
        let x = array![[1.0, 2.0]];
        let r = array![[1.0]];
        assert!(reconstruction_error(x.view(), &r).is_err());
    }

    #[test]
    fn test_model_kind_parse() {
        assert_eq!("AE".parse::<ModelKind>().unwrap(), ModelKind::Ae);
        assert_eq!("pca".parse::<ModelKind>().unwrap(), ModelKind::Pca);
        assert!("svm".parse::<ModelKind>().is_err());
    }
}
