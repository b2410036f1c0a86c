//! PCA reconstruction model
//!
//! Fits the top principal components of the inlier covariance and scores
//! rows by how much of them falls outside that subspace.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::{reconstruction_error, AnomalyModel};
use crate::error::ModelError;

/// File written inside the model directory.
pub const PCA_FILE: &str = "pca.json";

/// Fitted projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Projection {
    /// Column means of the training data
    mean: Array1<f64>,
    /// `k x n_features`, one unit-length component per row
    components: Array2<f64>,
    /// Variance captured by each component
    explained_variance: Array1<f64>,
    /// Share of total variance captured by each component
    explained_variance_ratio: Array1<f64>,
}

/// PCA anomaly model
#[derive(Debug, Clone)]
pub struct PcaModel {
    /// Requested number of components (capped at the feature count)
    num_components: usize,
    fitted: Option<Projection>,
}

impl Default for PcaModel {
    fn default() -> Self {
        Self::new(2)
    }
}

impl PcaModel {
    pub fn new(num_components: usize) -> Self {
        Self {
            num_components,
            fitted: None,
        }
    }

    fn projection(&self) -> Result<&Projection, ModelError> {
        self.fitted.as_ref().ok_or(ModelError::NotTrained)
    }

    fn check_rows(&self, rows: ArrayView2<'_, f64>) -> Result<&Projection, ModelError> {
        let p = self.projection()?;
        ModelError::check_columns(p.mean.len(), rows.ncols())?;
        Ok(p)
    }

    /// Project rows into component space (`n x k`).
    pub fn transform(&self, rows: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        let p = self.check_rows(rows)?;
        let centered = &rows - &p.mean;
        Ok(centered.dot(&p.components.t()))
    }

    /// Map component-space rows back to feature space.
    pub fn inverse_transform(&self, low_dim: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        let p = self.projection()?;
        ModelError::check_columns(p.components.nrows(), low_dim.ncols())?;
        Ok(low_dim.dot(&p.components) + &p.mean)
    }

    /// Sum of Euclidean distances from each row to every component vector.
    pub fn compute_anomaly_score_unsupervised(
        &self,
        rows: ArrayView2<'_, f64>,
    ) -> Result<Array1<f64>, ModelError> {
        let p = self.check_rows(rows)?;
        let scores = rows
            .axis_iter(Axis(0))
            .map(|row| {
                p.components
                    .axis_iter(Axis(0))
                    .map(|c| {
                        let diff = &row - &c;
                        diff.dot(&diff).sqrt()
                    })
                    .sum::<f64>()
            })
            .collect();
        Ok(scores)
    }

    pub fn components(&self) -> Option<&Array2<f64>> {
        self.fitted.as_ref().map(|p| &p.components)
    }

    pub fn explained_variance_ratio(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|p| &p.explained_variance_ratio)
    }

    pub fn explained_variance(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|p| &p.explained_variance)
    }
}

/// Eigendecomposition of the sample covariance, top `k` components first.
fn fit_projection(x: ArrayView2<'_, f64>, k: usize) -> Result<Projection, ModelError> {
    let (n, d) = x.dim();
    if n < 2 || d == 0 {
        return Err(ModelError::EmptyInput("PCA needs at least two rows"));
    }

    let mean = x
        .mean_axis(Axis(0))
        .ok_or(ModelError::EmptyInput("PCA mean"))?;
    let centered = &x - &mean;
    let cov = centered.t().dot(&centered) / (n as f64 - 1.0);

    let eig = SymmetricEigen::new(DMatrix::from_fn(d, d, |i, j| cov[[i, j]]));

    let mut order: Vec<usize> = (0..d).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));

    let total: f64 = eig.eigenvalues.iter().map(|v| v.max(0.0)).sum();

    let mut components = Array2::zeros((k, d));
    let mut explained_variance = Array1::zeros(k);
    for (row, &idx) in order.iter().take(k).enumerate() {
        let vector = eig.eigenvectors.column(idx);
        // deterministic sign: largest absolute loading is positive
        let pivot = vector
            .iter()
            .copied()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .unwrap_or(1.0);
        let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
        for (col, v) in vector.iter().enumerate() {
            components[[row, col]] = sign * v;
        }
        explained_variance[row] = eig.eigenvalues[idx].max(0.0);
    }

    let explained_variance_ratio = if total > 0.0 {
        &explained_variance / total
    } else {
        Array1::zeros(k)
    };

    Ok(Projection {
        mean,
        components,
        explained_variance,
        explained_variance_ratio,
    })
}

impl AnomalyModel for PcaModel {
    fn name(&self) -> &str {
        "pca"
    }

    fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    fn n_features(&self) -> Option<usize> {
        self.fitted.as_ref().map(|p| p.mean.len())
    }

    fn train(
        &mut self,
        train: ArrayView2<'_, f64>,
        _validation: ArrayView2<'_, f64>,
    ) -> Result<(), ModelError> {
        if self.num_components == 0 {
            return Err(ModelError::InvalidConfig(
                "PCA needs at least one component".to_string(),
            ));
        }
        let k = self.num_components.min(train.ncols());
        let projection = fit_projection(train, k)?;
        log::info!(
            "Explained variation per principal component: {:.4}",
            projection.explained_variance_ratio.sum()
        );
        self.fitted = Some(projection);
        Ok(())
    }

    fn compute_anomaly_score(&self, rows: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        let low_dim = self.transform(rows)?;
        let preds = self.inverse_transform(low_dim.view())?;
        reconstruction_error(rows, &preds)
    }

    fn save_model(&self, dir: &Path) -> Result<(), ModelError> {
        let p = self.projection()?;
        std::fs::create_dir_all(dir)?;
        let path = dir.join(PCA_FILE);
        log::info!(">> Saving PCA model to {}", path.display());
        serde_json::to_writer(BufWriter::new(File::create(path)?), p)?;
        Ok(())
    }

    fn load_model(&mut self, dir: &Path) -> Result<bool, ModelError> {
        if !dir.exists() {
            return Ok(false);
        }
        log::info!(">> Loading saved PCA model");
        let reader = BufReader::new(File::open(dir.join(PCA_FILE))?);
        let p: Projection = serde_json::from_reader(reader)?;
        self.num_components = p.components.nrows();
        self.fitted = Some(p);
        Ok(true)
    }
}
