use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::model::FeatureTable;
use crate::error::ModelError;

// ---------------------------------------------------------------------------
// MinMaxScaler – per-column affine map onto a feature range
// ---------------------------------------------------------------------------

/// Per-column min-max scaler.
///
/// Fitted once on training inliers and then reused, never refit, on
/// validation, outlier and scoring data. Values outside the fitted
/// min/max land outside the feature range; nothing is clipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    feature_range: (f64, f64),
    data_min: Array1<f64>,
    data_max: Array1<f64>,
    /// `(hi - lo) / (max - min)`, or 1 for constant columns.
    scale: Array1<f64>,
}

impl MinMaxScaler {
    /// Fit onto the default `[0, 1]` range.
    pub fn fit(x: ArrayView2<'_, f64>) -> Result<Self, ModelError> {
        Self::fit_with_range(x, (0.0, 1.0))
    }

    /// Fit onto an explicit `(lo, hi)` range.
    pub fn fit_with_range(
        x: ArrayView2<'_, f64>,
        feature_range: (f64, f64),
    ) -> Result<Self, ModelError> {
        let (lo, hi) = feature_range;
        if !(lo < hi) {
            return Err(ModelError::InvalidConfig(format!(
                "feature range ({lo}, {hi}) is empty"
            )));
        }
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(ModelError::EmptyInput("scaler fit"));
        }

        let data_min = x.fold_axis(Axis(0), f64::INFINITY, |acc, &v| acc.min(v));
        let data_max = x.fold_axis(Axis(0), f64::NEG_INFINITY, |acc, &v| acc.max(v));
        let scale = ndarray::Zip::from(&data_min)
            .and(&data_max)
            .map_collect(|&min, &max| {
                let range = max - min;
                if range > 0.0 {
                    (hi - lo) / range
                } else {
                    1.0
                }
            });

        log::debug!("Fitted min-max scaler on {} x {} rows", x.nrows(), x.ncols());

        Ok(MinMaxScaler {
            feature_range,
            data_min,
            data_max,
            scale,
        })
    }

    /// Map rows into the feature range.
    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        ModelError::check_columns(self.n_features(), x.ncols())?;
        let scaled = (&x - &self.data_min) * &self.scale;
        Ok(scaled + self.feature_range.0)
    }

    /// Fit on `x` and return the scaled copy.
    pub fn fit_transform(x: ArrayView2<'_, f64>) -> Result<(Self, Array2<f64>), ModelError> {
        let scaler = Self::fit(x)?;
        let scaled = scaler.transform(x)?;
        Ok((scaler, scaled))
    }

    /// Undo [`transform`](Self::transform).
    pub fn inverse_transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        ModelError::check_columns(self.n_features(), x.ncols())?;
        let unshifted = &x - self.feature_range.0;
        Ok(unshifted / &self.scale + &self.data_min)
    }

    /// Number of columns the scaler was fitted on.
    pub fn n_features(&self) -> usize {
        self.data_min.len()
    }

    pub fn data_min(&self) -> &Array1<f64> {
        &self.data_min
    }

    pub fn data_max(&self) -> &Array1<f64> {
        &self.data_max
    }

    pub fn feature_range(&self) -> (f64, f64) {
        self.feature_range
    }

    /// Write the fitted parameters as JSON.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Read parameters written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

// ---------------------------------------------------------------------------
// Table helper
// ---------------------------------------------------------------------------

/// Scale a loaded table.
///
/// With no scaler a new one is fitted on `table`; otherwise the given
/// scaler is applied unchanged. Returns the scaled matrix, the scaler that
/// produced it and the feature column names.
pub fn scale_data(
    table: &FeatureTable,
    scaler: Option<MinMaxScaler>,
) -> Result<(Array2<f64>, MinMaxScaler, Vec<String>), ModelError> {
    let (scaler, scaled) = match scaler {
        Some(scaler) => {
            let scaled = scaler.transform(table.features.view())?;
            (scaler, scaled)
        }
        None => MinMaxScaler::fit_transform(table.features.view())?,
    };
    Ok((scaled, scaler, table.columns.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_transform_unit_range() {
        let x = array![[0.0, 10.0], [5.0, 20.0], [10.0, 30.0]];
        let (scaler, scaled) = MinMaxScaler::fit_transform(x.view()).unwrap();

        assert_eq!(scaler.n_features(), 2);
        assert!((scaled[[0, 0]] - 0.0).abs() < 1e-12);
        assert!((scaled[[1, 0]] - 0.5).abs() < 1e-12);
        assert!((scaled[[2, 1]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_column() {
        let x = array![[3.0, 1.0], [3.0, 2.0]];
        let (_, scaled) = MinMaxScaler::fit_transform(x.view()).unwrap();
        assert_eq!(scaled[[0, 0]], 0.0);
        assert_eq!(scaled[[1, 0]], 0.0);
    }

    #[test]
    fn test_no_clipping_on_unseen_data() {
        let train = array![[0.0], [10.0]];
        let scaler = MinMaxScaler::fit(train.view()).unwrap();
        let scaled = scaler.transform(array![[20.0], [-10.0]].view()).unwrap();
        assert!((scaled[[0, 0]] - 2.0).abs() < 1e-12);
        assert!((scaled[[1, 0]] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_inverse_transform_recovers_input() {
        let x = array![[1.5, -2.0, 7.0], [3.25, 4.0, 7.0], [0.0, 100.0, 7.0]];
        let scaler = MinMaxScaler::fit_with_range(x.view(), (-1.0, 1.0)).unwrap();
        let back = scaler
            .inverse_transform(scaler.transform(x.view()).unwrap().view())
            .unwrap();
        for (a, b) in x.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-9, "{a} != {b}");
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let scaler = MinMaxScaler::fit(array![[0.0, 1.0], [1.0, 2.0]].view()).unwrap();
        let err = scaler.transform(array![[0.0]].view()).unwrap_err();
        assert!(matches!(
            err,
            ModelError::DimensionMismatch {
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn test_empty_input() {
        let x = Array2::<f64>::zeros((0, 3));
        assert!(matches!(
            MinMaxScaler::fit(x.view()),
            Err(ModelError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_scale_data_reuses_scaler() {
        let train = FeatureTable::from_rows(
            vec!["a".into()],
            vec![vec![0.0], vec![4.0]],
            None,
        )
        .unwrap();
        let other = FeatureTable::from_rows(vec!["a".into()], vec![vec![2.0]], None).unwrap();

        let (_, scaler, cols) = scale_data(&train, None).unwrap();
        assert_eq!(cols, vec!["a".to_string()]);

        let (scaled, reused, _) = scale_data(&other, Some(scaler.clone())).unwrap();
        assert_eq!(reused, scaler);
        assert!((scaled[[0, 0]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");
        let scaler = MinMaxScaler::fit(array![[1.0, 2.0], [3.0, 5.0]].view()).unwrap();
        scaler.save(&path).unwrap();
        assert_eq!(MinMaxScaler::load(&path).unwrap(), scaler);
    }
}
