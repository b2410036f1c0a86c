use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::KddOptions;
use crate::models::{AutoencoderConfig, ModelKind};

// ---------------------------------------------------------------------------
// Experiment configuration
// ---------------------------------------------------------------------------

/// Everything one train/evaluate run needs. Missing JSON keys fall back
/// to [`Default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Root of the partitioned dataset.
    pub data_path: PathBuf,
    /// File-name prefix inside each partition.
    pub dataset_type: String,
    pub train_partition: String,
    pub test_partition: String,
    /// Share of training inliers held out for validation monitoring.
    pub validation_fraction: f64,
    pub model: ModelKind,
    /// Components kept by the PCA model.
    pub pca_components: usize,
    pub autoencoder: AutoencoderConfig,
    /// Where weights, scaler and reports are written. Defaults to
    /// `models/savedmodels/<model>/` when unset.
    pub model_dir: Option<PathBuf>,
    /// Inlier-score percentile used as the anomaly threshold.
    pub threshold_percentile: f64,
    /// Seed for the validation split.
    pub seed: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/kdd"),
            dataset_type: "all".to_string(),
            train_partition: "train".to_string(),
            test_partition: "test".to_string(),
            validation_fraction: 0.2,
            model: ModelKind::Ae,
            pca_components: 2,
            autoencoder: AutoencoderConfig::default(),
            model_dir: None,
            threshold_percentile: 95.0,
            seed: 2018,
        }
    }
}

impl ExperimentConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).with_context(|| format!("writing config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.validation_fraction) {
            anyhow::bail!(
                "validation_fraction must be in [0, 1), got {}",
                self.validation_fraction
            );
        }
        if !(0.0..=100.0).contains(&self.threshold_percentile) {
            anyhow::bail!(
                "threshold_percentile must be in [0, 100], got {}",
                self.threshold_percentile
            );
        }
        Ok(())
    }

    /// Resolved model directory.
    pub fn model_dir(&self) -> PathBuf {
        self.model_dir.clone().unwrap_or_else(|| {
            PathBuf::from("models/savedmodels").join(self.model.as_str())
        })
    }

    pub fn train_options(&self) -> KddOptions {
        KddOptions {
            data_path: self.data_path.clone(),
            dataset_type: self.dataset_type.clone(),
            partition: self.train_partition.clone(),
        }
    }

    pub fn test_options(&self) -> KddOptions {
        KddOptions {
            data_path: self.data_path.clone(),
            dataset_type: self.dataset_type.clone(),
            partition: self.test_partition.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_dir() {
        let config = ExperimentConfig::default();
        assert_eq!(config.model_dir(), PathBuf::from("models/savedmodels/ae"));

        let pca = ExperimentConfig {
            model: ModelKind::Pca,
            ..ExperimentConfig::default()
        };
        assert_eq!(pca.model_dir(), PathBuf::from("models/savedmodels/pca"));
    }

    #[test]
    fn test_load_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp.json");
        fs::write(
            &path,
            r#"{"model": "pca", "pca_components": 4, "autoencoder": {"epochs": 2}}"#,
        )
        .unwrap();

        let config = ExperimentConfig::load(&path).unwrap();
        assert_eq!(config.model, ModelKind::Pca);
        assert_eq!(config.pca_components, 4);
        assert_eq!(config.autoencoder.epochs, 2);
        assert_eq!(config.autoencoder.latent_dim, 2);
        assert_eq!(config.train_partition, "train");
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp.json");
        let config = ExperimentConfig {
            validation_fraction: 0.1,
            ..ExperimentConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(ExperimentConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_rejects_bad_fraction() {
        let config = ExperimentConfig {
            validation_fraction: 1.0,
            ..ExperimentConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
