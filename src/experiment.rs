//! Train / evaluate / score runs wired from an [`ExperimentConfig`].

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::ExperimentConfig;
use crate::data::loader::TARGET_COLUMN;
use crate::data::{load_kdd, load_table, MinMaxScaler};
use crate::eval::{self, EvaluationReport};
use crate::models::{AnomalyModel, AutoencoderModel, ModelKind, PcaModel};

/// Scaler file inside the model directory.
pub const SCALER_FILE: &str = "scaler.json";
/// Copy of the config used for training.
pub const EXPERIMENT_FILE: &str = "experiment.json";
/// Autoencoder loss curve.
pub const HISTORY_FILE: &str = "history.json";

/// What a training run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSummary {
    pub model: String,
    pub model_dir: PathBuf,
    pub n_features: usize,
    pub train_rows: usize,
    pub validation_rows: usize,
    /// Mean anomaly score of the held-out validation inliers
    pub mean_validation_score: Option<f64>,
}

/// Shuffle rows and hold out `fraction` of them.
pub fn split_validation(rows: &Array2<f64>, fraction: f64, seed: u64) -> (Array2<f64>, Array2<f64>) {
    let n = rows.nrows();
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));

    let n_val = ((n as f64) * fraction).round() as usize;
    let n_val = n_val.min(n.saturating_sub(1));
    let (val_idx, train_idx) = indices.split_at(n_val);
    (
        rows.select(Axis(0), train_idx),
        rows.select(Axis(0), val_idx),
    )
}

/// Fresh, untrained model for `n_features` columns.
pub fn build_model(config: &ExperimentConfig, n_features: usize) -> Result<Box<dyn AnomalyModel>> {
    let model: Box<dyn AnomalyModel> = match config.model {
        ModelKind::Ae => Box::new(AutoencoderModel::new(n_features, config.autoencoder.clone())?),
        ModelKind::Pca => Box::new(PcaModel::new(config.pca_components)),
    };
    Ok(model)
}

/// Fit scaler and model on the training partition and persist both.
pub fn train(config: &ExperimentConfig) -> Result<TrainSummary> {
    config.validate()?;
    let partition = load_kdd(&config.train_options(), None)?;
    let (train_rows, val_rows) =
        split_validation(&partition.inliers, config.validation_fraction, config.seed);
    let n_features = partition.columns.len();

    log::info!(
        "Training {} on {} rows ({} held out for validation)",
        config.model.as_str(),
        train_rows.nrows(),
        val_rows.nrows()
    );

    let dir = config.model_dir();
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let mean_validation_score = match config.model {
        ModelKind::Ae => {
            let mut model = AutoencoderModel::new(n_features, config.autoencoder.clone())?;
            model.train(train_rows.view(), val_rows.view())?;
            model.save_model(&dir)?;
            let history = serde_json::to_string_pretty(model.history())?;
            std::fs::write(dir.join(HISTORY_FILE), history)?;
            validation_mean(&model, &val_rows)?
        }
        ModelKind::Pca => {
            let mut model = PcaModel::new(config.pca_components);
            model.train(train_rows.view(), val_rows.view())?;
            model.save_model(&dir)?;
            validation_mean(&model, &val_rows)?
        }
    };

    partition.scaler.save(&dir.join(SCALER_FILE))?;
    config.save(&dir.join(EXPERIMENT_FILE))?;

    Ok(TrainSummary {
        model: config.model.as_str().to_string(),
        model_dir: dir,
        n_features,
        train_rows: train_rows.nrows(),
        validation_rows: val_rows.nrows(),
        mean_validation_score,
    })
}

fn validation_mean(model: &dyn AnomalyModel, rows: &Array2<f64>) -> Result<Option<f64>> {
    if rows.nrows() == 0 {
        return Ok(None);
    }
    let scores = model.compute_anomaly_score(rows.view())?;
    Ok(scores.mean())
}

/// `config` with the model settings recorded by [`train`] in `dir`.
///
/// Data paths, partitions and the threshold still come from `config`.
pub fn trained_config(config: &ExperimentConfig, dir: &Path) -> Result<ExperimentConfig> {
    let path = dir.join(EXPERIMENT_FILE);
    if !path.exists() {
        log::warn!("{} not found, using model settings as given", path.display());
        return Ok(config.clone());
    }
    let saved = ExperimentConfig::load(&path)
        .with_context(|| format!("loading training config {}", path.display()))?;
    if saved.model != config.model {
        log::warn!(
            "{} holds a {} model, ignoring requested {}",
            dir.display(),
            saved.model.as_str(),
            config.model.as_str()
        );
    }
    Ok(ExperimentConfig {
        model: saved.model,
        pca_components: saved.pca_components,
        autoencoder: saved.autoencoder,
        ..config.clone()
    })
}

/// Restore the scaler and model written by [`train`].
pub fn load_trained(config: &ExperimentConfig) -> Result<(Box<dyn AnomalyModel>, MinMaxScaler)> {
    let dir = config.model_dir();
    let scaler_path = dir.join(SCALER_FILE);
    let scaler = MinMaxScaler::load(&scaler_path)
        .with_context(|| format!("loading scaler {}", scaler_path.display()))?;

    let config = trained_config(config, &dir)?;
    let mut model = build_model(&config, scaler.n_features())?;
    if !model.load_model(&dir)? {
        bail!("no saved {} model under {}", model.name(), dir.display());
    }
    Ok((model, scaler))
}

/// Score the test partition's inliers and outliers and summarize.
pub fn evaluate(config: &ExperimentConfig) -> Result<EvaluationReport> {
    config.validate()?;
    let (model, scaler) = load_trained(config)?;
    let partition = load_kdd(&config.test_options(), Some(scaler))?;

    let inlier_scores = model.compute_anomaly_score(partition.inliers.view())?.to_vec();
    let outlier_scores = model.compute_anomaly_score(partition.outliers.view())?.to_vec();

    let report = eval::evaluate(
        model.name(),
        &inlier_scores,
        &outlier_scores,
        config.threshold_percentile,
    )?;
    log::info!(
        "{}: auc {:.4}, f1 {:.4} at threshold {:.6}",
        report.model,
        report.auc,
        report.f1,
        report.threshold
    );
    Ok(report)
}

/// Score every row of `input` and write `row,score[,target]` to `output`.
/// Returns the number of rows scored.
pub fn score_file(config: &ExperimentConfig, input: &Path, output: &Path) -> Result<usize> {
    let (model, scaler) = load_trained(config)?;
    let table = load_table(input, TARGET_COLUMN)
        .with_context(|| format!("loading {}", input.display()))?;
    let scaled = scaler.transform(table.features.view())?;
    let scores = model.compute_anomaly_score(scaled.view())?;

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("creating {}", output.display()))?;
    match &table.labels {
        Some(_) => writer.write_record(["row", "score", TARGET_COLUMN])?,
        None => writer.write_record(["row", "score"])?,
    }
    for (i, score) in scores.iter().enumerate() {
        let row = i.to_string();
        let score = score.to_string();
        match &table.labels {
            Some(labels) => writer.write_record([row.as_str(), score.as_str(), labels[i].as_str()])?,
            None => writer.write_record([row.as_str(), score.as_str()])?,
        }
    }
    writer.flush()?;
    Ok(scores.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::generate::{generate_dataset, GenerateOptions};
    use crate::models::autoencoder::TrainingHistory;
    use crate::models::{AutoencoderConfig, OutputActivation};

    fn small_dataset(root: &Path) {
        let opts = GenerateOptions {
            inliers_per_partition: 200,
            outliers_per_partition: 40,
            ..GenerateOptions::default()
        };
        generate_dataset(root, &opts).unwrap();
    }

    fn pca_config(root: &Path) -> ExperimentConfig {
        ExperimentConfig {
            data_path: root.join("data"),
            model: ModelKind::Pca,
            pca_components: 3,
            model_dir: Some(root.join("models")),
            ..ExperimentConfig::default()
        }
    }

    #[test]
    fn test_split_validation() {
        let rows = Array2::from_shape_fn((10, 2), |(i, j)| (i * 2 + j) as f64);
        let (train, val) = split_validation(&rows, 0.3, 1);
        assert_eq!(train.nrows(), 7);
        assert_eq!(val.nrows(), 3);

        let mut firsts: Vec<f64> = train
            .column(0)
            .iter()
            .chain(val.column(0).iter())
            .copied()
            .collect();
        firsts.sort_by(|a, b| a.total_cmp(b));
        let expected: Vec<f64> = (0..10).map(|i| (i * 2) as f64).collect();
        assert_eq!(firsts, expected);
    }

    #[test]
    fn test_split_keeps_a_training_row() {
        let rows = Array2::<f64>::zeros((1, 3));
        let (train, val) = split_validation(&rows, 0.9, 1);
        assert_eq!(train.nrows(), 1);
        assert_eq!(val.nrows(), 0);
    }

    #[test]
    fn test_pca_train_evaluate_score() {
        let root = tempfile::tempdir().unwrap();
        small_dataset(&root.path().join("data"));
        let config = pca_config(root.path());

        let summary = train(&config).unwrap();
        assert_eq!(summary.model, "pca");
        assert_eq!(summary.train_rows + summary.validation_rows, 200);
        assert!(root.path().join("models").join(SCALER_FILE).exists());

        let report = evaluate(&config).unwrap();
        assert_eq!(report.inliers, 200);
        assert_eq!(report.outliers, 40);
        assert!(report.auc > 0.8, "auc {}", report.auc);

        let out = root.path().join("scores.csv");
        let n = score_file(
            &config,
            &root.path().join("data/test/all_outliers.csv"),
            &out,
        )
        .unwrap();
        assert_eq!(n, 40);
        let text = std::fs::read_to_string(out).unwrap();
        assert!(text.starts_with("row,score,target"));
    }

    #[test]
    fn test_ae_pipeline_uses_trained_settings() {
        let root = tempfile::tempdir().unwrap();
        small_dataset(&root.path().join("data"));
        let trained = ExperimentConfig {
            data_path: root.path().join("data"),
            model: ModelKind::Ae,
            model_dir: Some(root.path().join("models")),
            autoencoder: AutoencoderConfig {
                hidden_layers: 1,
                hidden_dims: vec![6],
                output_activation: OutputActivation::Linear,
                epochs: 2,
                batch_size: 32,
                ..AutoencoderConfig::default()
            },
            ..ExperimentConfig::default()
        };

        let summary = train(&trained).unwrap();
        assert_eq!(summary.model, "ae");
        let models = root.path().join("models");
        assert!(models.join("model.mpk").exists());
        let history: TrainingHistory =
            serde_json::from_str(&std::fs::read_to_string(models.join(HISTORY_FILE)).unwrap())
                .unwrap();
        assert_eq!(history.epochs.len(), 2);

        // same directory, default model settings
        let plain = ExperimentConfig {
            data_path: root.path().join("data"),
            model_dir: Some(models.clone()),
            ..ExperimentConfig::default()
        };
        assert_eq!(
            trained_config(&plain, &models).unwrap().autoencoder,
            trained.autoencoder
        );

        let first = evaluate(&trained).unwrap();
        let second = evaluate(&plain).unwrap();
        assert_eq!(first.mean_inlier_score, second.mean_inlier_score);
        assert_eq!(first.auc, second.auc);

        let out = root.path().join("ae_scores.csv");
        let n = score_file(&plain, &root.path().join("data/test/all_inliers.csv"), &out).unwrap();
        assert_eq!(n, 200);
    }

    #[test]
    fn test_trained_config_without_record() {
        let root = tempfile::tempdir().unwrap();
        let config = pca_config(root.path());
        assert_eq!(trained_config(&config, root.path()).unwrap(), config);
    }

    #[test]
    fn test_evaluate_without_training_fails() {
        let root = tempfile::tempdir().unwrap();
        let config = pca_config(root.path());
        assert!(evaluate(&config).is_err());
    }
}
