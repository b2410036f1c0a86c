//! Autoencoder-based Anomaly Detection
//!
//! Uses reconstruction error to detect anomalies. Normal samples should
//! have low reconstruction error while anomalies should have high error.
//!
//! # Architecture
//! ```text
//! Input (n) -> 15 -> 7 -> 2 (latent) -> 7 -> 15 -> Output (n)
//! ```
//!
//! # Usage
//! ```ignore
//! use deepad::models::{AnomalyModel, AutoencoderConfig, AutoencoderModel};
//!
//! let mut model = AutoencoderModel::new(n_features, AutoencoderConfig::default())?;
//!
//! // Train on normal traffic
//! model.train(inliers.view(), validation.view())?;
//!
//! // Score anything
//! let scores = model.compute_anomaly_score(rows.view())?;
//! ```

pub mod network;
pub mod trainer;

pub use network::{Network, OutputActivation};
pub use trainer::{EpochRecord, TrainingHistory};

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use burn::backend::{Autodiff, NdArray};
use burn::module::{AutodiffModule, Module};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::{reconstruction_error, AnomalyModel};
use crate::error::ModelError;

/// Backend used for training (autodiff over the ndarray CPU backend).
pub type TrainBackend = Autodiff<NdArray<f32>>;

/// Backend used for inference.
pub type InferBackend = NdArray<f32>;

/// Default location for saved weights.
pub const DEFAULT_MODEL_DIR: &str = "models/savedmodels/ae/";

/// Weights file stem inside the model directory (the recorder appends `.mpk`).
pub const WEIGHTS_FILE: &str = "model";

/// Network shape written next to the weights.
pub const LAYOUT_FILE: &str = "layout.json";

/// Shape of a saved network. Weights only load into a network built from
/// the same layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkLayout {
    pub n_features: usize,
    pub hidden_dims: Vec<usize>,
    pub latent_dim: usize,
    pub output_activation: OutputActivation,
}

impl NetworkLayout {
    fn validate(&self) -> Result<(), ModelError> {
        if self.hidden_dims.is_empty() || self.hidden_dims.contains(&0) || self.latent_dim == 0 {
            return Err(ModelError::Persist(format!(
                "saved layout has unusable widths {:?} / latent {}",
                self.hidden_dims, self.latent_dim
            )));
        }
        Ok(())
    }
}

/// Autoencoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoencoderConfig {
    /// Number of hidden layers in the encoder (mirrored in the decoder)
    pub hidden_layers: usize,
    /// Latent space dimension
    pub latent_dim: usize,
    /// Encoder hidden layer widths; empty = halve from the input width
    pub hidden_dims: Vec<usize>,
    /// Activation of the last decoder layer
    pub output_activation: OutputActivation,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Number of training epochs
    pub epochs: usize,
    /// Batch size for training
    pub batch_size: usize,
    /// Seed for weight init and batch shuffling
    pub seed: u64,
}

impl Default for AutoencoderConfig {
    fn default() -> Self {
        Self {
            hidden_layers: 2,
            latent_dim: 2,
            hidden_dims: vec![15, 7],
            output_activation: OutputActivation::Sigmoid,
            learning_rate: 0.01,
            epochs: 15,
            batch_size: 128,
            seed: 2018,
        }
    }
}

impl AutoencoderConfig {
    /// Encoder widths for an input of `n_features` columns.
    ///
    /// With no explicit widths each layer halves the previous one, never
    /// going below 2. Explicit widths are truncated to `hidden_layers`.
    pub fn resolve_hidden_dims(&self, n_features: usize) -> Result<Vec<usize>, ModelError> {
        if self.hidden_layers == 0 {
            return Err(ModelError::InvalidConfig(
                "hidden_layers must be at least 1".to_string(),
            ));
        }
        if self.hidden_dims.is_empty() {
            let mut dims = Vec::with_capacity(self.hidden_layers);
            let mut dim = n_features as f64;
            for _ in 0..self.hidden_layers {
                dims.push((dim / 2.0).max(2.0) as usize);
                dim /= 2.0;
            }
            return Ok(dims);
        }
        if self.hidden_dims.len() < self.hidden_layers {
            return Err(ModelError::InvalidConfig(format!(
                "hidden_dims has {} entries but hidden_layers is {}",
                self.hidden_dims.len(),
                self.hidden_layers
            )));
        }
        let dims = self.hidden_dims[..self.hidden_layers].to_vec();
        if dims.contains(&0) {
            return Err(ModelError::InvalidConfig(
                "hidden layer widths must be positive".to_string(),
            ));
        }
        Ok(dims)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.latent_dim == 0 {
            return Err(ModelError::InvalidConfig("latent_dim must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(ModelError::InvalidConfig("batch_size must be positive".into()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(ModelError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// Autoencoder anomaly model
#[derive(Debug)]
pub struct AutoencoderModel {
    config: AutoencoderConfig,
    n_features: usize,
    hidden_dims: Vec<usize>,
    network: Network<TrainBackend>,
    device: <TrainBackend as Backend>::Device,
    trained: bool,
    history: TrainingHistory,
}

impl AutoencoderModel {
    /// Build an untrained model for `n_features` input columns.
    pub fn new(n_features: usize, config: AutoencoderConfig) -> Result<Self, ModelError> {
        if n_features == 0 {
            return Err(ModelError::InvalidConfig("n_features must be positive".into()));
        }
        config.validate()?;
        let hidden_dims = config.resolve_hidden_dims(n_features)?;

        let device: <TrainBackend as Backend>::Device = Default::default();
        TrainBackend::seed(config.seed);
        let network = Network::<TrainBackend>::new(n_features, &hidden_dims, config.latent_dim, &device);
        log::info!("Built autoencoder with layer widths {:?}", network.layer_dims());

        Ok(Self {
            config,
            n_features,
            hidden_dims,
            network,
            device,
            trained: false,
            history: TrainingHistory::default(),
        })
    }

    pub fn config(&self) -> &AutoencoderConfig {
        &self.config
    }

    /// Resolved encoder widths
    pub fn hidden_dims(&self) -> &[usize] {
        &self.hidden_dims
    }

    /// Loss curve of the last `train` call
    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    pub fn layout(&self) -> NetworkLayout {
        NetworkLayout {
            n_features: self.n_features,
            hidden_dims: self.hidden_dims.clone(),
            latent_dim: self.config.latent_dim,
            output_activation: self.config.output_activation,
        }
    }

    /// Rebuild the (untrained) network so it matches `layout`.
    fn adopt_layout(&mut self, layout: NetworkLayout) -> Result<(), ModelError> {
        ModelError::check_columns(self.n_features, layout.n_features)?;
        layout.validate()?;
        if layout == self.layout() {
            return Ok(());
        }
        log::info!(
            "Saved network differs from config, rebuilding with widths {:?} and latent {}",
            layout.hidden_dims,
            layout.latent_dim
        );
        self.config.hidden_layers = layout.hidden_dims.len();
        self.config.hidden_dims = layout.hidden_dims.clone();
        self.config.latent_dim = layout.latent_dim;
        self.config.output_activation = layout.output_activation;
        self.network =
            Network::<TrainBackend>::new(self.n_features, &layout.hidden_dims, layout.latent_dim, &self.device);
        self.hidden_dims = layout.hidden_dims;
        Ok(())
    }

    fn check_rows(&self, rows: ArrayView2<'_, f64>) -> Result<(), ModelError> {
        if !self.trained {
            return Err(ModelError::NotTrained);
        }
        ModelError::check_columns(self.n_features, rows.ncols())
    }

    /// Run `f` over `rows` in batches on the inference backend and stack
    /// the results.
    fn map_batches<F>(
        &self,
        rows: ArrayView2<'_, f64>,
        width: usize,
        f: F,
    ) -> Result<Array2<f64>, ModelError>
    where
        F: Fn(&Network<InferBackend>, Tensor<InferBackend, 2>) -> Tensor<InferBackend, 2>,
    {
        let network = self.network.valid();
        let indices: Vec<usize> = (0..rows.nrows()).collect();
        let mut parts = Vec::new();
        for chunk in indices.chunks(self.config.batch_size) {
            let batch = trainer::rows_tensor::<InferBackend>(rows, chunk, &self.device);
            parts.push(trainer::tensor_to_array(f(&network, batch))?);
        }
        if parts.is_empty() {
            return Ok(Array2::zeros((0, width)));
        }
        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        concatenate(Axis(0), &views).map_err(|e| ModelError::Backend(e.to_string()))
    }

    /// Network output for each row.
    pub fn reconstruct(&self, rows: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        self.check_rows(rows)?;
        let activation = self.config.output_activation;
        self.map_batches(rows, self.n_features, |net, x| net.forward(x, activation))
    }

    /// Latent code for each row (`n x latent_dim`).
    pub fn encode(&self, rows: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        self.check_rows(rows)?;
        self.map_batches(rows, self.config.latent_dim, |net, x| net.encode(x))
    }
}

impl AnomalyModel for AutoencoderModel {
    fn name(&self) -> &str {
        "ae"
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.n_features)
    }

    fn train(
        &mut self,
        train: ArrayView2<'_, f64>,
        validation: ArrayView2<'_, f64>,
    ) -> Result<(), ModelError> {
        ModelError::check_columns(self.n_features, train.ncols())?;
        if validation.nrows() > 0 {
            ModelError::check_columns(self.n_features, validation.ncols())?;
        }
        if train.nrows() == 0 {
            return Err(ModelError::EmptyInput("autoencoder training rows"));
        }
        log::info!("Training with data of shape {:?}", train.dim());

        let (network, history) = trainer::fit(
            self.network.clone(),
            train,
            validation,
            &self.config,
            &self.device,
        );
        self.network = network;
        self.history = history;
        self.trained = true;
        Ok(())
    }

    fn compute_anomaly_score(&self, rows: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        let preds = self.reconstruct(rows)?;
        reconstruction_error(rows, &preds)
    }

    fn save_model(&self, dir: &Path) -> Result<(), ModelError> {
        std::fs::create_dir_all(dir)?;
        log::info!(">> Saving AE model to {}", dir.display());
        serde_json::to_writer_pretty(
            BufWriter::new(File::create(dir.join(LAYOUT_FILE))?),
            &self.layout(),
        )?;
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.network
            .clone()
            .save_file(dir.join(WEIGHTS_FILE), &recorder)
            .map_err(|e| ModelError::Persist(format!("{e:?}")))
    }

    fn load_model(&mut self, dir: &Path) -> Result<bool, ModelError> {
        if !dir.exists() {
            return Ok(false);
        }
        let layout_path = dir.join(LAYOUT_FILE);
        if !layout_path.exists() {
            return Err(ModelError::Persist(format!(
                "{} is missing",
                layout_path.display()
            )));
        }
        let layout: NetworkLayout =
            serde_json::from_reader(BufReader::new(File::open(&layout_path)?))?;
        self.adopt_layout(layout)?;

        log::info!(">> Loading saved model weights");
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.network = self
            .network
            .clone()
            .load_file(dir.join(WEIGHTS_FILE), &recorder, &self.device)
            .map_err(|e| ModelError::Persist(format!("{e:?}")))?;
        self.trained = true;
        Ok(true)
    }
}
