//! Autoencoder Training
//!
//! Mini-batch Adam on mean squared reconstruction error. Validation rows
//! are scored once per epoch and recorded, nothing else.

use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::network::{Network, OutputActivation};
use super::{AutoencoderConfig, TrainBackend};
use crate::error::ModelError;

/// One finished epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    /// Mean training loss over the epoch's batches
    pub loss: f64,
    /// Loss on the validation rows after the epoch, if any were given
    pub val_loss: Option<f64>,
    /// Wall-clock seconds spent on the epoch
    pub seconds: f64,
}

/// Loss curve of a training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.epochs.last().map(|e| e.loss)
    }

    pub fn final_val_loss(&self) -> Option<f64> {
        self.epochs.last().and_then(|e| e.val_loss)
    }

    pub fn total_seconds(&self) -> f64 {
        self.epochs.iter().map(|e| e.seconds).sum()
    }
}

// ---------------------------------------------------------------------------
// Host <-> tensor conversion
// ---------------------------------------------------------------------------

/// Gather the given rows into a `[indices.len(), n_features]` tensor.
pub(crate) fn rows_tensor<B: Backend>(
    rows: ArrayView2<'_, f64>,
    indices: &[usize],
    device: &B::Device,
) -> Tensor<B, 2> {
    let mut values = Vec::with_capacity(indices.len() * rows.ncols());
    for &i in indices {
        values.extend(rows.row(i).iter().map(|&v| v as f32));
    }
    Tensor::from_data(TensorData::new(values, [indices.len(), rows.ncols()]), device)
}

pub(crate) fn tensor_to_array<B: Backend>(tensor: Tensor<B, 2>) -> Result<Array2<f64>, ModelError> {
    let [n, d] = tensor.dims();
    let values = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| ModelError::Backend(format!("{e:?}")))?;
    Array2::from_shape_vec((n, d), values.into_iter().map(f64::from).collect())
        .map_err(|e| ModelError::Backend(e.to_string()))
}

fn mse<B: Backend>(pred: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
    let diff = pred - target;
    (diff.clone() * diff).mean()
}

/// Mean loss over `rows`, evaluated in batches without gradients.
pub(crate) fn evaluate_loss<B: Backend>(
    network: &Network<B>,
    rows: ArrayView2<'_, f64>,
    activation: OutputActivation,
    batch_size: usize,
    device: &B::Device,
) -> Option<f64> {
    let n = rows.nrows();
    if n == 0 {
        return None;
    }
    let indices: Vec<usize> = (0..n).collect();
    let mut total = 0.0;
    for chunk in indices.chunks(batch_size) {
        let batch = rows_tensor::<B>(rows, chunk, device);
        let recon = network.forward(batch.clone(), activation);
        let loss: f64 = mse(recon, batch).into_scalar().elem();
        total += loss * chunk.len() as f64;
    }
    Some(total / n as f64)
}

// ---------------------------------------------------------------------------
// Training loop
// ---------------------------------------------------------------------------

/// Train `network` on `train` rows, monitoring `validation`.
pub(crate) fn fit(
    mut network: Network<TrainBackend>,
    train: ArrayView2<'_, f64>,
    validation: ArrayView2<'_, f64>,
    config: &AutoencoderConfig,
    device: &<TrainBackend as Backend>::Device,
) -> (Network<TrainBackend>, TrainingHistory) {
    let mut optim = AdamConfig::new().init();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut order: Vec<usize> = (0..train.nrows()).collect();
    let mut history = TrainingHistory::default();

    for epoch in 1..=config.epochs {
        let started = Instant::now();
        order.shuffle(&mut rng);

        let mut loss_sum = 0.0;
        for chunk in order.chunks(config.batch_size) {
            let batch = rows_tensor::<TrainBackend>(train, chunk, device);
            let recon = network.forward(batch.clone(), config.output_activation);
            let loss = mse(recon, batch);

            let loss_value: f64 = loss.clone().into_scalar().elem();
            loss_sum += loss_value * chunk.len() as f64;

            let grads = GradientsParams::from_grads(loss.backward(), &network);
            network = optim.step(config.learning_rate, network, grads);
        }

        let loss = loss_sum / train.nrows().max(1) as f64;
        let val_loss = evaluate_loss(
            &network.valid(),
            validation,
            config.output_activation,
            config.batch_size,
            device,
        );
        let seconds = started.elapsed().as_secs_f64();

        match val_loss {
            Some(v) => log::info!(
                "Epoch {epoch}/{} - {seconds:.2}s - loss: {loss:.6} - val_loss: {v:.6}",
                config.epochs
            ),
            None => log::info!(
                "Epoch {epoch}/{} - {seconds:.2}s - loss: {loss:.6}",
                config.epochs
            ),
        }

        history.epochs.push(EpochRecord {
            epoch,
            loss,
            val_loss,
            seconds,
        });
    }

    (network, history)
}
