//! Autoencoder Network Architecture
//!
//! Symmetric dense autoencoder:
//! ```text
//! n -> h0 -> ... -> h(L-1) -> latent -> h(L-1) -> ... -> h0 -> n
//! ```
//! Hidden layers use ReLU, the latent layer is linear and the output layer
//! uses the configured [`OutputActivation`].

use burn::module::Module;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Activation applied to the decoder output layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    /// Squash into (0, 1), matches min-max scaled inputs
    #[default]
    Sigmoid,
    /// Identity
    Linear,
    Relu,
    Tanh,
}

impl OutputActivation {
    pub fn apply<B: Backend, const D: usize>(self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            OutputActivation::Sigmoid => sigmoid(x),
            OutputActivation::Linear => x,
            OutputActivation::Relu => relu(x),
            OutputActivation::Tanh => x.tanh(),
        }
    }
}

/// Glorot-uniform weights, the usual default for dense layers.
fn dense<B: Backend>(d_input: usize, d_output: usize, device: &B::Device) -> Linear<B> {
    LinearConfig::new(d_input, d_output)
        .with_initializer(Initializer::XavierUniform { gain: 1.0 })
        .init(device)
}

/// Dense encoder/decoder pair
#[derive(Module, Debug)]
pub struct Network<B: Backend> {
    encoder: Vec<Linear<B>>,
    latent: Linear<B>,
    decoder: Vec<Linear<B>>,
    output: Linear<B>,
}

impl<B: Backend> Network<B> {
    /// Build the network. `hidden_dims` lists the encoder widths; the
    /// decoder mirrors them in reverse.
    pub fn new(
        n_features: usize,
        hidden_dims: &[usize],
        latent_dim: usize,
        device: &B::Device,
    ) -> Self {
        let mut encoder = Vec::with_capacity(hidden_dims.len());
        let mut dim = n_features;
        for &h in hidden_dims {
            encoder.push(dense(dim, h, device));
            dim = h;
        }
        let latent = dense(dim, latent_dim, device);

        let mut decoder = Vec::with_capacity(hidden_dims.len());
        let mut dim = latent_dim;
        for &h in hidden_dims.iter().rev() {
            decoder.push(dense(dim, h, device));
            dim = h;
        }
        let output = dense(dim, n_features, device);

        Self {
            encoder,
            latent,
            decoder,
            output,
        }
    }

    /// Encode input to latent representation
    pub fn encode(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = x;
        for layer in &self.encoder {
            x = relu(layer.forward(x));
        }
        self.latent.forward(x)
    }

    /// Decode latent representation to reconstruction
    pub fn decode(&self, z: Tensor<B, 2>, activation: OutputActivation) -> Tensor<B, 2> {
        let mut x = z;
        for layer in &self.decoder {
            x = relu(layer.forward(x));
        }
        activation.apply(self.output.forward(x))
    }

    /// Forward pass: encode then decode
    pub fn forward(&self, x: Tensor<B, 2>, activation: OutputActivation) -> Tensor<B, 2> {
        let z = self.encode(x);
        self.decode(z, activation)
    }

    /// Layer widths from input to output, for logging.
    pub fn layer_dims(&self) -> Vec<usize> {
        let mut dims = Vec::with_capacity(self.encoder.len() * 2 + 3);
        if let Some(first) = self.encoder.first() {
            dims.push(first.weight.val().dims()[0]);
        }
        for layer in self
            .encoder
            .iter()
            .chain(std::iter::once(&self.latent))
            .chain(&self.decoder)
            .chain(std::iter::once(&self.output))
        {
            dims.push(layer.weight.val().dims()[1]);
        }
        dims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type B = NdArray<f32>;

    #[test]
    fn test_layer_dims_mirror() {
        let device = Default::default();
        let net = Network::<B>::new(10, &[6, 3], 2, &device);
        assert_eq!(net.layer_dims(), vec![10, 6, 3, 2, 3, 6, 10]);
    }

    #[test]
    fn test_forward_shape_and_sigmoid_range() {
        let device = Default::default();
        let net = Network::<B>::new(4, &[3], 2, &device);
        let x = Tensor::<B, 2>::from_data(TensorData::new(vec![0.5f32; 12], [3, 4]), &device);

        let latent = net.encode(x.clone());
        assert_eq!(latent.dims(), [3, 2]);

        let out = net.forward(x, OutputActivation::Sigmoid);
        assert_eq!(out.dims(), [3, 4]);
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| *v > 0.0 && *v < 1.0));
    }

    #[test]
    fn test_activation_serde_names() {
        let parsed: OutputActivation = serde_json::from_str("\"tanh\"").unwrap();
        assert_eq!(parsed, OutputActivation::Tanh);
        assert_eq!(
            serde_json::to_string(&OutputActivation::Sigmoid).unwrap(),
            "\"sigmoid\""
        );
    }
}
