//! Reconstruction-error anomaly detection for network-intrusion data.
//!
//! Two interchangeable models fit on inlier rows and score any row by how
//! poorly they reconstruct it:
//!
//! * [`models::AutoencoderModel`]: dense autoencoder trained with burn,
//! * [`models::PcaModel`]: principal-component projection.
//!
//! [`data`] loads partitioned CSV/Parquet tables and min-max scales them,
//! [`eval`] turns scores into AUC and threshold metrics, and
//! [`experiment`] wires everything together for the `deepad` binary.

pub mod config;
pub mod data;
pub mod error;
pub mod eval;
pub mod experiment;
pub mod models;

pub use config::ExperimentConfig;
pub use error::ModelError;
pub use models::{AnomalyModel, AutoencoderModel, PcaModel};
