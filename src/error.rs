use thiserror::Error;

/// Failures raised by scalers and anomaly models.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model has not been trained")]
    NotTrained,

    #[error("expected {expected} feature columns, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("cannot fit on empty input ({0})")]
    EmptyInput(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("tensor backend error: {0}")]
    Backend(String),

    #[error("model persistence failed: {0}")]
    Persist(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    /// Shorthand for a column-count check.
    pub fn check_columns(expected: usize, found: usize) -> Result<(), ModelError> {
        if expected == found {
            Ok(())
        } else {
            Err(ModelError::DimensionMismatch { expected, found })
        }
    }
}
