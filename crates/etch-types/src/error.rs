use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtchError {
    #[error("Insufficient thickness samples: found {found}, need at least {required}")]
    InsufficientSamples { found: usize, required: usize },

    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Beam profile contains no samples")]
    EmptyBeam,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Interpolation failed: {0}")]
    InterpolationFailed(String),

    #[error("Grid shape mismatch: expected {expected:?}, found {found:?}")]
    GridMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Numerical failure: {0}")]
    Numerical(String),

    #[error("Linear algebra error: {0}")]
    LinAlg(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtchError {
    /// True for failures caused by the supplied data rather than the numerics.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            EtchError::InsufficientSamples { .. }
                | EtchError::SchemaNotFound(_)
                | EtchError::EmptyBeam
        )
    }
}

pub type EtchResult<T> = Result<T, EtchError>;
