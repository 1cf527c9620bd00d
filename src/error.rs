use thiserror::Error;

/// Failures raised while encoding or loading a batch.
///
/// `Config` is raised before any batch is processed, `Encode` signals a
/// broken internal invariant, `Protocol` covers every bulk-copy step.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("encoding invariant violated: {0}")]
    Encode(String),

    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("bulk copy failed during {step}: {message}")]
    Protocol { step: &'static str, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LoadError {
    pub fn config(msg: impl Into<String>) -> Self {
        LoadError::Config(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        LoadError::Encode(msg.into())
    }

    pub fn protocol(step: &'static str, err: impl std::fmt::Display) -> Self {
        LoadError::Protocol {
            step,
            message: err.to_string(),
        }
    }
}

pub type Result<T, E = LoadError> = std::result::Result<T, E>;
