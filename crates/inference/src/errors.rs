use schema::ConfigError;
use thiserror::Error;

/// Failure reported by the inference transport. Passed through untouched;
/// the core never retries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Unable to reach inference server: {0}")]
    Connection(String),

    #[error("Inference request failed: {0}")]
    Request(String),

    #[error("Malformed inference response: {0}")]
    Response(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl PipelineError {
    pub fn is_transport(&self) -> bool {
        matches!(self, PipelineError::Transport(_))
    }
}
