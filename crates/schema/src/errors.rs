use thiserror::Error;

/// Structural mismatch between a frame, a model description or an output
/// tensor. Never retried: the same inputs fail the same way every time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Channel mismatch: frame has {frame} channel(s), model expects {model}")]
    ChannelMismatch { frame: usize, model: usize },

    #[error("Unsupported datatype: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid model spec: {0}")]
    InvalidModelSpec(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Output tensor `{0}` missing from inference result")]
    MissingOutput(String),

    #[error("Output shape mismatch for `{name}`: {reason}")]
    ShapeMismatch { name: String, reason: String },

    #[error("Label table has {actual} entries, model expects {expected} classes")]
    LabelCountMismatch { expected: usize, actual: usize },

    #[error("Batch size mismatch: expected at most {expected}, got {actual}")]
    BatchSizeMismatch { expected: usize, actual: usize },

    #[error("Empty batch")]
    EmptyBatch,

    #[error("Invalid setting `{name}`: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}
