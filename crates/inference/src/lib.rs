//! Detection pipeline around an inference transport supplied by the caller.
//!
//! The crate ships no binary. An embedding program owns the transport and
//! wires the ambient pieces itself: [`InferenceConfig::from_env`],
//! [`logging::setup_logging`] and, when an endpoint is configured,
//! [`common::TelemetryGuard`].
//!
//! ```ignore
//! let config = InferenceConfig::from_env()?;
//! inference::logging::setup_logging(&config);
//! let _telemetry = config
//!     .otel_endpoint
//!     .as_deref()
//!     .map(|endpoint| common::TelemetryGuard::init("detection", endpoint))
//!     .transpose()?;
//!
//! let spec = Arc::new(config.load_model_spec()?);
//! let labels = load_labels(
//!     &FileLabelSource::new(&config.labels_path),
//!     config.postprocess.num_classes,
//! )?;
//!
//! let mut pipeline = DetectionPipeline::new(transport, &config, spec, labels)?;
//! pipeline.run(&mut source, &mut sink)?;
//! ```

pub mod backend;
pub mod config;
pub mod errors;
pub mod labels;
pub mod logging;
pub mod processing;
pub mod service;

// Re-export commonly used types for convenience
pub use backend::{InferRequest, InferenceOutput, InferenceTransport};
pub use config::{InferenceConfig, TransportFailurePolicy};
pub use errors::{PipelineError, TransportError};
pub use labels::{FileLabelSource, LabelSource};
pub use processing::post::{PostProcessor, PostprocessConfig};
pub use service::{DetectionPipeline, DetectionSink, FrameSource, RunStats};
