use crate::processing::post::PostprocessConfig;
use anyhow::Context;
use common::config::env_or;
use schema::ModelTensorSpec;
use std::env;
use std::fs;
use std::str::FromStr;

pub use common::Environment;

/// What the frame loop does when the transport fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportFailurePolicy {
    /// Stop the loop and return the error
    #[default]
    Abort,
    /// Log, count the frames as failed and keep going
    SkipFrame,
}

impl FromStr for TransportFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(TransportFailurePolicy::Abort),
            "skip" | "skip-frame" | "skip_frame" => Ok(TransportFailurePolicy::SkipFrame),
            other => Err(format!("unknown transport failure policy `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub environment: Environment,
    /// JSON model description; the YOLOv7 preset when unset.
    pub model_spec_path: Option<String>,
    pub batch_size: usize,
    pub labels_path: String,
    pub postprocess: PostprocessConfig,
    pub transport_failure_policy: TransportFailurePolicy,
    /// OTLP/HTTP metrics endpoint; metrics stay local when unset.
    pub otel_endpoint: Option<String>,
}

impl InferenceConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();
        let defaults = PostprocessConfig::default();

        let model_spec_path = env::var("MODEL_SPEC_PATH").ok().filter(|p| !p.is_empty());
        let labels_path = env::var("LABELS_PATH").unwrap_or_else(|_| "coco.names".to_string());

        let postprocess = PostprocessConfig {
            num_classes: env_or("NUM_CLASSES", defaults.num_classes),
            confidence_threshold: env_or("CONFIDENCE_THRESHOLD", defaults.confidence_threshold),
            iou_threshold: env_or("IOU_THRESHOLD", defaults.iou_threshold),
            nms_policy: env_or("NMS_POLICY", defaults.nms_policy),
            head: env_or("HEAD_LAYOUT", defaults.head),
            orientation: env_or("TENSOR_ORIENTATION", defaults.orientation),
            coordinates: env_or("BOX_COORDINATES", defaults.coordinates),
            resize_policy: env_or("RESIZE_POLICY", defaults.resize_policy),
        };
        postprocess
            .validate()
            .context("Invalid postprocessing configuration")?;

        Ok(Self {
            environment,
            model_spec_path,
            batch_size: env_or("BATCH_SIZE", 1),
            labels_path,
            postprocess,
            transport_failure_policy: env_or(
                "TRANSPORT_FAILURE_POLICY",
                TransportFailurePolicy::default(),
            ),
            otel_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|e| !e.is_empty()),
        })
    }

    /// Read the model description, or fall back to the YOLOv7 preset, with
    /// the configured batch size applied.
    pub fn load_model_spec(&self) -> anyhow::Result<ModelTensorSpec> {
        let mut spec = match &self.model_spec_path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read model spec {path}"))?;
                serde_json::from_str::<ModelTensorSpec>(&raw)
                    .with_context(|| format!("Failed to parse model spec {path}"))?
            }
            None => ModelTensorSpec::yolov7(self.batch_size),
        };
        spec.batch_size = self.batch_size;

        spec.validate().context("Invalid model spec")?;

        tracing::info!(
            input = %spec.input_name,
            width = spec.input_width,
            height = spec.input_height,
            layout = ?spec.input_layout,
            datatype = %spec.input_datatype,
            batch_size = spec.batch_size,
            "Model spec loaded"
        );

        Ok(spec)
    }

    /// Create default configuration for testing
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            environment: Environment::Development,
            model_spec_path: None,
            batch_size: 1,
            labels_path: "coco.names".to_string(),
            postprocess: PostprocessConfig::default(),
            transport_failure_policy: TransportFailurePolicy::Abort,
            otel_endpoint: None,
        }
    }
}
