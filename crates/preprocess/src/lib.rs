pub mod cpu;

use schema::{ConfigError, ImageTransform, InputBlob, RawFrame, ResizePolicy};

pub use cpu::CpuPreProcessor;

/// Result of preprocessing including transformation parameters
#[derive(Debug)]
pub struct PreprocessResult {
    /// Model-ready bytes for a single frame
    pub blob: InputBlob,
    /// Geometry used to place the frame inside the model input
    pub transform: ImageTransform,
}

/// Result of preprocessing several frames into one request
#[derive(Debug)]
pub struct BatchPreprocessResult {
    /// Per-frame payloads concatenated in frame order
    pub blob: InputBlob,
    /// One entry per frame, same order as the input slice
    pub transforms: Vec<ImageTransform>,
}

impl BatchPreprocessResult {
    pub fn batch_size(&self) -> usize {
        self.transforms.len()
    }
}

/// Trait for image preprocessing implementations
///
/// Implementations hold only read-only configuration, so a single instance
/// may be shared between threads and called on distinct frames concurrently.
pub trait Preprocess: Send + Sync {
    /// Preprocess one frame for inference
    ///
    /// # Arguments
    /// * `frame` - Interleaved 8-bit frame as produced by the video source
    ///
    /// # Returns
    /// Input bytes plus the geometry needed to map detections back
    fn preprocess(&self, frame: &RawFrame) -> Result<PreprocessResult, ConfigError>;

    /// Preprocess frames into a single batched input
    fn preprocess_batch(&self, frames: &[RawFrame]) -> Result<BatchPreprocessResult, ConfigError>;

    /// Get the input size this preprocessor targets
    fn input_size(&self) -> (u32, u32);

    /// Aspect-ratio handling applied when resizing
    fn resize_policy(&self) -> ResizePolicy;
}
