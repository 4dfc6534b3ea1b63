use crate::errors::ConfigError;
use crate::frame::PixelFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Element type of the model input, named the way inference servers
/// report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "UINT8")]
    Uint8,
    #[serde(rename = "FP32")]
    Fp32,
}

impl DataType {
    pub fn element_size(self) -> usize {
        match self {
            DataType::Uint8 => 1,
            DataType::Fp32 => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Uint8 => "UINT8",
            DataType::Fp32 => "FP32",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UINT8" | "TYPE_UINT8" => Ok(DataType::Uint8),
            "FP32" | "TYPE_FP32" => Ok(DataType::Fp32),
            other => Err(ConfigError::UnsupportedDataType(other.to_string())),
        }
    }
}

/// Memory layout of the model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TensorLayout {
    /// Planar, channel first.
    #[serde(rename = "NCHW", alias = "FORMAT_NCHW")]
    Nchw,
    /// Interleaved, channel last.
    #[serde(rename = "NHWC", alias = "FORMAT_NHWC")]
    Nhwc,
}

/// Everything the pre/post stages and the transport need to know about the
/// model's input and outputs. Built once and shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTensorSpec {
    pub input_name: String,
    pub output_names: Vec<String>,
    pub input_layout: TensorLayout,
    pub input_datatype: DataType,
    pub pixel_format: PixelFormat,
    pub input_channels: usize,
    pub input_width: u32,
    pub input_height: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Zero when the model has no batch dimension.
    #[serde(default)]
    pub max_batch_size: usize,
}

fn default_batch_size() -> usize {
    1
}

impl ModelTensorSpec {
    /// YOLOv7 exported to ONNX and served with batching enabled.
    pub fn yolov7(batch_size: usize) -> Self {
        Self {
            input_name: "images".to_string(),
            output_names: vec!["output".to_string()],
            input_layout: TensorLayout::Nchw,
            input_datatype: DataType::Fp32,
            pixel_format: PixelFormat::Rgb,
            input_channels: 3,
            input_width: 640,
            input_height: 640,
            batch_size,
            max_batch_size: 32,
        }
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }

    pub fn element_size(&self) -> usize {
        self.input_datatype.element_size()
    }

    /// Byte length of one frame's worth of input.
    pub fn frame_blob_len(&self) -> usize {
        self.input_channels
            * self.input_width as usize
            * self.input_height as usize
            * self.element_size()
    }

    /// Whether the model's tensors carry a leading batch dimension.
    pub fn has_batch_dimension(&self) -> bool {
        self.max_batch_size > 0
    }

    /// Input shape for a request carrying `batch` frames. Models without a
    /// batch dimension get the per-frame shape only.
    pub fn input_shape(&self, batch: usize) -> Vec<i64> {
        let (c, h, w) = (
            self.input_channels as i64,
            self.input_height as i64,
            self.input_width as i64,
        );
        let frame = match self.input_layout {
            TensorLayout::Nchw => [c, h, w],
            TensorLayout::Nhwc => [h, w, c],
        };
        if self.has_batch_dimension() {
            std::iter::once(batch as i64).chain(frame).collect()
        } else {
            frame.to_vec()
        }
    }

    /// Name of the output tensor the detector head is decoded from.
    pub fn primary_output(&self) -> Option<&str> {
        self.output_names.first().map(String::as_str)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| Err(ConfigError::InvalidModelSpec(reason));

        if self.input_name.is_empty() {
            return invalid("input name is empty".to_string());
        }
        if self.output_names.is_empty() {
            return invalid("no output names".to_string());
        }
        if self.input_width == 0 || self.input_height == 0 {
            return invalid(format!(
                "input size {}x{} has zero extent",
                self.input_width, self.input_height
            ));
        }
        if self.input_channels != self.pixel_format.channels() {
            return invalid(format!(
                "{} channel(s) declared but pixel format {:?} has {}",
                self.input_channels,
                self.pixel_format,
                self.pixel_format.channels()
            ));
        }
        if self.batch_size == 0 {
            return invalid("batch size is zero".to_string());
        }
        let limit = if self.has_batch_dimension() {
            self.max_batch_size
        } else {
            1
        };
        if self.batch_size > limit {
            return Err(ConfigError::BatchSizeMismatch {
                expected: limit,
                actual: self.batch_size,
            });
        }

        Ok(())
    }
}

/// Bytes handed to the inference transport, already in the model's layout
/// and element type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputBlob {
    bytes: Vec<u8>,
}

impl InputBlob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Drops the contents but keeps the allocation for the next frame.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for InputBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}
