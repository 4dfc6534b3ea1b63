pub mod detection;
pub mod errors;
pub mod frame;
pub mod labels;
pub mod output;
pub mod tensor;
pub mod transform;

pub use detection::{BoundingBox, Detection};
pub use errors::ConfigError;
pub use frame::{FrameSize, PixelFormat, RawFrame};
pub use labels::LabelTable;
pub use output::RawOutputTensor;
pub use tensor::{DataType, InputBlob, ModelTensorSpec, TensorLayout};
pub use transform::{ImageTransform, ResizePolicy};
