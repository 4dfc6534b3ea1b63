pub mod decode;
pub mod nms;
pub mod post;

pub use decode::{BoxCoordinates, HeadLayout, TensorOrientation};
pub use nms::{NmsPolicy, non_max_suppression};
