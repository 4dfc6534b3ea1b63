use crate::detection::BoundingBox;
use crate::frame::FrameSize;
use std::str::FromStr;

/// How a frame is fitted into the model's input rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizePolicy {
    /// Scale each axis independently to fill the input.
    #[default]
    Stretch,
    /// Uniform scale, centred, remainder padded.
    Letterbox,
}

impl FromStr for ResizePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stretch" => Ok(ResizePolicy::Stretch),
            "letterbox" => Ok(ResizePolicy::Letterbox),
            other => Err(format!("unknown resize policy `{other}`")),
        }
    }
}

/// Forward mapping from original frame pixels into model input pixels:
/// `input = original * scale + offset`, per axis.
///
/// Preprocessing builds this to place the resized image; postprocessing
/// rebuilds it from the same inputs and applies the inverse, so the two
/// stages can never disagree on geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageTransform {
    pub policy: ResizePolicy,
    pub original: FrameSize,
    pub input_width: u32,
    pub input_height: u32,
    /// Size of the resized image before padding.
    pub resized_width: u32,
    pub resized_height: u32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl ImageTransform {
    pub fn new(policy: ResizePolicy, original: FrameSize, input_size: (u32, u32)) -> Self {
        let (input_width, input_height) = input_size;
        let (orig_w, orig_h) = (original.width.max(1), original.height.max(1));

        match policy {
            ResizePolicy::Stretch => Self {
                policy,
                original,
                input_width,
                input_height,
                resized_width: input_width,
                resized_height: input_height,
                scale_x: input_width as f32 / orig_w as f32,
                scale_y: input_height as f32 / orig_h as f32,
                offset_x: 0.0,
                offset_y: 0.0,
            },
            ResizePolicy::Letterbox => {
                let scale =
                    (input_width as f32 / orig_w as f32).min(input_height as f32 / orig_h as f32);
                let new_width = ((orig_w as f32 * scale).round() as u32).clamp(1, input_width);
                let new_height = ((orig_h as f32 * scale).round() as u32).clamp(1, input_height);

                let offset_x = (input_width - new_width) / 2;
                let offset_y = (input_height - new_height) / 2;

                Self {
                    policy,
                    original,
                    input_width,
                    input_height,
                    resized_width: new_width,
                    resized_height: new_height,
                    scale_x: scale,
                    scale_y: scale,
                    offset_x: offset_x as f32,
                    offset_y: offset_y as f32,
                }
            }
        }
    }

    #[inline]
    pub fn to_input(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale_x + self.offset_x,
            y * self.scale_y + self.offset_y,
        )
    }

    #[inline]
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.offset_x) / self.scale_x,
            (y - self.offset_y) / self.scale_y,
        )
    }

    pub fn box_to_input(&self, bbox: &BoundingBox) -> BoundingBox {
        let (x1, y1) = self.to_input(bbox.x, bbox.y);
        let (x2, y2) = self.to_input(bbox.right(), bbox.bottom());
        BoundingBox::from_corners(x1, y1, x2, y2)
    }

    pub fn box_to_original(&self, bbox: &BoundingBox) -> BoundingBox {
        let (x1, y1) = self.to_original(bbox.x, bbox.y);
        let (x2, y2) = self.to_original(bbox.right(), bbox.bottom());
        BoundingBox::from_corners(x1, y1, x2, y2)
    }
}
