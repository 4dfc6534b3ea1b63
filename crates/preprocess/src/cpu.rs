use crate::{BatchPreprocessResult, Preprocess, PreprocessResult};
use common::{span, span_debug};
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use schema::{
    ConfigError, DataType, ImageTransform, InputBlob, ModelTensorSpec, PixelFormat, RawFrame,
    ResizePolicy, TensorLayout,
};
use std::borrow::Cow;
use std::sync::Arc;

const LETTERBOX_COLOR: u8 = 114;
// BT.601 luma, fixed point over 1000
const LUMA_WEIGHTS: [u32; 3] = [299, 587, 114];

/// Resizes, reorders and packs frames on the CPU according to a
/// [`ModelTensorSpec`].
#[derive(Debug, Clone)]
pub struct CpuPreProcessor {
    spec: Arc<ModelTensorSpec>,
    policy: ResizePolicy,
}

impl CpuPreProcessor {
    pub fn new(spec: Arc<ModelTensorSpec>, policy: ResizePolicy) -> Result<Self, ConfigError> {
        spec.validate()?;
        Ok(Self { spec, policy })
    }

    pub fn spec(&self) -> &ModelTensorSpec {
        &self.spec
    }

    pub fn preprocess_frame(&self, frame: &RawFrame) -> Result<PreprocessResult, ConfigError> {
        let _s = span!("preprocess_frame");

        let mut blob = InputBlob::with_capacity(self.spec.frame_blob_len());
        let transform = self.preprocess_into(frame, &mut blob)?;

        Ok(PreprocessResult { blob, transform })
    }

    /// Appends one frame's payload to `blob` and returns the geometry used.
    /// On error nothing is appended.
    pub fn preprocess_into(
        &self,
        frame: &RawFrame,
        blob: &mut InputBlob,
    ) -> Result<ImageTransform, ConfigError> {
        tracing::trace!(
            width = frame.width,
            height = frame.height,
            format = ?frame.format,
            pixel_bytes = frame.pixels.len(),
            "Preprocessing frame dimensions"
        );

        frame.validate()?;

        let pixels = self.convert_channels(frame)?;
        let transform = ImageTransform::new(self.policy, frame.size(), self.spec.input_size());
        let image = self.resize_and_letterbox(&pixels, frame.width, frame.height, &transform)?;

        self.pack(image.buffer(), blob);

        Ok(transform)
    }

    pub fn preprocess_frames(
        &self,
        frames: &[RawFrame],
    ) -> Result<BatchPreprocessResult, ConfigError> {
        let _s = span!("preprocess_batch");

        if frames.is_empty() {
            return Err(ConfigError::EmptyBatch);
        }
        if frames.len() > self.spec.batch_size {
            return Err(ConfigError::BatchSizeMismatch {
                expected: self.spec.batch_size,
                actual: frames.len(),
            });
        }

        let mut blob = InputBlob::with_capacity(self.spec.frame_blob_len() * frames.len());
        let transforms = frames
            .iter()
            .map(|frame| self.preprocess_into(frame, &mut blob))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BatchPreprocessResult { blob, transforms })
    }

    /// Reorders or reduces channels to the model's pixel format.
    fn convert_channels<'a>(&self, frame: &'a RawFrame) -> Result<Cow<'a, [u8]>, ConfigError> {
        let _s = span_debug!("convert_channels");

        let target = self.spec.pixel_format;
        match (frame.format, target) {
            (source, target) if source == target => Ok(Cow::Borrowed(&frame.pixels)),
            (PixelFormat::Rgb, PixelFormat::Bgr) | (PixelFormat::Bgr, PixelFormat::Rgb) => {
                let mut swapped = Vec::with_capacity(frame.pixels.len());
                for px in frame.pixels.chunks_exact(3) {
                    swapped.extend_from_slice(&[px[2], px[1], px[0]]);
                }
                Ok(Cow::Owned(swapped))
            }
            (source @ (PixelFormat::Rgb | PixelFormat::Bgr), PixelFormat::Gray) => {
                let (r, b) = if source == PixelFormat::Rgb {
                    (0, 2)
                } else {
                    (2, 0)
                };
                let luma = frame
                    .pixels
                    .chunks_exact(3)
                    .map(|px| {
                        let y = px[r] as u32 * LUMA_WEIGHTS[0]
                            + px[1] as u32 * LUMA_WEIGHTS[1]
                            + px[b] as u32 * LUMA_WEIGHTS[2];
                        ((y + 500) / 1000) as u8
                    })
                    .collect();
                Ok(Cow::Owned(luma))
            }
            (source, target) => Err(ConfigError::ChannelMismatch {
                frame: source.channels(),
                model: target.channels(),
            }),
        }
    }

    /// Returns an interleaved image of exactly the model input size.
    fn resize_and_letterbox(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        transform: &ImageTransform,
    ) -> Result<Image<'static>, ConfigError> {
        let _s = span!("resize_and_letterbox");

        let channels = self.spec.input_channels;
        let pixel_type = match channels {
            1 => PixelType::U8,
            _ => PixelType::U8x3,
        };

        let src = ImageRef::new(width, height, pixels, pixel_type)
            .map_err(|e| ConfigError::InvalidImage(e.to_string()))?;

        let (new_width, new_height) = (transform.resized_width, transform.resized_height);
        let mut resized = Image::new(new_width, new_height, pixel_type);

        Resizer::new()
            .resize(
                &src,
                &mut resized,
                &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
            )
            .map_err(|e| ConfigError::InvalidImage(e.to_string()))?;

        let (input_width, input_height) = self.spec.input_size();
        if (new_width, new_height) == (input_width, input_height) {
            return Ok(resized);
        }

        let mut letterboxed =
            vec![LETTERBOX_COLOR; input_width as usize * input_height as usize * channels];

        let resized_data = resized.buffer();
        let row_len = new_width as usize * channels;
        let stride = input_width as usize * channels;
        let (offset_x, offset_y) = (transform.offset_x as usize, transform.offset_y as usize);

        for y in 0..new_height as usize {
            let src_row = y * row_len;
            let dst_row = (y + offset_y) * stride + offset_x * channels;

            letterboxed[dst_row..dst_row + row_len]
                .copy_from_slice(&resized_data[src_row..src_row + row_len]);
        }

        Image::from_vec_u8(input_width, input_height, letterboxed, pixel_type)
            .map_err(|e| ConfigError::InvalidImage(e.to_string()))
    }

    /// Writes the interleaved image into `blob` in the model's layout and
    /// element type.
    fn pack(&self, image: &[u8], blob: &mut InputBlob) {
        let _s = span!("pack");

        let planar;
        let ordered: &[u8] = match self.spec.input_layout {
            TensorLayout::Nhwc => image,
            TensorLayout::Nchw => {
                planar = to_planar(image, self.spec.input_channels);
                &planar
            }
        };

        match self.spec.input_datatype {
            DataType::Uint8 => blob.extend_from_slice(ordered),
            DataType::Fp32 => {
                let normalized: Vec<f32> = ordered.iter().map(|&v| v as f32 / 255.0).collect();
                blob.extend_from_slice(bytemuck::cast_slice(&normalized));
            }
        }
    }
}

/// HWC to CHW. Every element is moved to its own plane.
fn to_planar(image: &[u8], channels: usize) -> Vec<u8> {
    if channels == 1 {
        return image.to_vec();
    }

    let spatial = image.len() / channels;
    let mut output = vec![0u8; image.len()];

    for (i, px) in image.chunks_exact(channels).enumerate() {
        for (c, &value) in px.iter().enumerate() {
            output[c * spatial + i] = value;
        }
    }

    output
}

impl Preprocess for CpuPreProcessor {
    fn preprocess(&self, frame: &RawFrame) -> Result<PreprocessResult, ConfigError> {
        self.preprocess_frame(frame)
    }

    fn preprocess_batch(&self, frames: &[RawFrame]) -> Result<BatchPreprocessResult, ConfigError> {
        self.preprocess_frames(frames)
    }

    fn input_size(&self) -> (u32, u32) {
        self.spec.input_size()
    }

    fn resize_policy(&self) -> ResizePolicy {
        self.policy
    }
}
