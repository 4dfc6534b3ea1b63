use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};

/// Channel order of an interleaved 8-bit image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb,
    Bgr,
    Gray,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Gray => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// One decoded video frame, interleaved, 8 bits per channel.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, format: PixelFormat, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            pixels,
        }
    }

    /// A frame where every pixel holds the same channel values.
    pub fn filled(width: u32, height: u32, format: PixelFormat, value: &[u8]) -> Self {
        let pixels = value
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * format.channels())
            .collect();
        Self::new(width, height, format, pixels)
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    /// Checks dimensions against the pixel buffer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidImage(format!(
                "frame has zero extent ({}x{})",
                self.width, self.height
            )));
        }

        let expected = self.width as usize * self.height as usize * self.channels();
        if self.pixels.len() != expected {
            return Err(ConfigError::BufferSizeMismatch {
                expected,
                actual: self.pixels.len(),
            });
        }

        Ok(())
    }
}
