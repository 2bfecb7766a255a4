//! Transportable still-image payloads captured from a source.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("failed to encode frame: {0}")]
    Encode(#[source] image::ImageError),
    #[error("failed to decode frame: {0}")]
    Decode(#[source] image::ImageError),
    #[error("frame has zero size")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEncoding {
    Jpeg { quality: u8 },
    Png,
}

impl FrameEncoding {
    pub fn mime(&self) -> &'static str {
        match self {
            FrameEncoding::Jpeg { .. } => "image/jpeg",
            FrameEncoding::Png => "image/png",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            FrameEncoding::Jpeg { .. } => "jpg",
            FrameEncoding::Png => "png",
        }
    }
}

impl Default for FrameEncoding {
    fn default() -> Self {
        FrameEncoding::Jpeg { quality: 85 }
    }
}

/// One encoded capture plus its source-relative timestamp.
///
/// Created per sampling tick and consumed by a single reconciliation task.
#[derive(Debug)]
pub struct FrameSample {
    bytes: Vec<u8>,
    encoding: FrameEncoding,
    width: u32,
    height: u32,
    captured_at: f64,
}

impl FrameSample {
    pub fn encode(
        image: &DynamicImage,
        captured_at: f64,
        encoding: FrameEncoding,
    ) -> Result<Self, FrameError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(FrameError::Empty);
        }

        let mut bytes = Vec::new();
        match encoding {
            FrameEncoding::Jpeg { quality } => {
                // JPEG has no alpha channel.
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
                rgb.write_with_encoder(encoder).map_err(FrameError::Encode)?;
            }
            FrameEncoding::Png => {
                image
                    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
                    .map_err(FrameError::Encode)?;
            }
        }

        Ok(Self {
            bytes,
            encoding,
            width,
            height,
            captured_at,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn encoding(&self) -> FrameEncoding {
        self.encoding
    }

    pub fn mime(&self) -> &'static str {
        self.encoding.mime()
    }

    pub fn file_name(&self) -> String {
        format!("frame.{}", self.encoding.extension())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn captured_at(&self) -> f64 {
        self.captured_at
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime(), self.to_base64())
    }
}
