//! Image encoder abstraction
//!
//! One encoder per output format, all built on the `image` crate codecs,
//! with a shared quality setting.

use std::io::Cursor;
use std::str::FromStr;

use image::ImageEncoder as _;

use super::ProcessorError;

/// Output format of a processed image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Gif => "gif",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
        }
    }

    /// Output format matching a decoded source format, if encodable
    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::WebP => Some(Self::WebP),
            image::ImageFormat::Gif => Some(Self::Gif),
            _ => None,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ProcessorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::WebP),
            "gif" => Ok(OutputFormat::Gif),
            _ => Err(ProcessorError::Fatal(format!("unknown output format: {s}"))),
        }
    }
}

/// Quality settings for image encoding
#[derive(Debug, Clone, Copy)]
pub struct EncoderQuality {
    /// Quality value (1-100, where 100 is best quality)
    pub quality: u8,
}

impl Default for EncoderQuality {
    fn default() -> Self {
        Self {
            quality: crate::constants::DEFAULT_QUALITY,
        }
    }
}

impl EncoderQuality {
    pub fn with_quality(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

/// Encoded bytes plus their format
#[derive(Debug)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub format: OutputFormat,
}

impl EncodedImage {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// Encoder for one output format
pub trait ImageEncoder: Send + Sync {
    /// Encode raw RGBA8 pixels
    fn encode(
        &self,
        rgba: &[u8],
        width: u32,
        height: u32,
        quality: EncoderQuality,
    ) -> Result<EncodedImage, ProcessorError>;

    /// Whether alpha survives encoding; callers flatten otherwise
    fn supports_transparency(&self) -> bool;
}

fn encode_failed(format: &str, e: impl std::fmt::Display) -> ProcessorError {
    ProcessorError::Fatal(format!("failed to encode {format}: {e}"))
}

/// JPEG encoder; alpha is dropped
pub struct JpegEncoder;

impl ImageEncoder for JpegEncoder {
    fn encode(
        &self,
        rgba: &[u8],
        width: u32,
        height: u32,
        quality: EncoderQuality,
    ) -> Result<EncodedImage, ProcessorError> {
        let rgb = rgba_to_rgb(rgba);
        let mut output = Cursor::new(Vec::new());
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, quality.quality)
            .write_image(&rgb, width, height, image::ColorType::Rgb8)
            .map_err(|e| encode_failed("jpeg", e))?;

        Ok(EncodedImage {
            data: output.into_inner(),
            format: OutputFormat::Jpeg,
        })
    }

    fn supports_transparency(&self) -> bool {
        false
    }
}

/// PNG encoder; quality is ignored
pub struct PngEncoder;

impl ImageEncoder for PngEncoder {
    fn encode(
        &self,
        rgba: &[u8],
        width: u32,
        height: u32,
        _quality: EncoderQuality,
    ) -> Result<EncodedImage, ProcessorError> {
        let mut output = Cursor::new(Vec::new());
        image::codecs::png::PngEncoder::new(&mut output)
            .write_image(rgba, width, height, image::ColorType::Rgba8)
            .map_err(|e| encode_failed("png", e))?;

        Ok(EncodedImage {
            data: output.into_inner(),
            format: OutputFormat::Png,
        })
    }

    fn supports_transparency(&self) -> bool {
        true
    }
}

/// WebP encoder
///
/// The `image` crate only encodes lossless WebP, so quality is ignored.
pub struct WebPEncoder;

impl ImageEncoder for WebPEncoder {
    fn encode(
        &self,
        rgba: &[u8],
        width: u32,
        height: u32,
        _quality: EncoderQuality,
    ) -> Result<EncodedImage, ProcessorError> {
        let mut output = Cursor::new(Vec::new());
        image::codecs::webp::WebPEncoder::new_lossless(&mut output)
            .write_image(rgba, width, height, image::ColorType::Rgba8)
            .map_err(|e| encode_failed("webp", e))?;

        Ok(EncodedImage {
            data: output.into_inner(),
            format: OutputFormat::WebP,
        })
    }

    fn supports_transparency(&self) -> bool {
        true
    }
}

/// Single-frame GIF encoder
pub struct GifEncoder;

impl ImageEncoder for GifEncoder {
    fn encode(
        &self,
        rgba: &[u8],
        width: u32,
        height: u32,
        _quality: EncoderQuality,
    ) -> Result<EncodedImage, ProcessorError> {
        let mut data = Vec::new();
        {
            let mut encoder = image::codecs::gif::GifEncoder::new(&mut data);
            encoder
                .encode(rgba, width, height, image::ColorType::Rgba8)
                .map_err(|e| encode_failed("gif", e))?;
        }

        Ok(EncodedImage {
            data,
            format: OutputFormat::Gif,
        })
    }

    fn supports_transparency(&self) -> bool {
        true
    }
}

/// Factory for creating encoders based on output format
pub struct EncoderFactory;

impl EncoderFactory {
    pub fn create(format: OutputFormat) -> Box<dyn ImageEncoder> {
        match format {
            OutputFormat::Jpeg => Box::new(JpegEncoder),
            OutputFormat::Png => Box::new(PngEncoder),
            OutputFormat::WebP => Box::new(WebPEncoder),
            OutputFormat::Gif => Box::new(GifEncoder),
        }
    }
}

/// Convert RGBA to RGB by discarding the alpha channel
fn rgba_to_rgb(rgba: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    for chunk in rgba.chunks_exact(4) {
        rgb.extend_from_slice(&chunk[..3]);
    }
    rgb
}
