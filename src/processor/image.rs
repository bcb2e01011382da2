//! Bundled raster processor
//!
//! Handles the actual image transformation:
//! decode → auto-orient → trim → crop → resize → flip → filters → encode.
//!
//! Pixel work runs on the blocking pool; the async side only moves bytes.

use std::collections::HashSet;
use std::io::Cursor;
use std::num::NonZeroU32;

use async_trait::async_trait;
use fast_image_resize::{FilterType, Image, PixelType, ResizeAlg, Resizer};
use image::io::Reader as ImageReader;
use image::{DynamicImage, GenericImageView, Rgba};

use super::encoder::{EncoderFactory, EncoderQuality, OutputFormat};
use super::{Metadata, Processor, ProcessorError};
use crate::blob::Blob;
use crate::config::ProcessorConfig;
use crate::params::{Filter, HAlign, Params, TrimBy, VAlign};

/// Filters [`apply_filter`] knows how to run
const IMPLEMENTED_FILTERS: &[&str] = &[
    "blur",
    "brightness",
    "contrast",
    "format",
    "grayscale",
    "no_upscale",
    "quality",
    "rotate",
    "sharpen",
    "strip_exif",
    "strip_icc",
];

/// Options of the bundled processor
#[derive(Debug, Clone)]
pub struct ImageOptions {
    /// Filter names this processor refuses
    pub disabled: HashSet<String>,
    pub max_width: u32,
    pub max_height: u32,
    pub default_quality: u8,
    /// Largest decoded source accepted, in pixels
    pub max_source_pixels: u64,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self::from(&ProcessorConfig::default())
    }
}

impl From<&ProcessorConfig> for ImageOptions {
    fn from(config: &ProcessorConfig) -> Self {
        Self {
            disabled: config.disabled().into_iter().collect(),
            max_width: config.max_width,
            max_height: config.max_height,
            default_quality: config.default_quality,
            max_source_pixels: config.max_source_pixels,
        }
    }
}

/// Processor built on the `image` and `fast_image_resize` crates
pub struct ImageProcessor {
    options: ImageOptions,
}

impl ImageProcessor {
    pub fn new(options: ImageOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Processor for ImageProcessor {
    fn name(&self) -> &str {
        "image"
    }

    fn rejects(&self, filter: &str) -> bool {
        self.options.disabled.contains(filter)
    }

    async fn process(&self, blob: &Blob, params: &Params) -> Result<Blob, ProcessorError> {
        let source_format = source_format(blob)?;
        if let Some(filter) = params
            .filters
            .iter()
            .find(|f| !IMPLEMENTED_FILTERS.contains(&f.name.as_str()))
        {
            return Err(ProcessorError::Unsupported(format!("filter {}", filter.name)));
        }
        if params.is_passthrough() {
            return Ok(blob.clone());
        }

        let data = blob.bytes().clone();
        let params = params.clone();
        let options = self.options.clone();
        let encoded = tokio::task::spawn_blocking(move || {
            transform(&data, source_format, &params, &options)
        })
        .await
        .map_err(|e| ProcessorError::Fatal(format!("processing task failed: {e}")))??;

        Ok(Blob::new(encoded.data, encoded.format.content_type()))
    }

    async fn process_meta(&self, blob: &Blob) -> Result<Metadata, ProcessorError> {
        let format = source_format(blob)?;
        let (width, height) = ImageReader::with_format(Cursor::new(blob.bytes()), format)
            .into_dimensions()
            .map_err(|e| ProcessorError::Fatal(format!("failed to read dimensions: {e}")))?;

        Ok(Metadata {
            format: format_name(format).to_string(),
            content_type: blob.content_type().to_string(),
            width,
            height,
            orientation: detect_exif_orientation(blob.bytes()),
            bytes: blob.len(),
        })
    }
}

/// Decodable source format, or `Unsupported` so another processor can try
fn source_format(blob: &Blob) -> Result<image::ImageFormat, ProcessorError> {
    let format = image::guess_format(blob.bytes())
        .map_err(|_| ProcessorError::Unsupported(format!("not an image: {}", blob.content_type())))?;
    match format {
        image::ImageFormat::Jpeg
        | image::ImageFormat::Png
        | image::ImageFormat::WebP
        | image::ImageFormat::Gif => Ok(format),
        other => Err(ProcessorError::Unsupported(format!(
            "no decoder for {other:?}"
        ))),
    }
}

fn format_name(format: image::ImageFormat) -> &'static str {
    OutputFormat::from_image_format(format)
        .map(|f| f.as_str())
        .unwrap_or("unknown")
}

/// Extract EXIF Orientation tag (1-8). Returns None if missing or invalid.
pub fn detect_exif_orientation(bytes: &[u8]) -> Option<u16> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let orientation = field.value.get_uint(0)? as u16;
    (1..=8).contains(&orientation).then_some(orientation)
}

/// Full synchronous pipeline
fn transform(
    data: &[u8],
    source_format: image::ImageFormat,
    params: &Params,
    options: &ImageOptions,
) -> Result<super::encoder::EncodedImage, ProcessorError> {
    let mut img = decode_image(data, source_format, options.max_source_pixels)?;

    if let Some(orientation) = detect_exif_orientation(data) {
        img = apply_orientation(img, orientation);
    }

    if params.trim {
        img = trim(img, params.trim_by, params.trim_tolerance);
    }

    if params.has_crop() {
        img = crop(img, params)?;
    }

    let no_upscale = params.filter("no_upscale").is_some();
    img = resize(img, params, options, no_upscale)?;

    if params.h_flip {
        img = img.fliph();
    }
    if params.v_flip {
        img = img.flipv();
    }

    let mut output_format =
        OutputFormat::from_image_format(source_format).unwrap_or(OutputFormat::Jpeg);
    let mut quality = EncoderQuality::with_quality(options.default_quality);

    for filter in &params.filters {
        img = apply_filter(img, filter, &mut output_format, &mut quality)?;
    }

    let encoder = EncoderFactory::create(output_format);
    let mut rgba = img.to_rgba8();
    if !encoder.supports_transparency() {
        flatten_alpha(&mut rgba);
    }
    let (width, height) = rgba.dimensions();
    encoder.encode(rgba.as_raw(), width, height, quality)
}

/// Composite translucent pixels over white
fn flatten_alpha(rgba: &mut image::RgbaImage) {
    for pixel in rgba.pixels_mut() {
        let alpha = pixel[3] as u32;
        if alpha == 255 {
            continue;
        }
        for channel in 0..3 {
            let value = pixel[channel] as u32;
            pixel[channel] = ((value * alpha + 255 * (255 - alpha)) / 255) as u8;
        }
        pixel[3] = 255;
    }
}

/// Decode image data, refusing sources above the pixel limit before decoding
fn decode_image(
    data: &[u8],
    format: image::ImageFormat,
    max_pixels: u64,
) -> Result<DynamicImage, ProcessorError> {
    let (width, height) = ImageReader::with_format(Cursor::new(data), format)
        .into_dimensions()
        .map_err(|e| ProcessorError::Fatal(format!("failed to decode image: {e}")))?;
    let pixels = width as u64 * height as u64;
    if max_pixels > 0 && pixels > max_pixels {
        return Err(ProcessorError::Fatal(format!(
            "source is {width}x{height}, above the {max_pixels} pixel limit"
        )));
    }

    ImageReader::with_format(Cursor::new(data), format)
        .decode()
        .map_err(|e| ProcessorError::Fatal(format!("failed to decode image: {e}")))
}

fn apply_orientation(img: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Remove a uniform border whose colour is taken from one corner
fn trim(img: DynamicImage, by: TrimBy, tolerance: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return img;
    }
    let reference = match by {
        TrimBy::TopLeft => img.get_pixel(0, 0),
        TrimBy::BottomRight => img.get_pixel(width - 1, height - 1),
    };

    let mut left = width;
    let mut top = height;
    let mut right = 0;
    let mut bottom = 0;
    for (x, y, pixel) in img.pixels() {
        if color_distance(pixel, reference) > tolerance {
            left = left.min(x);
            top = top.min(y);
            right = right.max(x);
            bottom = bottom.max(y);
        }
    }

    if left > right || top > bottom {
        // Uniform image; nothing to keep but the image itself
        return img;
    }
    img.crop_imm(left, top, right - left + 1, bottom - top + 1)
}

fn color_distance(a: Rgba<u8>, b: Rgba<u8>) -> u32 {
    a.0.iter()
        .zip(b.0.iter())
        .map(|(x, y)| (*x as i32 - *y as i32).unsigned_abs())
        .max()
        .unwrap_or(0)
}

/// Manual crop box, clamped to the image
fn crop(img: DynamicImage, params: &Params) -> Result<DynamicImage, ProcessorError> {
    let (width, height) = img.dimensions();
    let left = params.crop_left.min(width);
    let top = params.crop_top.min(height);
    let right = params.crop_right.min(width);
    let bottom = params.crop_bottom.min(height);
    if right <= left || bottom <= top {
        return Err(ProcessorError::Fatal(format!(
            "crop box {}x{}:{}x{} is outside the {width}x{height} image",
            params.crop_left, params.crop_top, params.crop_right, params.crop_bottom
        )));
    }
    Ok(img.crop_imm(left, top, right - left, bottom - top))
}

/// Resize according to fit-in / stretch / fill semantics
fn resize(
    img: DynamicImage,
    params: &Params,
    options: &ImageOptions,
    no_upscale: bool,
) -> Result<DynamicImage, ProcessorError> {
    let (src_w, src_h) = img.dimensions();
    let req_w = params.width.min(options.max_width);
    let req_h = params.height.min(options.max_height);
    if req_w == 0 && req_h == 0 {
        return Ok(img);
    }

    if params.stretch {
        let (w, h) = limit_upscale(
            if req_w == 0 { src_w } else { req_w },
            if req_h == 0 { src_h } else { req_h },
            src_w,
            src_h,
            no_upscale,
        );
        return resize_image(&img, w, h);
    }

    let scale_w = req_w as f64 / src_w as f64;
    let scale_h = req_h as f64 / src_h as f64;

    if params.fit_in || req_w == 0 || req_h == 0 {
        // Proportional: the box constrains, zero means unconstrained
        let scale = match (req_w, req_h) {
            (0, _) => scale_h,
            (_, 0) => scale_w,
            _ => scale_w.min(scale_h),
        };
        let scale = if no_upscale { scale.min(1.0) } else { scale };
        let (w, h) = scaled(src_w, src_h, bounded(scale, src_w, src_h, options));
        return resize_image(&img, w, h);
    }

    // Fill: cover the box, then cut it out using the alignment
    let scale = scale_w.max(scale_h);
    let scale = if no_upscale { scale.min(1.0) } else { scale };
    let (w, h) = scaled(src_w, src_h, bounded(scale, src_w, src_h, options));
    let resized = resize_image(&img, w, h)?;

    let box_w = req_w.min(w);
    let box_h = req_h.min(h);
    let x = match params.h_align {
        HAlign::Left => 0,
        HAlign::Center => (w - box_w) / 2,
        HAlign::Right => w - box_w,
    };
    let y = match params.v_align {
        VAlign::Top => 0,
        VAlign::Middle => (h - box_h) / 2,
        VAlign::Bottom => h - box_h,
    };
    Ok(resized.crop_imm(x, y, box_w, box_h))
}

/// Largest scale that keeps the output within the configured limits
fn bounded(scale: f64, src_w: u32, src_h: u32, options: &ImageOptions) -> f64 {
    scale
        .min(options.max_width as f64 / src_w as f64)
        .min(options.max_height as f64 / src_h as f64)
}

fn scaled(src_w: u32, src_h: u32, scale: f64) -> (u32, u32) {
    let w = (src_w as f64 * scale).round().max(1.0) as u32;
    let h = (src_h as f64 * scale).round().max(1.0) as u32;
    (w, h)
}

fn limit_upscale(w: u32, h: u32, src_w: u32, src_h: u32, no_upscale: bool) -> (u32, u32) {
    if no_upscale {
        (w.min(src_w).max(1), h.min(src_h).max(1))
    } else {
        (w.max(1), h.max(1))
    }
}

/// Resize image using fast-image-resize with Lanczos3 filter
fn resize_image(
    img: &DynamicImage,
    target_w: u32,
    target_h: u32,
) -> Result<DynamicImage, ProcessorError> {
    let (src_w, src_h) = img.dimensions();
    if (src_w, src_h) == (target_w, target_h) {
        return Ok(img.clone());
    }

    let resize_failed = |msg: &str| ProcessorError::Fatal(format!("resize failed: {msg}"));
    let src_width = NonZeroU32::new(src_w).ok_or_else(|| resize_failed("source width is 0"))?;
    let src_height = NonZeroU32::new(src_h).ok_or_else(|| resize_failed("source height is 0"))?;
    let dst_width = NonZeroU32::new(target_w).ok_or_else(|| resize_failed("target width is 0"))?;
    let dst_height =
        NonZeroU32::new(target_h).ok_or_else(|| resize_failed("target height is 0"))?;

    let src_image = Image::from_vec_u8(
        src_width,
        src_height,
        img.to_rgba8().into_raw(),
        PixelType::U8x4,
    )
    .map_err(|e| resize_failed(&format!("{e:?}")))?;

    let mut dst_image = Image::new(dst_width, dst_height, PixelType::U8x4);
    let mut resizer = Resizer::new(ResizeAlg::Convolution(FilterType::Lanczos3));
    resizer
        .resize(&src_image.view(), &mut dst_image.view_mut())
        .map_err(|e| resize_failed(&format!("{e:?}")))?;

    let rgba = image::RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| resize_failed("output buffer has the wrong size"))?;
    Ok(DynamicImage::ImageRgba8(rgba))
}

/// Apply one filter from [`IMPLEMENTED_FILTERS`]
fn apply_filter(
    img: DynamicImage,
    filter: &Filter,
    output_format: &mut OutputFormat,
    quality: &mut EncoderQuality,
) -> Result<DynamicImage, ProcessorError> {
    let invalid = || ProcessorError::Fatal(format!("invalid arguments for {filter}"));

    Ok(match filter.name.as_str() {
        "blur" => {
            let sigma: f32 = filter.arg(0).ok_or_else(invalid)?;
            if sigma <= 0.0 {
                img
            } else {
                img.blur(sigma.min(150.0))
            }
        }
        "sharpen" => {
            let sigma: f32 = filter.arg(0).ok_or_else(invalid)?;
            let threshold: i32 = filter.arg(1).unwrap_or(1);
            img.unsharpen(sigma.clamp(0.0, 10.0), threshold)
        }
        "grayscale" => img.grayscale(),
        "brightness" => {
            let percent: i32 = filter.arg(0).ok_or_else(invalid)?;
            img.brighten(percent.clamp(-100, 100) * 255 / 100)
        }
        "contrast" => {
            let percent: f32 = filter.arg(0).ok_or_else(invalid)?;
            img.adjust_contrast(percent.clamp(-100.0, 100.0))
        }
        "rotate" => {
            let degrees: i32 = filter.arg(0).ok_or_else(invalid)?;
            match degrees.rem_euclid(360) {
                0 => img,
                90 => img.rotate90(),
                180 => img.rotate180(),
                270 => img.rotate270(),
                _ => return Err(invalid()),
            }
        }
        "quality" => {
            let value: u8 = filter.arg(0).ok_or_else(invalid)?;
            *quality = EncoderQuality::with_quality(value);
            img
        }
        "format" => {
            let name: String = filter.arg(0).ok_or_else(invalid)?;
            *output_format = name.parse()?;
            img
        }
        // Re-encoding never carries metadata over
        "strip_exif" | "strip_icc" | "no_upscale" => img,
        other => return Err(ProcessorError::Unsupported(format!("filter {other}"))),
    })
}
