//! In-memory image payload passed between loaders, processors and storages.

use bytes::Bytes;

/// Content type used when the payload cannot be identified
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Bytes plus the media type describing them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    bytes: Bytes,
    content_type: String,
}

impl Blob {
    /// Create a blob with an explicit content type
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    /// Create a blob, sniffing the content type from the magic bytes.
    ///
    /// Falls back to `hint` (e.g. a Content-Type header) when the bytes are
    /// not a recognised image, and to `application/octet-stream` otherwise.
    pub fn sniffed(bytes: impl Into<Bytes>, hint: Option<&str>) -> Self {
        let bytes = bytes.into();
        let content_type = sniff_content_type(&bytes)
            .map(str::to_string)
            .or_else(|| hint.filter(|h| !h.is_empty()).map(str::to_string))
            .unwrap_or_else(|| OCTET_STREAM.to_string());
        Self {
            bytes,
            content_type,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_parts(self) -> (Bytes, String) {
        (self.bytes, self.content_type)
    }
}

/// Identify an image media type from its leading bytes
pub fn sniff_content_type(data: &[u8]) -> Option<&'static str> {
    let format = image::guess_format(data).ok()?;
    Some(match format {
        image::ImageFormat::Jpeg => "image/jpeg",
        image::ImageFormat::Png => "image/png",
        image::ImageFormat::WebP => "image/webp",
        image::ImageFormat::Gif => "image/gif",
        image::ImageFormat::Avif => "image/avif",
        image::ImageFormat::Tiff => "image/tiff",
        image::ImageFormat::Bmp => "image/bmp",
        _ => return None,
    })
}
