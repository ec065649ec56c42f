//! Byte-signature detection.

use serde::Serialize;

/// Number of leading bytes [`sniff`] looks at.
pub const SNIFF_LEN: usize = 12;

const HEIC_BRANDS: [&[u8; 4]; 6] = [b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis"];
const HEIF_BRANDS: [&[u8; 4]; 3] = [b"mif1", b"msf1", b"heif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    WebP,
    Heic,
    Heif,
}

impl ImageKind {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Gif => "image/gif",
            ImageKind::WebP => "image/webp",
            ImageKind::Heic => "image/heic",
            ImageKind::Heif => "image/heif",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Gif => "gif",
            ImageKind::WebP => "webp",
            ImageKind::Heic => "heic",
            ImageKind::Heif => "heif",
        }
    }

    /// Whether browsers display this type without conversion.
    pub fn is_renderable(&self) -> bool {
        !matches!(self, ImageKind::Heic | ImageKind::Heif)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "png" => Some(ImageKind::Png),
            "gif" => Some(ImageKind::Gif),
            "webp" => Some(ImageKind::WebP),
            "heic" => Some(ImageKind::Heic),
            "heif" => Some(ImageKind::Heif),
            _ => None,
        }
    }

    /// Kind declared by a filename's extension.
    pub fn from_filename(name: &str) -> Option<Self> {
        name.rsplit_once('.').and_then(|(_, ext)| Self::from_extension(ext))
    }

    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            image::ImageFormat::Png => Some(ImageKind::Png),
            image::ImageFormat::Gif => Some(ImageKind::Gif),
            image::ImageFormat::WebP => Some(ImageKind::WebP),
            _ => None,
        }
    }
}

/// Detect the real encoded type from the first [`SNIFF_LEN`] bytes.
pub fn sniff(bytes: &[u8]) -> Option<ImageKind> {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];

    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(ImageKind::Jpeg);
    }
    if head.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(ImageKind::Png);
    }
    if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        return Some(ImageKind::Gif);
    }
    if head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WEBP" {
        return Some(ImageKind::WebP);
    }
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        let brand = &head[8..12];
        if HEIC_BRANDS.iter().any(|b| &b[..] == brand) {
            return Some(ImageKind::Heic);
        }
        if HEIF_BRANDS.iter().any(|b| &b[..] == brand) {
            return Some(ImageKind::Heif);
        }
    }
    None
}
