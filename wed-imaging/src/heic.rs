//! HEIC/HEIF decoding seam.
//!
//! The pure-Rust `image` crate cannot read HEIC, so decoding goes through a
//! [`HeicDecoder`]. Builds with the `heic` feature use libheif; other builds
//! report [`ImagingError::HeicUnavailable`] and let the normalizer fall back.

use std::sync::Arc;

use image::DynamicImage;

use crate::{ImagingError, ImagingResult};

pub trait HeicDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> ImagingResult<DynamicImage>;
}

/// Decoder used when no HEIC support is compiled in.
#[derive(Debug, Clone, Default)]
pub struct NoHeicDecoder;

impl HeicDecoder for NoHeicDecoder {
    fn decode(&self, _bytes: &[u8]) -> ImagingResult<DynamicImage> {
        Err(ImagingError::HeicUnavailable)
    }
}

#[cfg(feature = "heic")]
pub use libheif::LibHeifDecoder;

#[cfg(feature = "heic")]
mod libheif {
    use image::{DynamicImage, RgbaImage};
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    use super::HeicDecoder;
    use crate::{ImagingError, ImagingResult};

    #[derive(Default)]
    pub struct LibHeifDecoder;

    impl HeicDecoder for LibHeifDecoder {
        fn decode(&self, bytes: &[u8]) -> ImagingResult<DynamicImage> {
            let lib = LibHeif::new();
            let ctx = HeifContext::read_from_bytes(bytes).map_err(|e| ImagingError::Decode(e.to_string()))?;
            let handle = ctx
                .primary_image_handle()
                .map_err(|e| ImagingError::Decode(e.to_string()))?;
            let decoded = lib
                .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgba), None)
                .map_err(|e| ImagingError::Decode(e.to_string()))?;

            let planes = decoded.planes();
            let plane = planes
                .interleaved
                .ok_or_else(|| ImagingError::Decode("missing interleaved RGBA plane".to_string()))?;

            let (width, height, stride) = (plane.width, plane.height, plane.stride);
            let row_len = width as usize * 4;
            let mut pixels = Vec::with_capacity(row_len * height as usize);
            for row in plane.data.chunks(stride).take(height as usize) {
                pixels.extend_from_slice(&row[..row_len]);
            }

            RgbaImage::from_raw(width, height, pixels)
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(|| ImagingError::Decode("decoded HEIC buffer has the wrong size".to_string()))
        }
    }
}

/// Whether this build can decode HEIC/HEIF (the `heic` feature, which links
/// the system libheif).
pub const HEIC_SUPPORTED: bool = cfg!(feature = "heic");

/// The best decoder this build offers.
pub fn default_decoder() -> Arc<dyn HeicDecoder> {
    #[cfg(feature = "heic")]
    {
        Arc::new(LibHeifDecoder)
    }
    #[cfg(not(feature = "heic"))]
    {
        Arc::new(NoHeicDecoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "heic"))]
    #[test]
    fn builds_without_libheif_report_heic_unavailable() {
        assert!(!HEIC_SUPPORTED);
        let err = default_decoder().decode(b"\0\0\0\x18ftypheic").unwrap_err();
        assert!(matches!(err, ImagingError::HeicUnavailable));
    }
}
