//! Decode → crop → downsample → encode.
//!
//! | Step     | Implementation                                   |
//! |----------|--------------------------------------------------|
//! | Decode   | `image::load_from_memory`                        |
//! | Crop     | `DynamicImage::crop_imm`                         |
//! | Resize   | `DynamicImage::resize_exact` with `Lanczos3`     |
//! | Encode   | `webp::Encoder` (lossy), PNG through `image`     |

use std::io::Cursor;

use base64::Engine;
use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::Serialize;

use crate::{ImagingError, ImagingResult};

/// Longest edge allowed after transcoding.
pub const DEFAULT_MAX_DIMENSION: u32 = 4096;

/// Lossy WebP quality in `0.0..=1.0`.
pub const DEFAULT_WEBP_QUALITY: f32 = 0.92;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    WebP,
    Png,
}

impl OutputFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            OutputFormat::WebP => "image/webp",
            OutputFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::WebP => "webp",
            OutputFormat::Png => "png",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    pub max_dimension: u32,
    pub webp_quality: f32,
    pub crop: Option<CropRect>,
    /// When false, output is always PNG.
    pub webp_enabled: bool,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            webp_quality: DEFAULT_WEBP_QUALITY,
            crop: None,
            webp_enabled: true,
        }
    }
}

impl TranscodeOptions {
    pub fn with_max_dimension(mut self, max: u32) -> Self {
        self.max_dimension = max.max(1);
        self
    }

    pub fn with_webp_quality(mut self, quality: f32) -> Self {
        self.webp_quality = quality.clamp(0.0, 1.0);
        self
    }

    pub fn with_crop(mut self, crop: CropRect) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn without_webp(mut self) -> Self {
        self.webp_enabled = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Bytes,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }

    pub fn extension(&self) -> &'static str {
        self.format.extension()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `data:image/webp;base64,...`
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime(),
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Scale `(width, height)` so the longer edge is at most `max`.
///
/// Aspect ratio is kept (rounded to the nearest pixel) and images are never
/// upscaled.
///
/// ```
/// # use wed_imaging::fit_within;
/// assert_eq!(fit_within((8192, 4096), 4096), (4096, 2048));
/// assert_eq!(fit_within((1200, 800), 4096), (1200, 800));
/// ```
pub fn fit_within(size: (u32, u32), max: u32) -> (u32, u32) {
    let (w, h) = size;
    let longer = w.max(h);
    if longer <= max || longer == 0 {
        return (w, h);
    }
    let scale = max as f64 / longer as f64;
    if w >= h {
        (max, ((h as f64 * scale).round() as u32).max(1))
    } else {
        (((w as f64 * scale).round() as u32).max(1), max)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Transcoder {
    options: TranscodeOptions,
}

impl Transcoder {
    pub fn new(options: TranscodeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TranscodeOptions {
        &self.options
    }

    /// Decode encoded bytes and transcode them with this transcoder's options.
    pub fn transcode(&self, bytes: &[u8]) -> ImagingResult<EncodedImage> {
        self.transcode_with(bytes, &self.options)
    }

    pub fn transcode_with(&self, bytes: &[u8], options: &TranscodeOptions) -> ImagingResult<EncodedImage> {
        let image = image::load_from_memory(bytes).map_err(|e| ImagingError::Decode(e.to_string()))?;
        transcode_image(&image, options)
    }
}

/// Transcode an already decoded image. The source is not modified.
pub fn transcode_image(source: &DynamicImage, options: &TranscodeOptions) -> ImagingResult<EncodedImage> {
    let (src_w, src_h) = source.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(ImagingError::Encode("image has no pixels".to_string()));
    }

    let cropped;
    let image = match options.crop {
        Some(crop) => {
            let fits = crop.width > 0
                && crop.height > 0
                && crop.x.checked_add(crop.width).is_some_and(|r| r <= src_w)
                && crop.y.checked_add(crop.height).is_some_and(|b| b <= src_h);
            if !fits {
                return Err(ImagingError::InvalidCrop {
                    x: crop.x,
                    y: crop.y,
                    width: crop.width,
                    height: crop.height,
                    image_width: src_w,
                    image_height: src_h,
                });
            }
            cropped = source.crop_imm(crop.x, crop.y, crop.width, crop.height);
            &cropped
        }
        None => source,
    };

    let (w, h) = image.dimensions();
    let (target_w, target_h) = fit_within((w, h), options.max_dimension);
    let resized;
    let image = if (target_w, target_h) != (w, h) {
        resized = image.resize_exact(target_w, target_h, FilterType::Lanczos3);
        &resized
    } else {
        image
    };

    if options.webp_enabled {
        match encode_webp(image, options.webp_quality) {
            Ok(bytes) => {
                return Ok(EncodedImage {
                    bytes,
                    format: OutputFormat::WebP,
                    width: target_w,
                    height: target_h,
                })
            }
            Err(err) => tracing::warn!(error = %err, "webp encoding unavailable, falling back to png"),
        }
    }

    Ok(EncodedImage {
        bytes: encode_png(image)?,
        format: OutputFormat::Png,
        width: target_w,
        height: target_h,
    })
}

/// Lossy WebP at `quality` (`0.0..=1.0`).
pub fn encode_webp(image: &DynamicImage, quality: f32) -> ImagingResult<Bytes> {
    // libwebp only accepts 8-bit RGB(A) buffers.
    let converted;
    let image = match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image,
        other if other.color().has_alpha() => {
            converted = DynamicImage::ImageRgba8(other.to_rgba8());
            &converted
        }
        other => {
            converted = DynamicImage::ImageRgb8(other.to_rgb8());
            &converted
        }
    };

    let encoder = webp::Encoder::from_image(image).map_err(|e| ImagingError::Encode(e.to_string()))?;
    let memory = encoder.encode(quality.clamp(0.0, 1.0) * 100.0);
    if memory.is_empty() {
        return Err(ImagingError::Encode("webp encoder produced no data".to_string()));
    }
    Ok(Bytes::from(memory.to_vec()))
}

pub fn encode_png(image: &DynamicImage) -> ImagingResult<Bytes> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| ImagingError::Encode(e.to_string()))?;
    Ok(Bytes::from(buf))
}
