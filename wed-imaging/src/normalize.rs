use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::format::{sniff, ImageKind};
use crate::heic::{default_decoder, HeicDecoder};
use crate::transcode::encode_webp;
use crate::{ImagingError, ImagingResult};

/// Quality used when converting HEIC/HEIF to WebP.
pub const HEIC_WEBP_QUALITY: f32 = 0.9;

/// A file exactly as the guest submitted it
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Bytes,
    /// Client-reported modification time, epoch milliseconds
    pub last_modified: Option<i64>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            last_modified: None,
        }
    }

    pub fn with_last_modified(mut self, millis: i64) -> Self {
        self.last_modified = Some(millis);
        self
    }
}

/// A file whose name and bytes agree on a renderable type
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedFile {
    pub name: String,
    pub kind: ImageKind,
    #[serde(skip)]
    pub bytes: Bytes,
    /// True when the bytes were re-encoded (HEIC → WebP)
    pub converted: bool,
}

/// Replace the extension of `name` (or append one when it has none).
pub fn rename_with_extension(name: &str, ext: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.{ext}"),
        _ => format!("{name}.{ext}"),
    }
}

#[derive(Clone)]
pub struct Normalizer {
    heic: Arc<dyn HeicDecoder>,
    heic_quality: f32,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(default_decoder())
    }
}

impl Normalizer {
    pub fn new(heic: Arc<dyn HeicDecoder>) -> Self {
        Self {
            heic,
            heic_quality: HEIC_WEBP_QUALITY,
        }
    }

    /// Normalize several files; each result is independent of the others.
    pub fn normalize_all(&self, files: Vec<SourceFile>) -> Vec<ImagingResult<NormalizedFile>> {
        files.into_iter().map(|f| self.normalize(f)).collect()
    }

    pub fn normalize(&self, file: SourceFile) -> ImagingResult<NormalizedFile> {
        if file.bytes.is_empty() {
            return Err(ImagingError::Empty { name: file.name });
        }

        match sniff(&file.bytes) {
            Some(kind) if kind.is_renderable() => Ok(pass_through(file, kind)),
            Some(kind) => self.convert_heic(file, kind),
            None => probe(file, "unrecognized file signature"),
        }
    }

    fn convert_heic(&self, file: SourceFile, kind: ImageKind) -> ImagingResult<NormalizedFile> {
        let converted = self
            .heic
            .decode(&file.bytes)
            .and_then(|image| encode_webp(&image, self.heic_quality));

        match converted {
            Ok(bytes) => {
                tracing::debug!(file = %file.name, from = kind.extension(), "converted to webp");
                Ok(NormalizedFile {
                    name: rename_with_extension(&file.name, ImageKind::WebP.extension()),
                    kind: ImageKind::WebP,
                    bytes,
                    converted: true,
                })
            }
            Err(err) => {
                tracing::warn!(file = %file.name, error = %err, "heic conversion failed, probing original");
                probe(file, &format!("{} could not be converted ({err})", kind.extension().to_uppercase()))
            }
        }
    }
}

fn pass_through(file: SourceFile, kind: ImageKind) -> NormalizedFile {
    let name = if ImageKind::from_filename(&file.name) == Some(kind) {
        file.name
    } else {
        rename_with_extension(&file.name, kind.extension())
    };
    NormalizedFile {
        name,
        kind,
        bytes: file.bytes,
        converted: false,
    }
}

/// Last resort: keep the original if the image decoder can read it.
fn probe(file: SourceFile, reason: &str) -> ImagingResult<NormalizedFile> {
    let probed = image::guess_format(&file.bytes)
        .ok()
        .and_then(ImageKind::from_image_format)
        .filter(|_| image::load_from_memory(&file.bytes).is_ok());

    match probed {
        Some(kind) => Ok(pass_through(file, kind)),
        None => Err(ImagingError::unsupported(file.name, reason)),
    }
}
