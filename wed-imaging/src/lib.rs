//! # wed-imaging
//!
//! Turns whatever a guest picked on their phone into something every browser
//! can show:
//!
//! 1. [`normalize`] sniffs the real type from the first bytes, fixes misleading
//!    extensions and converts HEIC/HEIF to WebP.
//! 2. [`transcode`] decodes, optionally crops, downsamples to a maximum
//!    dimension and encodes WebP (PNG when WebP is unavailable).
//!
//! Both steps are CPU bound; async callers run them on the blocking pool.

pub mod error;
pub mod format;
pub mod heic;
pub mod normalize;
pub mod transcode;

pub use error::{ImagingError, ImagingResult};
pub use format::{sniff, ImageKind};
pub use heic::{default_decoder, HeicDecoder, NoHeicDecoder, HEIC_SUPPORTED};
pub use normalize::{rename_with_extension, NormalizedFile, Normalizer, SourceFile};
pub use transcode::{fit_within, CropRect, EncodedImage, OutputFormat, TranscodeOptions, Transcoder};
