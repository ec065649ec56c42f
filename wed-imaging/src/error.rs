use thiserror::Error;
use wed_core::WedError;

pub type ImagingResult<T> = Result<T, ImagingError>;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("{name} is empty")]
    Empty { name: String },

    #[error("{name} is not a supported image: {reason}")]
    UnsupportedFormat { name: String, reason: String },

    #[error("HEIC decoding is not available")]
    HeicUnavailable,

    #[error("image could not be decoded: {0}")]
    Decode(String),

    #[error("image could not be encoded: {0}")]
    Encode(String),

    #[error("crop {width}x{height}+{x}+{y} is outside the {image_width}x{image_height} image")]
    InvalidCrop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
}

impl ImagingError {
    pub fn unsupported(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Errors caused by the file itself rather than by the server.
    pub fn is_format_problem(&self) -> bool {
        matches!(
            self,
            Self::Empty { .. } | Self::UnsupportedFormat { .. } | Self::Decode(_) | Self::InvalidCrop { .. }
        )
    }
}

impl From<ImagingError> for WedError {
    fn from(err: ImagingError) -> Self {
        let message = err.to_string();
        match &err {
            ImagingError::Empty { .. } | ImagingError::InvalidCrop { .. } => WedError::bad_request(message),
            ImagingError::UnsupportedFormat { .. } | ImagingError::Decode(_) => {
                WedError::unsupported_media_type(message)
            }
            ImagingError::HeicUnavailable | ImagingError::Encode(_) => WedError::general_error(message),
        }
        .with_source(anyhow::Error::new(err))
    }
}
