use std::time::Duration;

use thiserror::Error;
use wed_core::{Retryable, WedError};

/// Result type for blob operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur during blob operations
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("{filename}: File size exceeds {} limit.", size_label(*limit))]
    TooLarge { filename: String, size: u64, limit: u64 },

    #[error("Storage {op} timed out after {}s", after.as_secs())]
    Timeout { op: &'static str, after: Duration },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
        transient: bool,
    },
}

impl BlobError {
    /// A backend failure that will not go away by retrying.
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
            transient: false,
        }
    }

    /// A backend failure worth retrying (dispatch failure, 5xx, throttling).
    pub fn transient<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
            transient: true,
        }
    }

    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(key: S) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn too_large<S: Into<String>>(filename: S, size: u64, limit: u64) -> Self {
        Self::TooLarge {
            filename: filename.into(),
            size,
            limit,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// `20MB`, `1.5MB`, `512KB` or `100 bytes`.
fn size_label(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    if bytes >= MB {
        let mb = bytes as f64 / MB as f64;
        let text = format!("{mb:.2}");
        format!("{}MB", text.trim_end_matches('0').trim_end_matches('.'))
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        format!("{bytes} bytes")
    }
}

impl Retryable for BlobError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Backend { transient, .. } => *transient,
            _ => false,
        }
    }
}

impl From<BlobError> for WedError {
    fn from(err: BlobError) -> Self {
        let message = err.to_string();
        match &err {
            BlobError::NotFound { .. } => WedError::not_found(message),
            BlobError::Invalid { .. } => WedError::bad_request(message),
            BlobError::TooLarge { .. } => WedError::payload_too_large(message),
            BlobError::Timeout { .. } => WedError::timeout(message),
            BlobError::Backend { transient: true, .. } => WedError::unavailable(message),
            BlobError::Backend { .. } => WedError::bad_gateway(message),
        }
        .with_source(anyhow::Error::new(err))
    }
}
