use std::time::Duration;

use wed_core::RetryPolicy;

/// Configuration for the upload coordinator
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Absolute max size allowed for a single object
    pub max_blob_bytes: u64,

    /// Items sent per chunk; chunks run one after another
    pub chunk_size: usize,

    /// Retry schedule applied to each chunk
    pub retry: RetryPolicy,

    /// Deadline for a single storage call
    pub request_timeout: Duration,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            max_blob_bytes: 20 * 1024 * 1024, // 20MB
            chunk_size: 1,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl BlobConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_blob_bytes(mut self, bytes: u64) -> Self {
        self.max_blob_bytes = bytes;
        self
    }

    /// Set the chunk size (clamped to at least one item)
    pub fn with_chunk_size(mut self, items: usize) -> Self {
        self.chunk_size = items.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
