use async_trait::async_trait;
use bytes::Bytes;

use crate::BlobResult;

/// Object storage primitives - implemented by every storage backend
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store an object under `key`
    async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> BlobResult<PutResult>;

    /// Object metadata without content; `NotFound` when the key does not resolve
    async fn head(&self, key: &str) -> BlobResult<ObjectHead>;

    /// Delete an object
    async fn delete(&self, key: &str) -> BlobResult<()>;

    /// Publicly resolvable URL for a key
    fn public_url(&self, key: &str) -> String;

    /// Map a public URL back to its key
    fn key_from_url(&self, url: &str) -> Option<String> {
        key_from_public_url(url)
    }
}

/// Result of a successful put operation
#[derive(Debug, Clone)]
pub struct PutResult {
    pub key: String,
    pub url: String,
    pub etag: Option<String>,
    pub size_bytes: u64,
}

/// Metadata about an object
#[derive(Debug, Clone)]
pub struct ObjectHead {
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

/// The key is the URL path without its leading slash.
pub fn key_from_public_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("://")?;
    let (_, path) = rest.split_once('/')?;
    let path = path
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_start_matches('/');
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}
