//! In-process object store for local runs and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::{BlobError, BlobResult, BlobStore, ObjectHead, PutResult};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Bytes,
    content_type: String,
}

#[derive(Debug, thiserror::Error)]
#[error("injected storage fault: {0}")]
pub struct InjectedFault(pub &'static str);

/// Objects kept in a map; failures can be injected per operation.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    base_url: Arc<String>,
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    failing_puts: Arc<AtomicU32>,
    failing_puts_transient: Arc<AtomicBool>,
    fail_deletes: Arc<AtomicBool>,
    put_calls: Arc<AtomicU32>,
}

impl MemoryBlobStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            base_url: Arc::new(format!("https://{bucket}.memory.local")),
            ..Self::default()
        }
    }

    /// Make the next `n` puts fail, as retryable or fatal backend errors.
    pub fn fail_next_puts(&self, n: u32, transient: bool) {
        self.failing_puts_transient.store(transient, Ordering::SeqCst);
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Number of put calls received, including failed ones.
    pub fn put_calls(&self) -> u32 {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> BlobResult<PutResult> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failing_puts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_puts.store(remaining - 1, Ordering::SeqCst);
            let fault = InjectedFault("put");
            return Err(if self.failing_puts_transient.load(Ordering::SeqCst) {
                BlobError::transient(fault)
            } else {
                BlobError::backend(fault)
            });
        }

        let size_bytes = bytes.len() as u64;
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );

        Ok(PutResult {
            key: key.to_string(),
            url: self.public_url(key),
            etag: None,
            size_bytes,
        })
    }

    async fn head(&self, key: &str) -> BlobResult<ObjectHead> {
        self.objects
            .read()
            .get(key)
            .map(|o| ObjectHead {
                size_bytes: o.bytes.len() as u64,
                content_type: Some(o.content_type.clone()),
                etag: None,
            })
            .ok_or_else(|| BlobError::not_found(key))
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BlobError::backend(InjectedFault("delete")));
        }
        self.objects.write().remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wed_core::Retryable;

    #[tokio::test]
    async fn put_head_delete() {
        let store = MemoryBlobStore::new("wed");
        let put = store
            .put("user_images/a.webp", "image/webp", Bytes::from_static(b"RIFF"))
            .await
            .unwrap();

        assert_eq!(put.url, "https://wed.memory.local/user_images/a.webp");
        assert_eq!(store.key_from_url(&put.url).as_deref(), Some("user_images/a.webp"));
        assert_eq!(store.head("user_images/a.webp").await.unwrap().size_bytes, 4);

        store.delete("user_images/a.webp").await.unwrap();
        assert!(store.head("user_images/a.webp").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn injected_put_failures_are_consumed() {
        let store = MemoryBlobStore::new("wed");
        store.fail_next_puts(1, true);

        let err = store.put("k", "image/png", Bytes::new()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(store.put("k", "image/png", Bytes::new()).await.is_ok());
        assert_eq!(store.put_calls(), 2);
    }

    #[test]
    fn head_of_missing_key_is_not_found() {
        let store = MemoryBlobStore::new("wed");
        let err = tokio_test::block_on(store.head("missing.webp")).unwrap_err();
        assert!(err.is_not_found());
    }
}
