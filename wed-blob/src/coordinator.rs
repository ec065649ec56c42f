use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use wed_core::Retryable;

use crate::{
    BatchReport, BlobConfig, BlobError, BlobKeyStrategy, BlobResult, BlobStore, DefaultKeyStrategy, ItemFailure,
    ItemOutcome, StoredObject, UploadItem,
};

/// Sends encoded images to object storage and reports per-item outcomes
#[async_trait]
pub trait UploadCoordinator: Send + Sync {
    /// Upload `items` under `prefix`. Never fails as a whole: every item gets an outcome.
    async fn upload_batch(&self, prefix: &str, items: Vec<UploadItem>) -> BatchReport;

    /// Delete the object behind a public URL.
    async fn delete_url(&self, url: &str) -> BlobResult<()>;

    /// Best-effort deletion of several URLs; returns how many were removed.
    async fn delete_urls(&self, urls: &[String]) -> usize {
        let mut removed = 0;
        for url in urls {
            match self.delete_url(url).await {
                Ok(()) => removed += 1,
                Err(err) => tracing::warn!(url = %url, error = %err, "storage cleanup failed"),
            }
        }
        removed
    }
}

enum Slot {
    Pending,
    Stored(StoredObject),
    Failed { failure: ItemFailure, retryable: bool },
}

impl Slot {
    fn wants_attempt(&self) -> bool {
        matches!(self, Slot::Pending | Slot::Failed { retryable: true, .. })
    }
}

/// Chunked, sequential uploads with a retry policy per chunk
pub struct DefaultUploadCoordinator {
    store: Arc<dyn BlobStore>,
    keys: Arc<dyn BlobKeyStrategy>,
    config: BlobConfig,
}

impl DefaultUploadCoordinator {
    pub fn new(store: Arc<dyn BlobStore>, config: BlobConfig) -> Self {
        Self {
            store,
            keys: Arc::new(DefaultKeyStrategy),
            config,
        }
    }

    pub fn with_key_strategy<K>(mut self, keys: K) -> Self
    where
        K: BlobKeyStrategy + 'static,
    {
        self.keys = Arc::new(keys);
        self
    }

    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    fn validate(&self, item: &UploadItem) -> BlobResult<()> {
        if item.bytes.is_empty() {
            return Err(BlobError::invalid(format!("{}: file is empty", item.filename)));
        }
        if item.size() > self.config.max_blob_bytes {
            return Err(BlobError::too_large(
                &item.filename,
                item.size(),
                self.config.max_blob_bytes,
            ));
        }
        Ok(())
    }

    async fn put_one(&self, key: &str, item: &UploadItem) -> BlobResult<StoredObject> {
        let after = self.config.request_timeout;
        let put = tokio::time::timeout(after, self.store.put(key, &item.content_type, item.bytes.clone()))
            .await
            .map_err(|_| BlobError::Timeout { op: "put", after })??;

        Ok(StoredObject {
            key: put.key,
            url: put.url,
            content_type: item.content_type.clone(),
            size_bytes: put.size_bytes,
        })
    }

    /// One chunk: keys are fixed up front so a retry overwrites instead of orphaning.
    async fn upload_chunk(&self, prefix: &str, chunk: Vec<UploadItem>) -> Vec<ItemOutcome> {
        let keys: Vec<String> = chunk
            .iter()
            .map(|item| self.keys.object_key(prefix, &item.filename, &item.content_type))
            .collect();
        let slots: Mutex<Vec<Slot>> = Mutex::new(chunk.iter().map(|_| Slot::Pending).collect());

        let chunk_ref = &chunk;
        let keys_ref = &keys;
        let slots_ref = &slots;

        let _ = self
            .config
            .retry
            .run("storage upload", |attempt| async move {
                let mut last_transient: Option<BlobError> = None;
                for (idx, item) in chunk_ref.iter().enumerate() {
                    if !slots_ref.lock()[idx].wants_attempt() {
                        continue;
                    }
                    let outcome = self.put_one(&keys_ref[idx], item).await;
                    let slot = match outcome {
                        Ok(object) => Slot::Stored(object),
                        Err(err) => {
                            let retryable = err.is_retryable();
                            tracing::warn!(
                                file = %item.filename,
                                attempt,
                                retryable,
                                error = %err,
                                "storage put failed"
                            );
                            let failure = ItemFailure::from(&err);
                            if retryable {
                                last_transient = Some(err);
                            }
                            Slot::Failed { failure, retryable }
                        }
                    };
                    slots_ref.lock()[idx] = slot;
                }
                match last_transient {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            })
            .await;

        chunk
            .into_iter()
            .zip(slots.into_inner())
            .map(|(item, slot)| match slot {
                Slot::Stored(object) => ItemOutcome::stored(item.filename, object),
                Slot::Failed { failure, .. } => ItemOutcome::failed(item.filename, failure),
                Slot::Pending => ItemOutcome::failed(
                    item.filename,
                    ItemFailure::new(crate::FailureReason::Storage, "The photo was never sent to storage."),
                ),
            })
            .collect()
    }
}

#[async_trait]
impl UploadCoordinator for DefaultUploadCoordinator {
    async fn upload_batch(&self, prefix: &str, items: Vec<UploadItem>) -> BatchReport {
        let total = items.len();
        let mut outcomes: Vec<Option<ItemOutcome>> = (0..total).map(|_| None).collect();
        let mut accepted: Vec<(usize, UploadItem)> = Vec::with_capacity(total);

        for (idx, item) in items.into_iter().enumerate() {
            match self.validate(&item) {
                Ok(()) => accepted.push((idx, item)),
                Err(err) => {
                    tracing::info!(file = %item.filename, error = %err, "rejected before upload");
                    outcomes[idx] = Some(ItemOutcome::failed(item.filename, ItemFailure::from(&err)));
                }
            }
        }

        let chunk_size = self.config.chunk_size.max(1);
        let mut accepted = accepted.into_iter().peekable();
        while accepted.peek().is_some() {
            let (indexes, chunk): (Vec<usize>, Vec<UploadItem>) = accepted.by_ref().take(chunk_size).unzip();
            for (idx, outcome) in indexes.into_iter().zip(self.upload_chunk(prefix, chunk).await) {
                outcomes[idx] = Some(outcome);
            }
        }

        let report = BatchReport {
            outcomes: outcomes.into_iter().flatten().collect(),
        };
        tracing::info!(
            prefix,
            total,
            succeeded = report.total_success(),
            failed = report.total_failed(),
            "upload batch finished"
        );
        report
    }

    async fn delete_url(&self, url: &str) -> BlobResult<()> {
        let key = self
            .store
            .key_from_url(url)
            .ok_or_else(|| BlobError::invalid(format!("Could not determine storage key from URL: {url}")))?;
        let after = self.config.request_timeout;
        tokio::time::timeout(after, self.store.delete(&key))
            .await
            .map_err(|_| BlobError::Timeout { op: "delete", after })??;
        tracing::info!(key = %key, "storage object deleted");
        Ok(())
    }
}
