//! The photo submission pipeline.
//!
//! ```text
//! files ─► normalize + transcode (blocking pool, concurrent)
//!       ─► upload (sequential chunks, retried)
//!       ─► register (one backend call)
//! ```
//!
//! Each file is tracked as an [`UploadableItem`] whose status only moves
//! forward and only completes once the photo is registered. Bad files fail
//! alone; only validation problems abort the whole submission up front.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use wed_blob::{BlobError, FailureReason, ItemFailure, StoredObject, UploadCoordinator, UploadItem};
use wed_core::{ErrorKind, WedError, WedResult};
use wed_imaging::{EncodedImage, ImagingError, Normalizer, SourceFile, TranscodeOptions, Transcoder};

use crate::registrar::MetadataRegistrar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Uploading,
    Completed,
    Error,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Error)
    }

    pub fn can_become(&self, next: ItemStatus) -> bool {
        matches!(
            (self, next),
            (ItemStatus::Pending, ItemStatus::Uploading)
                | (ItemStatus::Pending, ItemStatus::Error)
                | (ItemStatus::Uploading, ItemStatus::Completed)
                | (ItemStatus::Uploading, ItemStatus::Error)
        )
    }
}

/// One file of a submission, for the duration of that submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadableItem {
    /// `{file name}-{modification time}`
    pub id: String,
    pub file_name: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    #[serde(skip)]
    source: Bytes,
}

impl UploadableItem {
    pub fn new(file: &SourceFile) -> Self {
        Self {
            id: format!("{}-{}", file.name, file.last_modified.unwrap_or_default()),
            file_name: file.name.clone(),
            status: ItemStatus::Pending,
            url: None,
            error: None,
            reason: None,
            source: file.bytes.clone(),
        }
    }

    pub fn source(&self) -> &Bytes {
        &self.source
    }

    fn advance(&mut self, next: ItemStatus) -> WedResult<()> {
        if !self.status.can_become(next) {
            return Err(WedError::conflict(format!(
                "{} cannot move from {:?} to {next:?}",
                self.file_name, self.status
            ))
            .into_anyhow());
        }
        self.status = next;
        Ok(())
    }

    pub fn start_upload(&mut self) -> WedResult<()> {
        self.advance(ItemStatus::Uploading)
    }

    pub fn complete(&mut self, url: impl Into<String>) -> WedResult<()> {
        self.advance(ItemStatus::Completed)?;
        self.url = Some(url.into());
        Ok(())
    }

    pub fn fail(&mut self, failure: ItemFailure) -> WedResult<()> {
        self.advance(ItemStatus::Error)?;
        self.error = Some(failure.message);
        self.reason = Some(failure.reason);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionMode {
    /// Partial success is accepted; images are registered unapproved.
    Guest,
    /// Any failure blocks registration and the stored siblings are removed;
    /// images are registered approved.
    Admin,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub category_id: String,
    pub prefix: String,
    pub files: Vec<SourceFile>,
    pub mode: SubmissionMode,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReport {
    pub category_id: String,
    pub items: Vec<UploadableItem>,
    pub urls: Vec<String>,
    pub total_success: usize,
    pub total_failed: usize,
    pub registered: usize,
}

impl SubmissionReport {
    fn new(category_id: &str, items: Vec<UploadableItem>) -> Self {
        let urls: Vec<String> = items.iter().filter_map(|i| i.url.clone()).collect();
        let total_failed = items.iter().filter(|i| i.status == ItemStatus::Error).count();
        Self {
            category_id: category_id.to_string(),
            total_success: urls.len(),
            total_failed,
            urls,
            items,
            registered: 0,
        }
    }

    /// Some items succeeded and some did not.
    pub fn is_partial(&self) -> bool {
        self.total_success > 0 && self.total_failed > 0
    }
}

pub struct SubmissionPipeline {
    normalizer: Normalizer,
    transcoder: Transcoder,
    max_file_bytes: u64,
    coordinator: Arc<dyn UploadCoordinator>,
    registrar: Arc<MetadataRegistrar>,
}

impl SubmissionPipeline {
    pub fn new(
        normalizer: Normalizer,
        transcode: TranscodeOptions,
        max_file_bytes: u64,
        coordinator: Arc<dyn UploadCoordinator>,
        registrar: Arc<MetadataRegistrar>,
    ) -> Self {
        Self {
            normalizer,
            transcoder: Transcoder::new(transcode),
            max_file_bytes,
            coordinator,
            registrar,
        }
    }

    pub fn coordinator(&self) -> &Arc<dyn UploadCoordinator> {
        &self.coordinator
    }

    /// Normalize and transcode every file on the blocking pool, concurrently.
    /// Results are in input order.
    pub async fn prepare(&self, files: &[SourceFile]) -> Vec<Result<(String, EncodedImage), ItemFailure>> {
        let jobs = files.iter().map(|file| {
            let normalizer = self.normalizer.clone();
            let transcoder = self.transcoder.clone();
            let file = file.clone();
            let limit = self.max_file_bytes;

            async move {
                let name = file.name.clone();
                if file.bytes.len() as u64 > limit {
                    let err = BlobError::too_large(&name, file.bytes.len() as u64, limit);
                    return Err(ItemFailure::from(&err));
                }

                let job = tokio::task::spawn_blocking(move || -> Result<(String, EncodedImage), ImagingError> {
                    let normalized = normalizer.normalize(file)?;
                    let encoded = transcoder.transcode(&normalized.bytes)?;
                    Ok((normalized.name, encoded))
                });

                match job.await {
                    Ok(Ok(prepared)) => Ok(prepared),
                    Ok(Err(err)) => {
                        tracing::warn!(file = %name, error = %err, "file could not be prepared");
                        Err(imaging_failure(&name, &err))
                    }
                    Err(join) => {
                        tracing::error!(file = %name, error = %join, "image worker failed");
                        Err(ItemFailure::new(
                            FailureReason::UnsupportedFormat,
                            format!("{name}: the photo could not be processed."),
                        ))
                    }
                }
            }
        });

        join_all(jobs).await
    }

    /// Prepare and store a single file under `prefix` without registering it.
    pub async fn store_one(&self, prefix: &str, file: SourceFile) -> WedResult<StoredObject> {
        let name = file.name.clone();
        let (file_name, encoded) = match self.prepare(std::slice::from_ref(&file)).await.pop() {
            Some(Ok(prepared)) => prepared,
            Some(Err(failure)) => return Err(failure_error(&failure).into_anyhow()),
            None => return Err(WedError::bad_request(format!("{name}: nothing to upload.")).into_anyhow()),
        };

        let item = UploadItem::new(file_name, encoded.mime(), encoded.bytes);
        let report = self.coordinator.upload_batch(prefix, vec![item]).await;
        match report.outcomes.into_iter().next().map(|o| o.result) {
            Some(Ok(stored)) => Ok(stored),
            Some(Err(failure)) => Err(failure_error(&failure).into_anyhow()),
            None => Err(WedError::general_error("Upload produced no result.").into_anyhow()),
        }
    }

    /// Run a whole submission. Returns the report when at least one photo was
    /// stored and registered (all of them in admin mode).
    pub async fn submit(&self, submission: Submission) -> WedResult<SubmissionReport> {
        let Submission {
            category_id,
            prefix,
            files,
            mode,
        } = submission;

        let category_id = category_id.trim().to_string();
        if category_id.is_empty() {
            return Err(WedError::bad_request("Please select a category.").into_anyhow());
        }
        if files.is_empty() {
            return Err(WedError::bad_request("At least one image is required.").into_anyhow());
        }

        let mut items: Vec<UploadableItem> = files.iter().map(UploadableItem::new).collect();
        let prepared = self.prepare(&files).await;

        // items still pending after preparation, with their encoded payloads
        let mut queued: Vec<(usize, UploadItem)> = Vec::new();
        for (idx, result) in prepared.into_iter().enumerate() {
            match result {
                Ok((name, encoded)) => {
                    items[idx].start_upload()?;
                    queued.push((idx, UploadItem::new(name, encoded.mime(), encoded.bytes)));
                }
                Err(failure) => items[idx].fail(failure)?,
            }
        }

        // stored but not yet registered: these items stay `Uploading`
        let mut stored: Vec<(usize, String)> = Vec::new();
        if !queued.is_empty() {
            let (indices, uploads): (Vec<usize>, Vec<UploadItem>) = queued.into_iter().unzip();
            let batch = self.coordinator.upload_batch(&prefix, uploads).await;
            for (idx, outcome) in indices.into_iter().zip(batch.outcomes) {
                match outcome.result {
                    Ok(object) => stored.push((idx, object.url)),
                    Err(failure) => items[idx].fail(failure)?,
                }
            }
        }

        let failed = items.iter().filter(|i| i.status == ItemStatus::Error).count();
        tracing::info!(
            category = %category_id,
            stored = stored.len(),
            failed,
            ?mode,
            "submission uploaded"
        );

        if stored.is_empty() {
            return Err(all_failed(SubmissionReport::new(&category_id, items)));
        }

        let urls: Vec<String> = stored.iter().map(|(_, url)| url.clone()).collect();
        if mode == SubmissionMode::Admin && failed > 0 {
            let removed = self.coordinator.delete_urls(&urls).await;
            tracing::warn!(removed, "incomplete admin upload, stored siblings removed");
            for (idx, _) in &stored {
                let name = items[*idx].file_name.clone();
                items[*idx].fail(ItemFailure::new(
                    FailureReason::NotRegistered,
                    format!("{name}: not saved because another photo failed."),
                ))?;
            }
            return Err(incomplete(SubmissionReport::new(&category_id, items)));
        }

        let registered = match mode {
            SubmissionMode::Guest => self.registrar.register(&urls, &category_id).await,
            SubmissionMode::Admin => self.registrar.register_approved(&urls, &category_id).await,
        };

        match registered {
            Ok(count) => {
                for (idx, url) in stored {
                    items[idx].complete(url)?;
                }
                let mut report = SubmissionReport::new(&category_id, items);
                report.registered = count;
                if report.is_partial() {
                    tracing::warn!(failed = report.total_failed, "submission partially succeeded");
                }
                Ok(report)
            }
            Err(err) => {
                for (idx, _) in &stored {
                    let name = items[*idx].file_name.clone();
                    items[*idx].fail(ItemFailure::new(
                        FailureReason::NotRegistered,
                        format!("{name}: stored but could not be added to the gallery."),
                    ))?;
                }
                if WedError::kind_of(&err) == Some(ErrorKind::BackendConsistency) {
                    self.spawn_orphan_cleanup(urls);
                }
                Err(with_report(err, SubmissionReport::new(&category_id, items)))
            }
        }
    }

    /// Best-effort removal of objects that were stored but never registered.
    pub fn spawn_orphan_cleanup(&self, urls: Vec<String>) {
        let coordinator = Arc::clone(&self.coordinator);
        tokio::spawn(async move {
            let removed = coordinator.delete_urls(&urls).await;
            tracing::info!(removed, total = urls.len(), "orphaned uploads cleaned up");
        });
    }
}

/// The error a single-file operation reports for a failed item.
pub fn failure_error(failure: &ItemFailure) -> WedError {
    let message = failure.message.clone();
    match failure.reason {
        FailureReason::TooLarge => WedError::payload_too_large(message),
        FailureReason::UnsupportedFormat => WedError::unsupported_media_type(message),
        FailureReason::Network | FailureReason::Storage => WedError::bad_gateway(message),
        FailureReason::NotRegistered => WedError::backend_consistency(message),
    }
}

fn imaging_failure(name: &str, err: &ImagingError) -> ItemFailure {
    let message = match err {
        ImagingError::UnsupportedFormat { .. } => format!("{name}: wrong or unsupported image format."),
        ImagingError::Empty { .. } => format!("{name}: the file is empty."),
        ImagingError::Decode(_) => format!("{name}: the image is corrupt and could not be read."),
        other => format!("{name}: {other}"),
    };
    ItemFailure::new(FailureReason::UnsupportedFormat, message)
}

/// Every item failed: 502 when storage was the cause, 422 when the files were.
fn all_failed(report: SubmissionReport) -> anyhow::Error {
    let network = report
        .items
        .iter()
        .any(|i| matches!(i.reason, Some(FailureReason::Network | FailureReason::Storage)));
    let err = if network {
        WedError::bad_gateway("All uploads failed. Please check your connection and try again.")
    } else {
        WedError::unprocessable("None of the photos could be uploaded.")
    };
    err.with_data(json!(report)).into_anyhow()
}

/// Merge the report into the data of a registration error, keeping the
/// error's own fields.
fn with_report(err: anyhow::Error, report: SubmissionReport) -> anyhow::Error {
    match err.downcast::<WedError>() {
        Ok(mut wed) => {
            let mut data = wed.data.take().unwrap_or_else(|| json!({}));
            if let (Some(fields), Value::Object(extra)) = (data.as_object_mut(), json!(report)) {
                for (key, value) in extra {
                    fields.entry(key).or_insert(value);
                }
            }
            wed.with_data(data).into_anyhow()
        }
        Err(other) => other,
    }
}

fn incomplete(report: SubmissionReport) -> anyhow::Error {
    WedError::unprocessable("Not every photo could be uploaded, so nothing was saved.")
        .with_data(json!(report))
        .into_anyhow()
}
