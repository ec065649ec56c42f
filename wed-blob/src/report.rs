use bytes::Bytes;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use wed_core::Retryable;

use crate::BlobError;

/// One encoded image handed to the coordinator
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadItem {
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Why an item did not make it, in terms a guest can act on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    TooLarge,
    UnsupportedFormat,
    Network,
    Storage,
    NotRegistered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub reason: FailureReason,
    pub message: String,
}

impl ItemFailure {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

impl From<&BlobError> for ItemFailure {
    fn from(err: &BlobError) -> Self {
        let reason = match err {
            BlobError::TooLarge { .. } => FailureReason::TooLarge,
            e if e.is_retryable() => FailureReason::Network,
            _ => FailureReason::Storage,
        };
        let message = match reason {
            FailureReason::TooLarge => err.to_string(),
            FailureReason::Network => "Network failure while saving the photo. Please try again.".to_string(),
            _ => "The photo could not be saved to storage.".to_string(),
        };
        ItemFailure::new(reason, message)
    }
}

/// Where a successfully stored object lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// Per-item result: `{fileName, success, url}` or `{fileName, success, error, reason}`
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub file_name: String,
    pub result: Result<StoredObject, ItemFailure>,
}

impl ItemOutcome {
    pub fn stored(file_name: impl Into<String>, object: StoredObject) -> Self {
        Self {
            file_name: file_name.into(),
            result: Ok(object),
        }
    }

    pub fn failed(file_name: impl Into<String>, failure: ItemFailure) -> Self {
        Self {
            file_name: file_name.into(),
            result: Err(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn url(&self) -> Option<&str> {
        self.result.as_ref().ok().map(|o| o.url.as_str())
    }
}

impl Serialize for ItemOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ItemOutcome", 4)?;
        s.serialize_field("fileName", &self.file_name)?;
        s.serialize_field("success", &self.is_success())?;
        match &self.result {
            Ok(object) => s.serialize_field("url", &object.url)?,
            Err(failure) => {
                s.serialize_field("error", &failure.message)?;
                s.serialize_field("reason", &failure.reason)?;
            }
        }
        s.end()
    }
}

/// Aggregate of one `upload_batch` call, in submission order
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
    pub fn total_success(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn total_failed(&self) -> usize {
        self.outcomes.len() - self.total_success()
    }

    pub fn any_succeeded(&self) -> bool {
        self.outcomes.iter().any(ItemOutcome::is_success)
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(ItemOutcome::is_success)
    }

    pub fn stored(&self) -> impl Iterator<Item = &StoredObject> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn urls(&self) -> Vec<String> {
        self.stored().map(|o| o.url.clone()).collect()
    }
}

impl Serialize for BatchReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("BatchReport", 4)?;
        s.serialize_field("urls", &self.urls())?;
        s.serialize_field("results", &self.outcomes)?;
        s.serialize_field("totalSuccess", &self.total_success())?;
        s.serialize_field("totalFailed", &self.total_failed())?;
        s.end()
    }
}
