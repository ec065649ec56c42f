//! # wed-blob: photo storage for wedshare
//!
//! Encoded images go through an [`UploadCoordinator`], which names each object
//! (`{prefix}/{uuid}-{sanitized-name}.{ext}`), rejects oversized files before any
//! network call, sends items in sequential chunks and retries failed chunks with
//! the configured [`wed_core::RetryPolicy`].
//!
//! ```text
//! ┌──────────────────────┐
//! │  Submission pipeline │  ← decides what to upload
//! ├──────────────────────┤
//! │  UploadCoordinator   │  ← chunking, retries, per-item outcomes
//! ├──────────────────────┤
//! │  BlobStore           │  ← S3 / in-memory primitives
//! └──────────────────────┘
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod keys;
pub mod memory_store;
pub mod report;
pub mod s3_store;
pub mod store;

pub use config::BlobConfig;
pub use coordinator::{DefaultUploadCoordinator, UploadCoordinator};
pub use error::{BlobError, BlobResult};
pub use keys::{
    content_type_for_extension, corrected_filename, extension_for_content_type, sanitize_filename, BlobKeyStrategy,
    DefaultKeyStrategy,
};
pub use memory_store::MemoryBlobStore;
pub use report::{BatchReport, FailureReason, ItemFailure, ItemOutcome, StoredObject, UploadItem};
pub use s3_store::{S3Config, S3Store};
pub use store::{key_from_public_url, BlobStore, ObjectHead, PutResult};
