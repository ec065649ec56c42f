//! Registers stored photo URLs with the backend.

use std::sync::Arc;

use serde_json::json;
use wed_core::{WedError, WedResult};

use crate::backend::GalleryBackend;

pub struct MetadataRegistrar {
    backend: Arc<dyn GalleryBackend>,
}

impl MetadataRegistrar {
    pub fn new(backend: Arc<dyn GalleryBackend>) -> Self {
        Self { backend }
    }

    /// Guest submissions: registered unapproved.
    pub async fn register(&self, urls: &[String], category_id: &str) -> WedResult<usize> {
        self.register_with(urls, category_id, false).await
    }

    /// Admin uploads: registered already approved.
    pub async fn register_approved(&self, urls: &[String], category_id: &str) -> WedResult<usize> {
        self.register_with(urls, category_id, true).await
    }

    /// One backend call. On failure the objects stay in storage; the error
    /// carries their URLs so the caller can clean them up.
    pub async fn register_with(&self, urls: &[String], category_id: &str, approved: bool) -> WedResult<usize> {
        let category_id = category_id.trim();
        if category_id.is_empty() {
            return Err(WedError::bad_request("Please select a category.").into_anyhow());
        }
        if urls.is_empty() {
            return Err(WedError::bad_request("No uploaded photos to register.").into_anyhow());
        }

        match self.backend.add_images(urls, category_id, approved).await {
            Ok(created) => {
                tracing::info!(category = %category_id, created, approved, "images registered");
                Ok(created)
            }
            Err(err) => {
                tracing::error!(category = %category_id, count = urls.len(), error = %err, "image registration failed");
                Err(WedError::backend_consistency(
                    "Photos were saved to storage but could not be registered. Please try again.",
                )
                .with_data(json!({ "categoryId": category_id, "orphanedUrls": urls }))
                .with_source(err)
                .into_anyhow())
            }
        }
    }
}
