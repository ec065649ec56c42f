//! Category list cache in front of the backend.

use std::sync::Arc;

use parking_lot::RwLock;
use wed_blob::UploadCoordinator;
use wed_core::{WedError, WedResult};

use crate::backend::GalleryBackend;
use crate::models::Category;

pub struct CategoryResolver {
    backend: Arc<dyn GalleryBackend>,
    cache: RwLock<Vec<Category>>,
}

impl CategoryResolver {
    pub fn new(backend: Arc<dyn GalleryBackend>) -> Self {
        Self {
            backend,
            cache: RwLock::new(Vec::new()),
        }
    }

    /// Last list successfully fetched (empty before the first one).
    pub fn cached(&self) -> Vec<Category> {
        self.cache.read().clone()
    }

    /// Refetch from the backend. A failure keeps the previous list.
    pub async fn refresh(&self) -> WedResult<Vec<Category>> {
        match self.backend.list_categories().await {
            Ok(list) => {
                *self.cache.write() = list.clone();
                Ok(list)
            }
            Err(err) => {
                tracing::warn!(error = %err, cached = self.cache.read().len(), "category refresh failed, keeping cached list");
                Err(err)
            }
        }
    }

    /// Create a category and return the id the backend gave *this* call.
    pub async fn create(&self, name: &str) -> WedResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WedError::bad_request("Category name cannot be empty.").into_anyhow());
        }

        let id = self.backend.create_category(name).await?;
        tracing::info!(category = %id, name, "category created");

        if let Err(err) = self.refresh().await {
            tracing::warn!(error = %err, "category list not refreshed after create");
        }
        Ok(id)
    }

    /// Delete a category together with the stored objects of its images.
    /// Individual storage deletions may fail without stopping the removal.
    pub async fn delete(&self, category_id: &str, storage: &dyn UploadCoordinator) -> WedResult<usize> {
        let category_id = category_id.trim();
        if category_id.is_empty() {
            return Err(WedError::bad_request("Category id is required.").into_anyhow());
        }

        let mut urls: Vec<String> = self
            .backend
            .list_images(category_id)
            .await?
            .into_iter()
            .map(|i| i.url)
            .collect();
        urls.extend(
            self.backend
                .list_unapproved()
                .await?
                .into_iter()
                .filter(|i| i.category_id.as_deref() == Some(category_id))
                .map(|i| i.url),
        );

        let removed = storage.delete_urls(&urls).await;
        if removed < urls.len() {
            tracing::warn!(category = %category_id, removed, total = urls.len(), "some category objects were not deleted");
        }

        self.backend.delete_category(category_id).await?;
        tracing::info!(category = %category_id, objects = removed, "category deleted");

        if let Err(err) = self.refresh().await {
            tracing::warn!(error = %err, "category list not refreshed after delete");
        }
        Ok(removed)
    }
}
