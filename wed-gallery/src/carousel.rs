//! Homepage carousel: a short list of admin-picked photos.

use std::sync::Arc;

use wed_core::{WedError, WedResult};
use wed_imaging::SourceFile;

use crate::backend::GalleryBackend;
use crate::models::CarouselImage;
use crate::submission::SubmissionPipeline;

pub const CAROUSEL_PREFIX: &str = "carousel_images";

pub struct CarouselManager {
    backend: Arc<dyn GalleryBackend>,
    pipeline: Arc<SubmissionPipeline>,
}

impl CarouselManager {
    pub fn new(backend: Arc<dyn GalleryBackend>, pipeline: Arc<SubmissionPipeline>) -> Self {
        Self { backend, pipeline }
    }

    pub async fn list(&self) -> WedResult<Vec<CarouselImage>> {
        self.backend.list_carousel().await
    }

    /// Register an already stored URL.
    pub async fn add_url(&self, url: &str) -> WedResult<CarouselImage> {
        let url = url.trim();
        if url.is_empty() {
            return Err(WedError::bad_request("An image URL is required.").into_anyhow());
        }
        let id = self.backend.add_carousel(url).await?;
        tracing::info!(carousel = %id, "carousel image added");
        Ok(CarouselImage {
            id,
            url: url.to_string(),
        })
    }

    /// Transcode, store under `carousel_images/`, then register. If the
    /// backend refuses, the stored object is removed again.
    pub async fn add_upload(&self, file: SourceFile) -> WedResult<CarouselImage> {
        let stored = self.pipeline.store_one(CAROUSEL_PREFIX, file).await?;

        match self.backend.add_carousel(&stored.url).await {
            Ok(id) => {
                tracing::info!(carousel = %id, key = %stored.key, "carousel image uploaded");
                Ok(CarouselImage { id, url: stored.url })
            }
            Err(err) => {
                tracing::error!(url = %stored.url, error = %err, "carousel registration failed, removing upload");
                if let Err(cleanup) = self.pipeline.coordinator().delete_url(&stored.url).await {
                    tracing::warn!(url = %stored.url, error = %cleanup, "carousel upload left in storage");
                }
                Err(err)
            }
        }
    }

    /// Remove the stored object (best effort) and the backend entry.
    pub async fn delete(&self, carousel_id: &str) -> WedResult<()> {
        let entries = self.backend.list_carousel().await?;
        let Some(entry) = entries.into_iter().find(|c| c.id == carousel_id) else {
            return Err(WedError::not_found(format!("Carousel image {carousel_id} does not exist.")).into_anyhow());
        };

        if let Err(err) = self.pipeline.coordinator().delete_url(&entry.url).await {
            tracing::warn!(carousel = %carousel_id, url = %entry.url, error = %err, "carousel object not deleted");
        }
        self.backend.delete_carousel(carousel_id).await?;
        tracing::info!(carousel = %carousel_id, "carousel image deleted");
        Ok(())
    }
}
