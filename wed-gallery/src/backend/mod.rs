//! The metadata backend: categories, guest images, carousel and admin login.
//!
//! [`HttpBackend`] talks to the wedding REST API; [`MemoryBackend`] keeps the
//! same records in process for local runs and tests.

mod http;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use wed_auth::{AdminAuthenticator, AdminIdentity};
use wed_core::WedResult;

use crate::models::{CarouselImage, Category, GalleryImage};

pub use http::{BackendSettings, HttpBackend};
pub use memory::{BackendOp, MemoryBackend};

#[async_trait]
pub trait GalleryBackend: Send + Sync {
    async fn list_categories(&self) -> WedResult<Vec<Category>>;

    /// Returns the id of the category created by this call.
    async fn create_category(&self, name: &str) -> WedResult<String>;

    async fn delete_category(&self, category_id: &str) -> WedResult<()>;

    /// Register stored URLs against a category; returns how many records were created.
    async fn add_images(&self, urls: &[String], category_id: &str, approved: bool) -> WedResult<usize>;

    /// Approved images of one category.
    async fn list_images(&self, category_id: &str) -> WedResult<Vec<GalleryImage>>;

    /// Approved images of every category.
    async fn list_all_images(&self) -> WedResult<Vec<GalleryImage>>;

    async fn list_unapproved(&self) -> WedResult<Vec<GalleryImage>>;

    /// Approve keeps the record and makes it public; reject removes it.
    async fn decide(&self, image_id: &str, approve: bool) -> WedResult<()>;

    async fn list_carousel(&self) -> WedResult<Vec<CarouselImage>>;

    /// Returns the id of the new carousel entry.
    async fn add_carousel(&self, url: &str) -> WedResult<String>;

    async fn delete_carousel(&self, carousel_id: &str) -> WedResult<()>;

    /// `Ok(None)` when the credentials were rejected.
    async fn admin_login(&self, username: &str, password: &str) -> WedResult<Option<AdminIdentity>>;
}

/// Admin credentials are owned by the backend.
pub struct BackendAuthenticator(pub Arc<dyn GalleryBackend>);

#[async_trait]
impl AdminAuthenticator for BackendAuthenticator {
    async fn authenticate(&self, username: &str, password: &str) -> anyhow::Result<Option<AdminIdentity>> {
        self.0.admin_login(username, password).await
    }
}
