//! In-process backend for local runs (`BACKEND_MODE=memory`) and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use wed_auth::AdminIdentity;
use wed_core::{ErrorKind, WedError, WedResult};

use super::GalleryBackend;
use crate::models::{CarouselImage, Category, GalleryImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    ListCategories,
    CreateCategory,
    DeleteCategory,
    AddImages,
    ListImages,
    ListAllImages,
    ListUnapproved,
    Decide,
    ListCarousel,
    AddCarousel,
    DeleteCarousel,
    Login,
}

#[derive(Default)]
struct Data {
    next_id: u64,
    last_created: Option<DateTime<Utc>>,
    categories: Vec<Category>,
    images: Vec<GalleryImage>,
    carousel: Vec<CarouselImage>,
    admins: HashMap<String, (String, AdminIdentity)>,
}

impl Data {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    /// Strictly increasing creation times, even within one clock tick.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_created {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_created = Some(ts);
        ts
    }
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<Mutex<Data>>,
    faults: Arc<Mutex<HashMap<BackendOp, (usize, ErrorKind)>>>,
    calls: Arc<Mutex<HashMap<BackendOp, usize>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_admin(self, username: &str, password: &str) -> Self {
        {
            let mut data = self.data.lock();
            let id = data.next_id();
            data.admins.insert(
                username.to_string(),
                (
                    password.to_string(),
                    AdminIdentity {
                        id,
                        username: username.to_string(),
                    },
                ),
            );
        }
        self
    }

    /// Make the next `times` calls of `op` fail with `kind`.
    pub fn fail_next(&self, op: BackendOp, times: usize, kind: ErrorKind) {
        self.faults.lock().insert(op, (times, kind));
    }

    /// Calls received for `op`, including failed ones.
    pub fn calls(&self, op: BackendOp) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    pub fn seed_category(&self, name: &str) -> String {
        let mut data = self.data.lock();
        let id = data.next_id();
        data.categories.push(Category {
            id: id.clone(),
            name: name.to_string(),
        });
        id
    }

    pub fn seed_image(&self, url: &str, category_id: &str, approved: bool) -> String {
        let mut data = self.data.lock();
        let id = data.next_id();
        let created_at = data.next_timestamp();
        data.images.push(GalleryImage {
            id: id.clone(),
            url: url.to_string(),
            category_id: Some(category_id.to_string()),
            approved,
            created_at: Some(created_at),
        });
        id
    }

    /// Every image record, approved or not.
    pub fn images(&self) -> Vec<GalleryImage> {
        self.data.lock().images.clone()
    }

    pub fn image(&self, id: &str) -> Option<GalleryImage> {
        self.data.lock().images.iter().find(|i| i.id == id).cloned()
    }

    fn enter(&self, op: BackendOp) -> WedResult<()> {
        *self.calls.lock().entry(op).or_default() += 1;

        let mut faults = self.faults.lock();
        if let Some((remaining, kind)) = faults.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                let kind = *kind;
                tracing::debug!(?op, ?kind, "injected backend failure");
                return Err(WedError::new(kind, format!("injected {op:?} failure")).into_anyhow());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GalleryBackend for MemoryBackend {
    async fn list_categories(&self) -> WedResult<Vec<Category>> {
        self.enter(BackendOp::ListCategories)?;
        Ok(self.data.lock().categories.clone())
    }

    async fn create_category(&self, name: &str) -> WedResult<String> {
        self.enter(BackendOp::CreateCategory)?;
        Ok(self.seed_category(name))
    }

    async fn delete_category(&self, category_id: &str) -> WedResult<()> {
        self.enter(BackendOp::DeleteCategory)?;
        let mut data = self.data.lock();
        let before = data.categories.len();
        data.categories.retain(|c| c.id != category_id);
        if data.categories.len() == before {
            return Err(WedError::not_found(format!("Category {category_id} does not exist.")).into_anyhow());
        }
        data.images.retain(|i| i.category_id.as_deref() != Some(category_id));
        Ok(())
    }

    async fn add_images(&self, urls: &[String], category_id: &str, approved: bool) -> WedResult<usize> {
        self.enter(BackendOp::AddImages)?;
        for url in urls {
            self.seed_image(url, category_id, approved);
        }
        Ok(urls.len())
    }

    async fn list_images(&self, category_id: &str) -> WedResult<Vec<GalleryImage>> {
        self.enter(BackendOp::ListImages)?;
        Ok(self
            .data
            .lock()
            .images
            .iter()
            .filter(|i| i.approved && i.category_id.as_deref() == Some(category_id))
            .cloned()
            .collect())
    }

    async fn list_all_images(&self) -> WedResult<Vec<GalleryImage>> {
        self.enter(BackendOp::ListAllImages)?;
        Ok(self.data.lock().images.iter().filter(|i| i.approved).cloned().collect())
    }

    async fn list_unapproved(&self) -> WedResult<Vec<GalleryImage>> {
        self.enter(BackendOp::ListUnapproved)?;
        Ok(self.data.lock().images.iter().filter(|i| !i.approved).cloned().collect())
    }

    async fn decide(&self, image_id: &str, approve: bool) -> WedResult<()> {
        self.enter(BackendOp::Decide)?;
        let mut data = self.data.lock();
        let Some(pos) = data.images.iter().position(|i| i.id == image_id) else {
            return Err(WedError::not_found(format!("Image {image_id} does not exist.")).into_anyhow());
        };
        if approve {
            data.images[pos].approved = true;
        } else {
            data.images.remove(pos);
        }
        Ok(())
    }

    async fn list_carousel(&self) -> WedResult<Vec<CarouselImage>> {
        self.enter(BackendOp::ListCarousel)?;
        Ok(self.data.lock().carousel.clone())
    }

    async fn add_carousel(&self, url: &str) -> WedResult<String> {
        self.enter(BackendOp::AddCarousel)?;
        let mut data = self.data.lock();
        let id = data.next_id();
        data.carousel.push(CarouselImage {
            id: id.clone(),
            url: url.to_string(),
        });
        Ok(id)
    }

    async fn delete_carousel(&self, carousel_id: &str) -> WedResult<()> {
        self.enter(BackendOp::DeleteCarousel)?;
        let mut data = self.data.lock();
        let before = data.carousel.len();
        data.carousel.retain(|c| c.id != carousel_id);
        if data.carousel.len() == before {
            return Err(WedError::not_found(format!("Carousel image {carousel_id} does not exist.")).into_anyhow());
        }
        Ok(())
    }

    async fn admin_login(&self, username: &str, password: &str) -> WedResult<Option<AdminIdentity>> {
        self.enter(BackendOp::Login)?;
        Ok(self
            .data
            .lock()
            .admins
            .get(username)
            .filter(|(expected, _)| expected == password)
            .map(|(_, admin)| admin.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reject_removes_and_approve_publishes() {
        let backend = MemoryBackend::new();
        let cat = backend.seed_category("Party");
        let a = backend.seed_image("https://b/a.webp", &cat, false);
        let b = backend.seed_image("https://b/b.webp", &cat, false);

        backend.decide(&a, true).await.unwrap();
        backend.decide(&b, false).await.unwrap();

        let public = backend.list_images(&cat).await.unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].id, a);
        assert!(backend.image(&b).is_none());
        assert!(backend.list_unapproved().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_faults_are_consumed() {
        let backend = MemoryBackend::new();
        backend.fail_next(BackendOp::ListCategories, 1, ErrorKind::Unavailable);

        let err = backend.list_categories().await.unwrap_err();
        assert_eq!(WedError::kind_of(&err), Some(ErrorKind::Unavailable));
        assert!(backend.list_categories().await.is_ok());
        assert_eq!(backend.calls(BackendOp::ListCategories), 2);
    }

    #[test]
    fn creation_times_are_strictly_increasing() {
        let backend = MemoryBackend::new();
        let cat = backend.seed_category("c");
        for n in 0..20 {
            backend.seed_image(&format!("https://b/{n}.webp"), &cat, false);
        }
        let images = backend.images();
        assert!(images.windows(2).all(|w| w[0].created_at < w[1].created_at));
    }

    #[tokio::test]
    async fn login_checks_password() {
        let backend = MemoryBackend::new().with_admin("couple", "forever");
        assert!(backend.admin_login("couple", "forever").await.unwrap().is_some());
        assert!(backend.admin_login("couple", "nope").await.unwrap().is_none());
        assert!(backend.admin_login("guest", "forever").await.unwrap().is_none());
    }
}
