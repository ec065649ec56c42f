use std::sync::Arc;

use wed_auth::{CsrfGuard, SessionManager};
use wed_blob::{BlobStore, DefaultUploadCoordinator, MemoryBlobStore, S3Store, UploadCoordinator};
use wed_core::{WedError, WedResult};
use wed_imaging::Normalizer;

use crate::backend::{GalleryBackend, HttpBackend, MemoryBackend};
use crate::carousel::CarouselManager;
use crate::categories::CategoryResolver;
use crate::config::{BackendMode, GalleryConfig, StorageMode};
use crate::moderation::ModerationDesk;
use crate::registrar::MetadataRegistrar;
use crate::submission::SubmissionPipeline;

/// Everything the handlers share. Cheap to clone.
#[derive(Clone)]
pub struct GalleryState {
    pub backend: Arc<dyn GalleryBackend>,
    pub coordinator: Arc<dyn UploadCoordinator>,
    pub pipeline: Arc<SubmissionPipeline>,
    pub categories: Arc<CategoryResolver>,
    pub moderation: Arc<ModerationDesk>,
    pub carousel: Arc<CarouselManager>,
    pub sessions: Arc<SessionManager>,
    pub csrf: Arc<CsrfGuard>,
    pub form_limit: u64,
}

impl GalleryState {
    /// Wire the services around an existing backend and store.
    pub fn new(config: &GalleryConfig, backend: Arc<dyn GalleryBackend>, store: Arc<dyn BlobStore>) -> WedResult<Self> {
        let coordinator: Arc<dyn UploadCoordinator> = Arc::new(DefaultUploadCoordinator::new(store, config.blob.clone()));
        let registrar = Arc::new(MetadataRegistrar::new(Arc::clone(&backend)));
        let pipeline = Arc::new(SubmissionPipeline::new(
            Normalizer::default(),
            config.transcode.clone(),
            config.max_file_bytes,
            Arc::clone(&coordinator),
            registrar,
        ));
        let sessions = SessionManager::new(config.session.clone()).map_err(|e| WedError::from(e).into_anyhow())?;

        Ok(Self {
            categories: Arc::new(CategoryResolver::new(Arc::clone(&backend))),
            moderation: Arc::new(ModerationDesk::new(
                Arc::clone(&backend),
                Arc::clone(&coordinator),
                config.order,
            )),
            carousel: Arc::new(CarouselManager::new(Arc::clone(&backend), Arc::clone(&pipeline))),
            sessions: Arc::new(sessions),
            csrf: Arc::new(CsrfGuard::new(config.csrf.clone())),
            form_limit: config.form_limit,
            backend,
            coordinator,
            pipeline,
        })
    }

    /// Build the backend and the store selected by the config.
    pub async fn connect(config: &GalleryConfig) -> WedResult<Self> {
        if !wed_imaging::HEIC_SUPPORTED {
            tracing::warn!("built without the `heic` feature, HEIC/HEIF uploads will be refused");
        }
        let backend: Arc<dyn GalleryBackend> = match config.backend_mode {
            BackendMode::Http => Arc::new(HttpBackend::new(config.backend.clone())?),
            BackendMode::Memory => {
                let mut memory = MemoryBackend::new();
                if let Some((user, pass)) = &config.memory_admin {
                    memory = memory.with_admin(user, pass);
                }
                tracing::warn!("using the in-memory backend, records are lost on restart");
                Arc::new(memory)
            }
        };

        let store: Arc<dyn BlobStore> = match config.storage {
            StorageMode::S3 => Arc::new(
                S3Store::connect(config.s3.clone())
                    .await
                    .map_err(|e| WedError::from(e).into_anyhow())?,
            ),
            StorageMode::Memory => {
                tracing::warn!("using in-memory photo storage");
                Arc::new(MemoryBlobStore::new("wedshare"))
            }
        };

        Self::new(config, backend, store)
    }
}
