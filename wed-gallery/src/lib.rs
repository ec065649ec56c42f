//! # wed-gallery
//!
//! Guests submit wedding photos; admins review them before they appear in the
//! public gallery.
//!
//! ```text
//! POST /api/uploads ─► SubmissionPipeline ─► UploadCoordinator ─► storage
//!                                         └► MetadataRegistrar ─► backend
//! /api/admin/*      ─► SessionGate ─► CSRF ─► ModerationQueue / categories / carousel
//! ```
//!
//! ## Features
//!
//! - `heic`: decode HEIC/HEIF photos (the iPhone default) through libheif.
//!   Needs the system libheif (`libheif-dev` on Debian/Ubuntu, `brew install
//!   libheif` on macOS). Default builds fail HEIC files as an unsupported
//!   format and log a warning at startup.
//!
//! ```text
//! cargo run -p wed-gallery --features heic
//! ```

pub mod app;
pub mod backend;
pub mod carousel;
pub mod categories;
pub mod config;
pub mod models;
pub mod moderation;
pub mod registrar;
pub mod routes;
pub mod state;
pub mod submission;

use wed_axum::AxumApp;

pub use config::GalleryConfig;
pub use state::GalleryState;

pub async fn build() -> anyhow::Result<AxumApp> {
    let (ax, config) = app::gallery_app()?;
    let state = GalleryState::connect(&config).await?;
    Ok(build_with(ax, state))
}

/// Mount every route on `ax` around an already wired state.
pub fn build_with(ax: AxumApp, state: GalleryState) -> AxumApp {
    let api = routes::public::router(state.clone()).nest("/admin", routes::admin::router(state));

    let mut ax = ax.use_router("/api", api).service("/health", || async { "ok" });

    // Add CORS middleware to allow browser requests
    ax.router = ax.router.layer(
        tower_http::cors::CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    ax.traced()
}
