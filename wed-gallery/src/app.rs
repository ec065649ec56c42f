use anyhow::Result;
use wed_axum::{axum, AxumApp};
use wed_core::WedConfig;

use crate::config::{self, GalleryConfig};

pub fn gallery_app() -> Result<(AxumApp, GalleryConfig)> {
    let mut wed_config = WedConfig::new();

    // Environment, defaults, then WEDSHARE__* overrides
    config::configure(&mut wed_config);

    let gallery = GalleryConfig::from_snapshot(&wed_config.snapshot())?;
    let ax = axum(&wed_config);
    Ok((ax, gallery))
}
