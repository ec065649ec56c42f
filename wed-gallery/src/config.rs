//! Application settings.
//!
//! The deployment environment uses plain variable names (`WEDDING_ID`,
//! `AWS_S3_BUCKET_NAME`, ...). [`configure`] copies them into dotted keys,
//! fills in defaults, then applies `WEDSHARE__*` overrides.
//! [`GalleryConfig::from_snapshot`] turns the result into typed settings.

use std::time::Duration;

use wed_auth::{CsrfOptions, SessionOptions};
use wed_blob::{BlobConfig, S3Config};
use wed_core::{load_env, RetryPolicy, WedConfig, WedConfigSnapshot, WedError, WedResult};
use wed_imaging::TranscodeOptions;

use crate::backend::BackendSettings;
use crate::moderation::QueueOrder;

/// Environment variable → config key
const ENV_KEYS: &[(&str, &str)] = &[
    ("HTTP_HOST", "http.host"),
    ("HTTP_PORT", "http.port"),
    ("WEDDING_ID", "wedding.id"),
    ("AUTH_KEY", "backend.auth_key"),
    ("API_BACKEND_URL", "backend.url"),
    ("BACKEND_MODE", "backend.mode"),
    ("JWT_SECRET", "session.secret"),
    ("SECURE_COOKIES", "session.secure_cookies"),
    ("AWS_S3_REGION", "s3.region"),
    ("AWS_S3_BUCKET_NAME", "s3.bucket"),
    ("AWS_ACCESS_KEY_ID", "s3.access_key_id"),
    ("AWS_SECRET_ACCESS_KEY", "s3.secret_access_key"),
    ("AWS_S3_ENDPOINT", "s3.endpoint"),
    ("STORAGE_MODE", "storage.mode"),
    ("MODERATION_ORDER", "moderation.order"),
];

const DEFAULTS: &[(&str, &str)] = &[
    ("http.host", "127.0.0.1"),
    ("http.port", "3000"),
    ("backend.mode", "http"),
    ("backend.read_timeout_ms", "10000"),
    ("backend.write_timeout_ms", "15000"),
    ("backend.login_timeout_ms", "5000"),
    ("storage.mode", "s3"),
    ("upload.max_file_bytes", "20971520"),
    ("upload.chunk_size", "1"),
    ("upload.retry_attempts", "3"),
    ("upload.retry_base_ms", "1000"),
    ("upload.timeout_ms", "30000"),
    ("upload.form_limit_bytes", "209715200"),
    ("imaging.max_dimension", "4096"),
    ("imaging.webp_quality", "0.92"),
    ("moderation.order", "oldest"),
    ("session.ttl_secs", "3600"),
    ("session.secure_cookies", "false"),
];

/// Load `.env`-populated variables into `config`.
pub fn configure(config: &mut WedConfig) {
    apply_env(config, |name| std::env::var(name).ok());
    load_env(config, "WEDSHARE");
}

pub fn apply_env<F>(config: &mut WedConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for (var, key) in ENV_KEYS {
        if let Some(value) = lookup(var) {
            config.set(*key, value);
        }
    }
    for (key, value) in DEFAULTS {
        config.set_default(*key, *value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    S3,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Http,
    Memory,
}

fn mode(value: Option<&str>, key: &str) -> WedResult<bool> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("http") | Some("s3") => Ok(false),
        Some("memory") => Ok(true),
        Some(other) => Err(WedError::bad_request(format!("{key}: unknown mode {other}")).into_anyhow()),
    }
}

#[derive(Debug, Clone)]
pub struct GalleryConfig {
    pub storage: StorageMode,
    pub s3: S3Config,
    pub backend_mode: BackendMode,
    pub backend: BackendSettings,
    pub blob: BlobConfig,
    pub transcode: TranscodeOptions,
    pub max_file_bytes: u64,
    pub form_limit: u64,
    pub session: SessionOptions,
    pub csrf: CsrfOptions,
    pub order: QueueOrder,
    /// Seeded admin for the in-memory backend
    pub memory_admin: Option<(String, String)>,
}

impl GalleryConfig {
    pub fn from_snapshot(snap: &WedConfigSnapshot) -> WedResult<Self> {
        let storage = if mode(snap.get("storage.mode"), "STORAGE_MODE")? {
            StorageMode::Memory
        } else {
            StorageMode::S3
        };
        let backend_mode = if mode(snap.get("backend.mode"), "BACKEND_MODE")? {
            BackendMode::Memory
        } else {
            BackendMode::Http
        };

        let retry = RetryPolicy::new(
            snap.get_u64("upload.retry_attempts").unwrap_or(3) as u32,
            snap.get_duration_ms("upload.retry_base_ms").unwrap_or(Duration::from_secs(1)),
        );
        let max_file_bytes = snap.get_u64("upload.max_file_bytes").unwrap_or(20 * 1024 * 1024);

        let blob = BlobConfig::new()
            .with_max_blob_bytes(max_file_bytes)
            .with_chunk_size(snap.get_usize("upload.chunk_size").unwrap_or(1))
            .with_retry(retry.clone())
            .with_request_timeout(snap.get_duration_ms("upload.timeout_ms").unwrap_or(Duration::from_secs(30)));

        let mut transcode = TranscodeOptions::default();
        if let Some(max) = snap.get_u64("imaging.max_dimension") {
            transcode = transcode.with_max_dimension(max as u32);
        }
        if let Some(quality) = snap.get_f32("imaging.webp_quality") {
            transcode = transcode.with_webp_quality(quality);
        }

        let backend = BackendSettings {
            base_url: snap.get_non_empty("backend.url").unwrap_or_default(),
            wedding_id: snap.get_non_empty("wedding.id").unwrap_or_default(),
            auth_key: snap.get_non_empty("backend.auth_key").unwrap_or_default(),
            read_timeout: snap.get_duration_ms("backend.read_timeout_ms").unwrap_or(Duration::from_secs(10)),
            write_timeout: snap.get_duration_ms("backend.write_timeout_ms").unwrap_or(Duration::from_secs(15)),
            login_timeout: snap.get_duration_ms("backend.login_timeout_ms").unwrap_or(Duration::from_secs(5)),
            retry,
        };

        let s3 = S3Config {
            bucket: snap.get_non_empty("s3.bucket").unwrap_or_default(),
            region: snap.get_non_empty("s3.region").unwrap_or_default(),
            access_key_id: snap.get_non_empty("s3.access_key_id").unwrap_or_default(),
            secret_access_key: snap.get_non_empty("s3.secret_access_key").unwrap_or_default(),
            endpoint_url: snap.get_non_empty("s3.endpoint"),
        };

        let secure = snap.get_bool("session.secure_cookies").unwrap_or(false);
        let mut secret = snap.get_non_empty("session.secret").unwrap_or_default();
        if secret.is_empty() && backend_mode == BackendMode::Memory {
            tracing::warn!("JWT_SECRET not set, using a random secret for this process");
            secret = format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple());
        }
        let session = SessionOptions::default()
            .with_secret(secret)
            .with_ttl(Duration::from_secs(snap.get_u64("session.ttl_secs").unwrap_or(3600)))
            .with_secure_cookies(secure);
        let csrf = CsrfOptions {
            secure_cookies: secure,
            ..CsrfOptions::default()
        };

        let order = snap
            .get("moderation.order")
            .unwrap_or_default()
            .parse::<QueueOrder>()
            .map_err(|e| WedError::bad_request(e).into_anyhow())?;

        let memory_admin = match (snap.get_non_empty("admin.username"), snap.get_non_empty("admin.password")) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        };

        let config = Self {
            storage,
            s3,
            backend_mode,
            backend,
            blob,
            transcode,
            max_file_bytes,
            form_limit: snap.get_u64("upload.form_limit_bytes").unwrap_or(200 * 1024 * 1024),
            session,
            csrf,
            order,
            memory_admin,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> WedResult<()> {
        self.session.validate().map_err(|e| WedError::from(e).into_anyhow())?;

        if self.backend_mode == BackendMode::Http {
            for (name, value) in [
                ("API_BACKEND_URL", &self.backend.base_url),
                ("WEDDING_ID", &self.backend.wedding_id),
                ("AUTH_KEY", &self.backend.auth_key),
            ] {
                if value.is_empty() {
                    return Err(WedError::bad_request(format!("{name} is required")).into_anyhow());
                }
            }
        }
        if self.storage == StorageMode::S3 {
            self.s3.validate().map_err(|e| WedError::from(e).into_anyhow())?;
        }
        Ok(())
    }
}
