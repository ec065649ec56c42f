//! # Configuration
//!
//! A minimal string key/value store. Applications layer environment
//! variables, `.env` files and defaults on top of it, then take a
//! [`WedConfigSnapshot`] and read typed values out of it.
//!
//! ```rust
//! use wed_core::WedConfig;
//! let mut config = WedConfig::new();
//!
//! config.set("upload.max_file_bytes", "20971520");
//! config.set("moderation.order", "oldest");
//!
//! let snap = config.snapshot();
//! assert_eq!(snap.get_usize("upload.max_file_bytes"), Some(20 * 1024 * 1024));
//! ```
//!
//! ## Environment overrides
//! [`load_env`] copies every variable carrying a prefix into the store:
//!
//! ```bash
//! export WEDSHARE__UPLOAD__CHUNK_SIZE=2   # → upload.chunk_size = "2"
//! ```

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct WedConfig {
    values: HashMap<String, String>,
}

impl WedConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Set a key only when it has no value yet.
    pub fn set_default<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Check whether a key is present.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn snapshot(&self) -> WedConfigSnapshot {
        WedConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct WedConfigSnapshot {
    map: HashMap<String, String>,
}

impl WedConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    /// Trimmed, non-empty string value.
    pub fn get_non_empty(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.trim().parse::<usize>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_f32(&self, key: &str) -> Option<f32> {
        self.get(key).and_then(|v| v.trim().parse::<f32>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
    }

    /// Value interpreted as milliseconds.
    pub fn get_duration_ms(&self, key: &str) -> Option<Duration> {
        self.get_u64(key).map(Duration::from_millis)
    }
}

/// Copy `PREFIX` environment variables into the store:
/// `WEDSHARE__UPLOAD__CHUNK_SIZE` → `upload.chunk_size`.
pub fn load_env(config: &mut WedConfig, prefix: &str) {
    load_from(config, prefix, std::env::vars());
}

fn load_from<I>(config: &mut WedConfig, prefix: &str, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        if let Some(stripped) = key.strip_prefix(prefix) {
            let normalized = stripped
                .trim_start_matches("__")
                .to_lowercase()
                .replace("__", ".");
            if !normalized.is_empty() {
                config.set(normalized, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_vars_become_dotted_keys() {
        let mut config = WedConfig::new();
        load_from(
            &mut config,
            "WEDSHARE",
            vec![
                ("WEDSHARE__UPLOAD__CHUNK_SIZE".to_string(), "2".to_string()),
                ("WEDSHARE__MODERATION__ORDER".to_string(), "newest".to_string()),
                ("PATH".to_string(), "/usr/bin".to_string()),
            ],
        );

        assert_eq!(config.get("upload.chunk_size"), Some("2"));
        assert_eq!(config.get("moderation.order"), Some("newest"));
        assert!(!config.has("path"));
    }

    #[test]
    fn set_default_keeps_existing_value() {
        let mut config = WedConfig::new();
        config.set("http.port", "8080");
        config.set_default("http.port", "3000");
        config.set_default("http.host", "127.0.0.1");

        assert_eq!(config.get("http.port"), Some("8080"));
        assert_eq!(config.get("http.host"), Some("127.0.0.1"));
    }

    #[test]
    fn snapshot_parses_typed_values() {
        let mut config = WedConfig::new();
        config.set("a", " 42 ");
        config.set("b", "yes");
        config.set("c", "0.92");
        config.set("d", "1500");
        config.set("e", "   ");

        let snap = config.snapshot();
        assert_eq!(snap.get_usize("a"), Some(42));
        assert_eq!(snap.get_bool("b"), Some(true));
        assert_eq!(snap.get_f32("c"), Some(0.92));
        assert_eq!(snap.get_duration_ms("d"), Some(Duration::from_millis(1500)));
        assert_eq!(snap.get_non_empty("e"), None);
        assert_eq!(snap.get_bool("missing"), None);
    }
}
