//! Object key generation: `{prefix}/{uuid}-{sanitized-stem}.{ext}`.

use uuid::Uuid;

/// Strategy for generating object keys
pub trait BlobKeyStrategy: Send + Sync {
    /// Generate a unique key for an object under `prefix`.
    fn object_key(&self, prefix: &str, filename: &str, content_type: &str) -> String;
}

/// Default key strategy: `{prefix}/{uuid}-{stem}.{ext}`
#[derive(Debug, Clone, Default)]
pub struct DefaultKeyStrategy;

impl BlobKeyStrategy for DefaultKeyStrategy {
    fn object_key(&self, prefix: &str, filename: &str, content_type: &str) -> String {
        let name = corrected_filename(filename, content_type);
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{}-{}", Uuid::new_v4(), name)
        } else {
            format!("{}/{}-{}", prefix, Uuid::new_v4(), name)
        }
    }
}

/// Replace every character outside `[A-Za-z0-9.-]` with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// File extension for an encoded image content type.
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/webp" => Some("webp"),
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        "image/heif" => Some("heif"),
        "image/avif" => Some("avif"),
        _ => None,
    }
}

/// Content type for a file extension, the inverse of [`extension_for_content_type`].
pub fn content_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "webp" => Some("image/webp"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "avif" => Some("image/avif"),
        _ => None,
    }
}

/// Sanitized filename whose extension matches the encoded content type.
///
/// A misleading or missing extension is replaced; unknown content types keep
/// the original (sanitized) extension.
pub fn corrected_filename(filename: &str, content_type: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (stem, original_ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => (stem, Some(ext)),
        _ => (base, None),
    };

    let mut stem = sanitize_filename(stem.trim_end_matches('.'));
    if stem.trim_matches(['_', '.']).is_empty() {
        stem = "image".to_string();
    }

    let ext = match extension_for_content_type(content_type) {
        Some(ext) => ext.to_string(),
        None => original_ext
            .map(|e| sanitize_filename(&e.to_ascii_lowercase()))
            .unwrap_or_else(|| "bin".to_string()),
    };

    format!("{stem}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_restricts_character_set() {
        assert_eq!(sanitize_filename("Our Day (1).jpg"), "Our_Day__1_.jpg");
        assert_eq!(sanitize_filename("émilie&co.png"), "_milie_co.png");
        assert_eq!(sanitize_filename("ok-name.v2.png"), "ok-name.v2.png");
    }

    #[test]
    fn extension_follows_encoded_type() {
        assert_eq!(corrected_filename("IMG_0001.HEIC", "image/webp"), "IMG_0001.webp");
        assert_eq!(corrected_filename("photo.jpeg", "image/png"), "photo.png");
        assert_eq!(corrected_filename("no_extension", "image/webp"), "no_extension.webp");
        assert_eq!(corrected_filename("scan.tiff", "application/octet-stream"), "scan.tiff");
        assert_eq!(corrected_filename("C:\\Users\\me\\dance floor.jpg", "image/jpeg"), "dance_floor.jpg");
    }

    #[test]
    fn empty_stems_get_a_placeholder() {
        assert_eq!(corrected_filename(".webp", "image/webp"), "image.webp");
        assert_eq!(corrected_filename("???.png", "image/png"), "image.png");
    }

    #[test]
    fn keys_are_prefixed_and_unique() {
        let strategy = DefaultKeyStrategy;
        let a = strategy.object_key("user_images/", "first dance.heic", "image/webp");
        let b = strategy.object_key("user_images", "first dance.heic", "image/webp");

        assert!(a.starts_with("user_images/"));
        assert!(a.ends_with("-first_dance.webp"));
        assert_ne!(a, b);

        let uuid_part = &a["user_images/".len().."user_images/".len() + 36];
        assert!(Uuid::parse_str(uuid_part).is_ok());
    }

    #[test]
    fn content_type_lookup_is_symmetric() {
        for ext in ["webp", "png", "jpg", "gif"] {
            let ct = content_type_for_extension(ext).unwrap();
            assert_eq!(extension_for_content_type(ct), Some(ext));
        }
        assert_eq!(extension_for_content_type("image/jpeg; charset=binary"), Some("jpg"));
    }
}
