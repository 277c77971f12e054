//! Centralized configuration for filedock.
//!
//! Compile-time defaults for ingestion limits, identity formats and the
//! content loader. Runtime overrides go through `IngestSessionBuilder` and
//! `LoaderOptions`.

use std::time::Duration;

/// Ingestion limits and persisted-state keys.
pub struct IngestConfig;

impl IngestConfig {
    pub const MAX_FILE_SIZE: u64 = 10_485_760; // 10MB
    pub const MAX_FILES: usize = 20;
    pub const ACCEPTED_MIME_TYPES: &'static [&'static str] = &[
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "image/avif",
        "image/bmp",
        "image/svg+xml",
    ];
    pub const MAIN_IMAGE_BACKUP_KEY: &'static str = "filedock.mainImageBackup";
    pub const MAIN_IMAGE_FRESHNESS: Duration = Duration::from_secs(24 * 60 * 60);
}

/// Identity and placeholder formats.
pub struct IdentityConfig;

impl IdentityConfig {
    pub const MAX_ID_LENGTH: usize = 128;
    pub const ID_PREFIX: &'static str = "file";
    pub const NAME_FRAGMENT_LENGTH: usize = 8;
    pub const RANDOM_SUFFIX_LENGTH: usize = 10;
    pub const PLACEHOLDER_PREFIX: &'static str = "placeholder-";
    pub const PLACEHOLDER_SUFFIX: &'static str = "-processing";
    pub const PLACEHOLDER_NAME_FALLBACK: &'static str = "file";
}

/// Content loader tuning.
pub struct LoaderConfig;

impl LoaderConfig {
    pub const READ_CHUNK_SIZE: usize = 65_536;
    pub const DATA_URI_PREFIX: &'static str = "data:";
    pub const BASE64_MARKER: &'static str = ";base64,";
    pub const FALLBACK_MIME_TYPE: &'static str = "application/octet-stream";
}

/// Guess a mime type from a file extension.
pub fn mime_type_for_name(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit_once('.')?.1.to_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" | "jfif" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "heic" => "image/heic",
        "txt" => "text/plain",
        "json" => "application/json",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_for_name() {
        assert_eq!(mime_type_for_name("photo.PNG"), Some("image/png"));
        assert_eq!(mime_type_for_name("a.b.jpeg"), Some("image/jpeg"));
        assert_eq!(mime_type_for_name("noext"), None);
        assert_eq!(mime_type_for_name("archive.zip"), None);
    }

    #[test]
    fn test_limits_are_reasonable() {
        assert!(IngestConfig::MAX_FILE_SIZE > 0);
        assert!(IngestConfig::MAIN_IMAGE_FRESHNESS > Duration::ZERO);
        assert!(IdentityConfig::MAX_ID_LENGTH >= 64);
    }
}
