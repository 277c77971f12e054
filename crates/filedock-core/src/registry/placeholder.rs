//! Placeholder tokens for files whose content is still loading.
//!
//! Grammar: `placeholder-<fileId>-<sanitizedFileName>-<timestampMillis>-processing`.
//! The file name is sanitized to exclude `-`, so the last two separators
//! always delimit the name and the timestamp even when the id contains `-`.
//! Other layers may test tokens with [`is_placeholder`] but should not build
//! them by hand.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::IdentityConfig;

/// Decoded parts of a placeholder token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderParts {
    pub file_id: String,
    /// The sanitized name as embedded in the token.
    pub file_name: String,
    pub timestamp: i64,
    pub is_processing: bool,
}

/// Sanitize a file name for embedding in a token.
pub fn sanitize_placeholder_name(file_name: &str) -> String {
    let sanitized: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        IdentityConfig::PLACEHOLDER_NAME_FALLBACK.to_string()
    } else {
        sanitized
    }
}

/// Create a placeholder token stamped with the current time.
pub fn create_placeholder(file_id: &str, file_name: &str) -> String {
    create_placeholder_at(file_id, file_name, Utc::now().timestamp_millis())
}

/// Create a placeholder token with an explicit timestamp in milliseconds.
pub fn create_placeholder_at(file_id: &str, file_name: &str, timestamp_millis: i64) -> String {
    format!(
        "{}{}-{}-{}{}",
        IdentityConfig::PLACEHOLDER_PREFIX,
        file_id,
        sanitize_placeholder_name(file_name),
        timestamp_millis.max(0),
        IdentityConfig::PLACEHOLDER_SUFFIX
    )
}

/// Whether `url` is a placeholder token. Does not decode it.
pub fn is_placeholder(url: &str) -> bool {
    let prefix = IdentityConfig::PLACEHOLDER_PREFIX;
    let suffix = IdentityConfig::PLACEHOLDER_SUFFIX;
    url.len() > prefix.len() + suffix.len() && url.starts_with(prefix) && url.ends_with(suffix)
}

/// Decode a placeholder token.
pub fn parse_placeholder(token: &str) -> Option<PlaceholderParts> {
    if !is_placeholder(token) {
        return None;
    }
    let body = token
        .strip_prefix(IdentityConfig::PLACEHOLDER_PREFIX)?
        .strip_suffix(IdentityConfig::PLACEHOLDER_SUFFIX)?;

    let (rest, millis) = body.rsplit_once('-')?;
    if millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let timestamp: i64 = millis.parse().ok()?;

    let (file_id, file_name) = rest.rsplit_once('-')?;
    if file_id.is_empty() || file_name.is_empty() {
        return None;
    }

    Some(PlaceholderParts {
        file_id: file_id.to_string(),
        file_name: file_name.to_string(),
        timestamp,
        is_processing: true,
    })
}

/// Extract the file id from a token, or `""` when it is not a placeholder.
pub fn extract_id(token: &str) -> String {
    parse_placeholder(token)
        .map(|parts| parts.file_id)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::generate_id;

    #[test]
    fn test_round_trip_example() {
        let token = create_placeholder("file-42-ab", "photo.png");
        assert!(is_placeholder(&token));
        assert_eq!(extract_id(&token), "file-42-ab");
    }

    #[test]
    fn test_round_trip_generated_ids() {
        for name in ["photo.png", "my-holiday-pic.jpeg", "", "a-b-c-d", "日本.gif"] {
            let id = generate_id(name);
            let token = create_placeholder(&id, name);
            assert_eq!(extract_id(&token), id, "token {}", token);
        }
    }

    #[test]
    fn test_parse_parts() {
        let token = create_placeholder_at("file-1", "my photo-final.png", 1_700_000_000_123);
        assert_eq!(
            token,
            "placeholder-file-1-my_photo_final.png-1700000000123-processing"
        );
        let parts = parse_placeholder(&token).unwrap();
        assert_eq!(parts.file_id, "file-1");
        assert_eq!(parts.file_name, "my_photo_final.png");
        assert_eq!(parts.timestamp, 1_700_000_000_123);
        assert!(parts.is_processing);
    }

    #[test]
    fn test_recognition_without_decoding() {
        assert!(is_placeholder("placeholder-whatever-processing"));
        assert!(parse_placeholder("placeholder-whatever-processing").is_none());
        assert!(!is_placeholder("placeholder--processing"));
        assert!(!is_placeholder("data:image/png;base64,AAAA"));
        assert!(!is_placeholder("https://example.com/placeholder-x-processing.png"));
    }

    #[test]
    fn test_extract_from_non_placeholder() {
        assert_eq!(extract_id("u1"), "");
        assert_eq!(extract_id("placeholder-abc-x-notanumber-processing"), "");
    }
}
