//! `data:` content URIs produced by the loader.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::LoaderConfig;
use crate::error::{IngestError, Result};

/// Encode raw bytes as `data:<mime>;base64,<payload>`.
pub fn encode_data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!(
        "{}{}{}{}",
        LoaderConfig::DATA_URI_PREFIX,
        mime_type,
        LoaderConfig::BASE64_MARKER,
        STANDARD.encode(bytes)
    )
}

/// Mime type declared by a content URI, if it is one.
pub fn data_uri_mime_type(uri: &str) -> Option<&str> {
    let rest = uri.strip_prefix(LoaderConfig::DATA_URI_PREFIX)?;
    let (mime, _) = rest.split_once(LoaderConfig::BASE64_MARKER)?;
    Some(mime)
}

/// Check that a loaded result is a non-empty, correctly tagged content URI.
pub fn validate_data_uri(uri: &str) -> Result<()> {
    if uri.is_empty() {
        return Err(IngestError::validation("content", "content is empty"));
    }
    let Some(rest) = uri.strip_prefix(LoaderConfig::DATA_URI_PREFIX) else {
        return Err(IngestError::validation(
            "content",
            "content is not a data URI",
        ));
    };
    let Some((mime, payload)) = rest.split_once(LoaderConfig::BASE64_MARKER) else {
        return Err(IngestError::validation(
            "content",
            "content URI is not base64 encoded",
        ));
    };
    if mime.is_empty() || !mime.contains('/') {
        return Err(IngestError::validation(
            "content",
            format!("content URI has an invalid mime type '{}'", mime),
        ));
    }
    if payload.is_empty() {
        return Err(IngestError::validation("content", "content payload is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        let uri = encode_data_uri("image/png", b"hello");
        assert_eq!(uri, "data:image/png;base64,aGVsbG8=");
        assert!(validate_data_uri(&uri).is_ok());
        assert_eq!(data_uri_mime_type(&uri), Some("image/png"));
    }

    #[test]
    fn test_rejects_empty_payload() {
        let uri = encode_data_uri("image/png", b"");
        assert!(validate_data_uri(&uri).is_err());
    }

    #[test]
    fn test_rejects_untagged_content() {
        assert!(validate_data_uri("").is_err());
        assert!(validate_data_uri("https://example.com/a.png").is_err());
        assert!(validate_data_uri("data:image/png,plain").is_err());
        assert!(validate_data_uri("data:;base64,AAAA").is_err());
        assert_eq!(data_uri_mime_type("u1"), None);
    }
}
