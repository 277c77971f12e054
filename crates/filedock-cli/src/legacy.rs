//! Legacy state file input.
//!
//! The file mirrors what presentation code used to hold:
//! `{"urls": [...], "names": [...], "mainImage": "..."}`. Every field is
//! optional.

use anyhow::{Context, Result};
use filedock_core::LegacyArrays;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyStateFile {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub main_image: Option<String>,
}

impl LegacyStateFile {
    pub fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read legacy state {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse legacy state {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn arrays(&self) -> LegacyArrays {
        LegacyArrays::new(self.urls.clone(), self.names.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let state = LegacyStateFile::parse(
            r#"{"urls": ["u1", "u2"], "names": ["a.png"], "mainImage": "u2"}"#,
        )
        .unwrap();
        assert_eq!(state.arrays().len(), 2);
        assert_eq!(state.main_image.as_deref(), Some("u2"));
    }

    #[test]
    fn test_parse_empty_object() {
        let state = LegacyStateFile::parse("{}").unwrap();
        assert!(state.arrays().is_empty());
        assert!(state.main_image.is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(LegacyStateFile::parse("[1, 2]").is_err());
    }
}
