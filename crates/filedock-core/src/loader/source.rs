//! Raw file handles accepted by the loader.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncRead;

use crate::config::mime_type_for_name;
use crate::error::{IngestError, Result};

/// Boxed async reader returned by [`FileSource::open`].
pub type SourceReader = Box<dyn AsyncRead + Send + Unpin>;

/// A raw file selected by the embedding application.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Display name, usually the file name without directories.
    fn name(&self) -> &str;

    /// Size in bytes, when known up front.
    fn size(&self) -> Option<u64>;

    /// Declared mime type. Defaults to a guess from the name.
    fn mime_type(&self) -> Option<&str> {
        mime_type_for_name(self.name())
    }

    /// Open the content for reading.
    async fn open(&self) -> Result<SourceReader>;
}

/// A file on the local filesystem.
#[derive(Debug, Clone)]
pub struct PathSource {
    path: PathBuf,
    name: String,
    size: Option<u64>,
}

impl PathSource {
    /// Build a source for `path`, reading its size from metadata.
    pub async fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| IngestError::io_with_path(e, &path))?;
        if !metadata.is_file() {
            return Err(IngestError::validation(
                "path",
                format!("{} is not a regular file", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            path,
            name,
            size: Some(metadata.len()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FileSource for PathSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    async fn open(&self) -> Result<SourceReader> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| IngestError::Read {
                file_name: self.name.clone(),
                message: e.to_string(),
            })?;
        Ok(Box::new(file))
    }
}

/// An in-memory file.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    mime_type: Option<String>,
    bytes: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            mime_type: None,
            bytes: Arc::from(bytes.into()),
        }
    }

    /// Override the mime type guessed from the name.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

#[async_trait]
impl FileSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }

    fn mime_type(&self) -> Option<&str> {
        self.mime_type
            .as_deref()
            .or_else(|| mime_type_for_name(&self.name))
    }

    async fn open(&self) -> Result<SourceReader> {
        Ok(Box::new(std::io::Cursor::new(self.bytes.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_memory_source() {
        let source = MemorySource::new("a.png", vec![1u8, 2, 3]);
        assert_eq!(source.size(), Some(3));
        assert_eq!(source.mime_type(), Some("image/png"));

        let mut reader = source.open().await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_memory_source_mime_override() {
        let source = MemorySource::new("blob", vec![1u8]).with_mime_type("image/webp");
        assert_eq!(source.mime_type(), Some("image/webp"));
    }

    #[tokio::test]
    async fn test_path_source() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("photo.jpg");
        std::fs::write(&path, b"abcd").unwrap();

        let source = PathSource::from_path(&path).await.unwrap();
        assert_eq!(source.name(), "photo.jpg");
        assert_eq!(source.size(), Some(4));
        assert_eq!(source.mime_type(), Some("image/jpeg"));
        assert!(source.open().await.is_ok());
    }

    #[tokio::test]
    async fn test_path_source_missing() {
        assert!(PathSource::from_path("/nonexistent/photo.jpg").await.is_err());
    }
}
