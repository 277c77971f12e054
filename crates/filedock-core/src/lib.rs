//! Filedock Core - Headless file ingestion and identity tracking.
//!
//! This crate turns user-selected files into in-memory `data:` content URIs,
//! tracks each file's lifecycle, and keeps that state in sync with the
//! parallel `urls` / `names` arrays that presentation code consumes.
//!
//! - [`store::FileStore`]: insertion-ordered entries with change notifications
//! - [`loader::ContentLoader`]: cancellable async reads with progress
//! - [`registry::IdentityRegistry`]: id, name, url and placeholder lookups
//! - [`bridge::LegacyBridge`]: idempotent merge of legacy arrays
//! - [`session::IngestSession`]: ties the pieces together per form or view
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use filedock_core::{IngestSession, PathSource};
//!
//! #[tokio::main]
//! async fn main() -> filedock_core::Result<()> {
//!     let session = IngestSession::new()?;
//!
//!     let photo = PathSource::from_path("photo.png").await?;
//!     session.submit(vec![Arc::new(photo)]);
//!     session.wait_for_loads().await;
//!
//!     let snapshot = session.snapshot();
//!     println!("{} files ready", snapshot.urls.len());
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod cancel;
pub mod config;
pub mod entry;
pub mod error;
pub mod kv;
pub mod loader;
pub mod registry;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use bridge::{
    recover_main_image, recover_main_image_at, LegacyBridge, MainImage, MainImageBackup,
    MergeReport,
};
pub use cancel::CancellationToken;
pub use config::{IdentityConfig, IngestConfig, LoaderConfig};
pub use entry::{FileEntry, FileEntryPatch, FileStatus};
pub use error::{ErrorKind, IngestError, Result};
pub use kv::{JsonFileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use loader::{
    ContentLoader, FileSource, LoadCallbacks, LoadHandle, LoadState, LoadedContent,
    LoaderOptions, MemorySource, PathSource,
};
pub use registry::{
    create_placeholder, extract_id, generate_id, is_placeholder, validate_id, IdentityMapping,
    IdentityRegistry, RegistryStats,
};
pub use session::{IngestSession, IngestSessionBuilder, SessionSnapshot, SubmitOutcome};
pub use store::{FileStore, LegacyArrays, StatusMap, StoreChange, StoreObserver, SubscriptionId};
