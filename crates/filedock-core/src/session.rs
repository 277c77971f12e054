//! Ingest session: one store, one main image, one loader, one key-value handle.
//!
//! A session is the unit embedding applications create per form or view.
//! All store and registry mutations happen under a single lock, so each is
//! atomic with respect to the others; loader callbacks take the same lock
//! when they land. Nothing here is process-global.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::bridge::{recover_main_image, LegacyBridge, MainImage, MainImageBackup, MergeReport};
use crate::config::IngestConfig;
use crate::entry::{FileEntry, FileEntryPatch, FileStatus};
use crate::error::{IngestError, Result};
use crate::kv::{KeyValueStore, MemoryKeyValueStore};
use crate::loader::{
    ContentLoader, FileSource, LoadCallbacks, LoadHandle, LoadedContent, LoaderOptions,
};
use crate::registry::{create_placeholder, generate_id, RegistryStats};
use crate::store::{FileStore, LegacyArrays, StatusMap, StoreObserver, SubscriptionId};

/// Result of submitting one file.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The file was added with a placeholder and its load has started.
    Accepted { file_id: String, file_name: String },
    /// The file failed validation and was not added.
    Rejected { file_name: String, error: IngestError },
}

impl SubmitOutcome {
    pub fn file_id(&self) -> Option<&str> {
        match self {
            SubmitOutcome::Accepted { file_id, .. } => Some(file_id),
            SubmitOutcome::Rejected { .. } => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted { .. })
    }
}

/// Everything presentation code reads, taken under one lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub urls: Vec<String>,
    pub names: Vec<String>,
    pub main_image: String,
    pub uploading: BTreeMap<String, u8>,
    pub upload_status: BTreeMap<String, String>,
}

/// Builder for configuring an [`IngestSession`].
///
/// # Example
///
/// ```rust,ignore
/// use filedock_core::{IngestSession, LegacyArrays};
///
/// let session = IngestSession::builder()
///     .legacy_state(LegacyArrays::new(urls, names))
///     .max_concurrent_loads(Some(4))
///     .build()?;
/// ```
pub struct IngestSessionBuilder {
    legacy_state: Option<LegacyArrays>,
    legacy_main_image: Option<String>,
    key_value_store: Option<Arc<dyn KeyValueStore>>,
    max_file_size: u64,
    max_files: usize,
    max_concurrent_loads: Option<usize>,
    main_image_freshness: Duration,
    runtime: Option<Handle>,
}

impl Default for IngestSessionBuilder {
    fn default() -> Self {
        Self {
            legacy_state: None,
            legacy_main_image: None,
            key_value_store: None,
            max_file_size: IngestConfig::MAX_FILE_SIZE,
            max_files: IngestConfig::MAX_FILES,
            max_concurrent_loads: None,
            main_image_freshness: IngestConfig::MAIN_IMAGE_FRESHNESS,
            runtime: None,
        }
    }
}

impl IngestSessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Externally-owned arrays to merge before the session is returned.
    pub fn legacy_state(mut self, arrays: LegacyArrays) -> Self {
        self.legacy_state = Some(arrays);
        self
    }

    /// Main image chosen by the legacy state. Takes precedence over the
    /// persisted backup when it names a merged url.
    pub fn legacy_main_image(mut self, url: impl Into<String>) -> Self {
        self.legacy_main_image = Some(url.into());
        self
    }

    /// Storage for the main-image backup record.
    ///
    /// Default: an in-memory store that lives as long as the session.
    pub fn key_value_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.key_value_store = Some(store);
        self
    }

    /// Default: `IngestConfig::MAX_FILE_SIZE`
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Default: `IngestConfig::MAX_FILES`
    pub fn max_files(mut self, count: usize) -> Self {
        self.max_files = count;
        self
    }

    /// Cap on simultaneous reads. Default: uncapped.
    pub fn max_concurrent_loads(mut self, limit: Option<usize>) -> Self {
        self.max_concurrent_loads = limit;
        self
    }

    /// How old a main-image backup may be and still be recovered.
    ///
    /// Default: `IngestConfig::MAIN_IMAGE_FRESHNESS`
    pub fn main_image_freshness(mut self, window: Duration) -> Self {
        self.main_image_freshness = window;
        self
    }

    /// Runtime that load tasks are spawned on. Default: the current one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Build the session, merging legacy state and recovering the main image.
    pub fn build(self) -> Result<IngestSession> {
        if self.max_files == 0 {
            return Err(IngestError::Config {
                message: "max_files must be at least 1".to_string(),
            });
        }
        if self.max_file_size == 0 {
            return Err(IngestError::Config {
                message: "max_file_size must be at least 1 byte".to_string(),
            });
        }
        if self.max_concurrent_loads == Some(0) {
            return Err(IngestError::Config {
                message: "max_concurrent_loads must be at least 1 when set".to_string(),
            });
        }

        let options = LoaderOptions {
            max_concurrent_loads: self.max_concurrent_loads,
            max_bytes: Some(self.max_file_size),
            ..LoaderOptions::default()
        };
        let loader = match self.runtime {
            Some(handle) => ContentLoader::with_handle(handle, options),
            None => ContentLoader::new(options)?,
        };
        let kv: Arc<dyn KeyValueStore> = match self.key_value_store {
            Some(kv) => kv,
            None => Arc::new(MemoryKeyValueStore::new()),
        };

        let mut state = SessionState {
            store: FileStore::new(),
            main_image: MainImage::new(),
        };

        if let Some(arrays) = &self.legacy_state {
            LegacyBridge::merge(&mut state.store, arrays);
        }
        if let Some(url) = self.legacy_main_image.as_deref().filter(|u| !u.is_empty()) {
            if !state.main_image.set(url, &state.store) {
                warn!("Legacy main image does not match a merged file, ignoring");
            }
        }
        recover_main_image(
            &mut state.main_image,
            &state.store,
            kv.as_ref(),
            self.main_image_freshness,
        );

        info!(
            files = state.store.len(),
            main_image = state.main_image.is_set(),
            "Ingest session ready"
        );

        Ok(IngestSession {
            inner: Arc::new(SessionInner {
                state: Mutex::new(state),
                loads: Mutex::new(HashMap::new()),
                loader,
                kv,
                max_file_size: self.max_file_size,
                max_files: self.max_files,
            }),
        })
    }
}

struct SessionState {
    store: FileStore,
    main_image: MainImage,
}

struct SessionInner {
    state: Mutex<SessionState>,
    loads: Mutex<HashMap<String, Arc<LoadHandle>>>,
    loader: ContentLoader,
    kv: Arc<dyn KeyValueStore>,
    max_file_size: u64,
    max_files: usize,
}

impl SessionInner {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_loads(&self) -> MutexGuard<'_, HashMap<String, Arc<LoadHandle>>> {
        self.loads.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_load(&self, file_id: &str) -> Option<Arc<LoadHandle>> {
        self.lock_loads().remove(file_id)
    }

    /// Clear the main image if its entry is gone, dropping the backup too.
    fn reconcile_main_image(&self, state: &mut SessionState) {
        if state.main_image.reconcile(&state.store) {
            self.remove_backup();
        }
    }

    fn remove_backup(&self) {
        if let Err(e) = MainImageBackup::remove(self.kv.as_ref()) {
            warn!("Failed to remove main image backup: {}", e);
        }
    }

    fn apply_progress(&self, file_id: &str, percent: u8) {
        let mut state = self.lock_state();
        state.store.update(file_id, FileEntryPatch::progress(percent));
    }

    // Terminal updates land before the handle is dropped so `wait_for_loads`
    // never returns ahead of them.
    fn apply_success(&self, content: LoadedContent) {
        let file_id = content.file_id.clone();
        {
            let mut state = self.lock_state();
            if state
                .store
                .update(&file_id, FileEntryPatch::completed(content.data_uri))
            {
                debug!(file_id = %file_id, size = content.size, "File ready");
            } else {
                debug!(file_id = %file_id, "Load finished for a file no longer tracked");
            }
        }
        self.take_load(&file_id);
    }

    fn apply_failure(&self, file_id: &str, error: IngestError) {
        warn!(file_id, kind = ?error.kind(), "File failed to load: {}", error);
        self.lock_state()
            .store
            .update(file_id, FileEntryPatch::status(FileStatus::Error));
        self.take_load(file_id);
    }

    fn cancel_all(&self) -> usize {
        let handles: Vec<Arc<LoadHandle>> = self.lock_loads().drain().map(|(_, h)| h).collect();
        handles.iter().filter(|h| h.cancel()).count()
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let cancelled = self.cancel_all();
        if cancelled > 0 {
            debug!(cancelled, "Cancelled in-flight loads on session drop");
        }
    }
}

/// A file ingestion session.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct IngestSession {
    inner: Arc<SessionInner>,
}

impl IngestSession {
    pub fn builder() -> IngestSessionBuilder {
        IngestSessionBuilder::new()
    }

    /// Create a session with default settings on the current runtime.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Validate and start loading `files`, one outcome per file in order.
    pub fn submit(&self, files: Vec<Arc<dyn FileSource>>) -> Vec<SubmitOutcome> {
        files.into_iter().map(|file| self.submit_one(file)).collect()
    }

    fn submit_one(&self, file: Arc<dyn FileSource>) -> SubmitOutcome {
        let file_name = file.name().to_string();

        let file_id = {
            let mut state = self.inner.lock_state();
            if let Err(error) = self.check_file(file.as_ref(), state.store.len()) {
                debug!(file_name = %file_name, "Rejected file: {}", error);
                return SubmitOutcome::Rejected { file_name, error };
            }

            let candidate = generate_id(&file_name);
            let placeholder = create_placeholder(&candidate, &file_name);
            let file_id = state.store.add(&file_name, &placeholder, Some(&candidate));
            if file_id.is_empty() {
                return SubmitOutcome::Rejected {
                    file_name,
                    error: IngestError::registry(candidate, "file could not be added"),
                };
            }
            file_id
        };

        let weak = Arc::downgrade(&self.inner);
        let callbacks = load_callbacks(weak, file_id.clone());

        // Held across the spawn so a fast load cannot finish before its handle is tracked.
        let mut loads = self.inner.lock_loads();
        let handle = self.inner.loader.load(file, &file_id, callbacks);
        loads.insert(file_id.clone(), Arc::new(handle));
        drop(loads);

        info!(file_id = %file_id, file_name = %file_name, "Started loading file");
        SubmitOutcome::Accepted { file_id, file_name }
    }

    fn check_file(&self, file: &dyn FileSource, current_count: usize) -> Result<()> {
        let name = file.name();
        if name.trim().is_empty() {
            return Err(IngestError::validation("fileName", "file name is empty"));
        }
        match file.mime_type() {
            Some(mime) if IngestConfig::ACCEPTED_MIME_TYPES.contains(&mime) => {}
            Some(mime) => {
                return Err(IngestError::validation(
                    "mimeType",
                    format!("{} has unsupported type {}", name, mime),
                ));
            }
            None => {
                return Err(IngestError::validation(
                    "mimeType",
                    format!("{} has an unknown type", name),
                ));
            }
        }
        if let Some(size) = file.size() {
            if size > self.inner.max_file_size {
                return Err(IngestError::validation(
                    "size",
                    format!(
                        "{} is {} bytes, limit is {}",
                        name, size, self.inner.max_file_size
                    ),
                ));
            }
        }
        if current_count >= self.inner.max_files {
            return Err(IngestError::validation(
                "files",
                format!("session already holds {} files", current_count),
            ));
        }
        Ok(())
    }

    /// Abort an in-flight load and mark the file as failed.
    ///
    /// Returns `false` if the file has no load in flight.
    pub fn cancel(&self, file_id: &str) -> bool {
        let Some(handle) = self.inner.take_load(file_id) else {
            return false;
        };
        if !handle.cancel() {
            return false;
        }
        info!(file_id, "Load aborted");
        let mut state = self.inner.lock_state();
        state
            .store
            .update(file_id, FileEntryPatch::status(FileStatus::Error));
        true
    }

    /// Cancel any in-flight load, then remove the file.
    pub fn remove(&self, file_id: &str) -> bool {
        if let Some(handle) = self.inner.take_load(file_id) {
            handle.cancel();
        }
        let mut state = self.inner.lock_state();
        let removed = state.store.remove(file_id);
        if removed {
            self.inner.reconcile_main_image(&mut state);
        }
        removed
    }

    /// Replace the file order. All-or-nothing.
    pub fn reorder<S: AsRef<str>>(&self, ids: &[S]) -> bool {
        self.inner.lock_state().store.reorder(ids)
    }

    pub fn rename(&self, file_id: &str, file_name: &str) -> bool {
        self.inner
            .lock_state()
            .store
            .update(file_id, FileEntryPatch::rename(file_name))
    }

    /// Cancel every load and remove every file.
    pub fn clear_all(&self) {
        self.inner.cancel_all();
        let mut state = self.inner.lock_state();
        state.store.clear_all();
        self.inner.reconcile_main_image(&mut state);
    }

    /// End the session: cancel loads, drop entries and observers.
    ///
    /// The main-image backup is kept so a later session can recover it.
    pub fn destroy(&self) {
        let cancelled = self.inner.cancel_all();
        let mut state = self.inner.lock_state();
        state.store.destroy();
        state.main_image.clear();
        info!(cancelled, "Ingest session destroyed");
    }

    /// Set the main image and persist a backup. An empty url clears both.
    pub fn set_main_image(&self, url: &str) -> bool {
        let mut state = self.inner.lock_state();
        let state = &mut *state;
        if !state.main_image.set(url, &state.store) {
            return false;
        }
        if url.is_empty() {
            self.inner.remove_backup();
        } else if let Err(e) = MainImageBackup::new(url, Utc::now()).save(self.inner.kv.as_ref()) {
            warn!("Failed to persist main image backup: {}", e);
        }
        true
    }

    pub fn clear_main_image(&self) -> bool {
        self.set_main_image("")
    }

    pub fn main_image(&self) -> String {
        self.inner.lock_state().main_image.get().to_string()
    }

    /// Merge another round of legacy arrays. Idempotent.
    pub fn merge_legacy(&self, arrays: &LegacyArrays) -> MergeReport {
        let mut state = self.inner.lock_state();
        LegacyBridge::merge(&mut state.store, arrays)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.lock_state();
        let StatusMap {
            uploading,
            upload_status,
        } = state.store.status_map();
        SessionSnapshot {
            urls: state.store.urls(),
            names: state.store.names(),
            main_image: state.main_image.get().to_string(),
            uploading,
            upload_status,
        }
    }

    pub fn legacy_arrays(&self) -> LegacyArrays {
        self.inner.lock_state().store.to_legacy_arrays()
    }

    pub fn status_map(&self) -> StatusMap {
        self.inner.lock_state().store.status_map()
    }

    pub fn entries(&self) -> Vec<FileEntry> {
        self.inner.lock_state().store.entries()
    }

    pub fn get(&self, file_id: &str) -> Option<FileEntry> {
        self.inner.lock_state().store.get_by_id(file_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock_state().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn registry_stats(&self) -> RegistryStats {
        self.inner.lock_state().store.registry().stats()
    }

    /// Run `f` with read access to the store.
    pub fn with_store<R>(&self, f: impl FnOnce(&FileStore) -> R) -> R {
        f(&self.inner.lock_state().store)
    }

    /// Register a change observer. Observers run under the session lock and
    /// must not call back into the session.
    pub fn subscribe(&self, observer: Arc<dyn StoreObserver>) -> SubscriptionId {
        self.inner.lock_state().store.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.lock_state().store.unsubscribe(id)
    }

    /// Number of loads still in flight.
    pub fn active_loads(&self) -> usize {
        self.inner
            .lock_loads()
            .values()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Wait until every load started so far has stopped.
    pub async fn wait_for_loads(&self) {
        loop {
            let pending: Vec<Arc<LoadHandle>> =
                self.inner.lock_loads().values().cloned().collect();
            if pending.is_empty() {
                return;
            }
            join_all(pending.iter().map(|handle| handle.finished())).await;
            self.inner.lock_loads().retain(|_, h| !h.is_finished());
        }
    }
}

fn load_callbacks(session: Weak<SessionInner>, file_id: String) -> LoadCallbacks {
    let progress_session = session.clone();
    let progress_id = file_id.clone();
    let success_session = session.clone();

    LoadCallbacks::new(
        move |percent| {
            if let Some(inner) = progress_session.upgrade() {
                inner.apply_progress(&progress_id, percent);
            }
        },
        move |content| {
            if let Some(inner) = success_session.upgrade() {
                inner.apply_success(content);
            }
        },
        move |error| {
            if let Some(inner) = session.upgrade() {
                inner.apply_failure(&file_id, error);
            }
        },
    )
}
