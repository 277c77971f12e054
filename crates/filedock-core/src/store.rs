//! Insertion-ordered file store.
//!
//! The store keeps entries in a keyed map plus an explicit order list; every
//! derived view (`urls`, `names`, legacy arrays) follows the order list, never
//! the map's iteration order. The store owns the [`IdentityRegistry`] and
//! keeps it in lockstep: a registry failure aborts the store mutation.
//!
//! No operation here raises across the public boundary. Unknown ids and
//! rejected inputs are logged and reported as `false` / `""` / `None`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::entry::{FileEntry, FileEntryPatch, FileStatus};
use crate::registry::{generate_id, validate_id, IdentityRegistry};

/// Ordered url/name arrays in the shape presentation code consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyArrays {
    pub urls: Vec<String>,
    pub names: Vec<String>,
}

impl LegacyArrays {
    pub fn new(urls: Vec<String>, names: Vec<String>) -> Self {
        Self { urls, names }
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Per-file upload state for presentation code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMap {
    /// Progress of files still in flight.
    pub uploading: BTreeMap<String, u8>,
    /// `"uploading"`, `"success"` or `"error"` for every file.
    pub upload_status: BTreeMap<String, String>,
}

/// A committed store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Added { id: String },
    Updated { id: String },
    Removed { id: String },
    Reordered,
    Cleared,
}

/// Receives store change notifications.
///
/// Called synchronously after each committed mutation, while the store is
/// still borrowed; implementations must not call back into the store.
pub trait StoreObserver: Send + Sync {
    fn on_store_changed(&self, change: &StoreChange);
}

/// Handle returned by [`FileStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Ordered collection of file entries.
#[derive(Default)]
pub struct FileStore {
    entries: HashMap<String, FileEntry>,
    order: Vec<String>,
    registry: IdentityRegistry,
    observers: Vec<(SubscriptionId, Arc<dyn StoreObserver>)>,
    next_subscription: u64,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file and return its id, or `""` when the input is rejected.
    ///
    /// A caller-supplied id is used only if it passes validation untouched and
    /// is not already present; otherwise a fresh id is generated.
    pub fn add(&mut self, file_name: &str, url: &str, id: Option<&str>) -> String {
        if file_name.trim().is_empty() || url.is_empty() {
            warn!(file_name, "Rejected file with empty name or url");
            return String::new();
        }

        let id = match id {
            Some(candidate)
                if validate_id(candidate).is_clean() && !self.entries.contains_key(candidate) =>
            {
                candidate.to_string()
            }
            Some(candidate) => {
                warn!(candidate, "Caller-supplied id rejected, generating a new one");
                self.fresh_id(file_name)
            }
            None => self.fresh_id(file_name),
        };

        let entry = FileEntry::new(id.clone(), file_name.to_string(), url.to_string(), Utc::now());
        if let Err(e) = self.registry.register(&entry) {
            warn!("Failed to register {}: {}", id, e);
            return String::new();
        }

        debug!(file_id = %id, status = %entry.status, "Added file");
        self.entries.insert(id.clone(), entry);
        self.order.push(id.clone());
        self.notify(StoreChange::Added { id: id.clone() });
        id
    }

    fn fresh_id(&self, file_name: &str) -> String {
        loop {
            let id = generate_id(file_name);
            if !self.entries.contains_key(&id) {
                return id;
            }
        }
    }

    /// Apply a partial update. Returns `false` for unknown ids and rejected
    /// patches (status regressions, placeholder invariant violations).
    pub fn update(&mut self, id: &str, patch: FileEntryPatch) -> bool {
        let Some(current) = self.entries.get(id) else {
            debug!(file_id = %id, "Update for unknown id ignored");
            return false;
        };
        let Some(next) = current.patched(&patch) else {
            debug!(
                file_id = %id,
                status = %current.status,
                "Rejected update {:?}",
                patch
            );
            return false;
        };
        if &next == current {
            return true;
        }
        if let Err(e) = self.registry.update(&next) {
            warn!("Registry rejected update for {}: {}", id, e);
            return false;
        }

        self.entries.insert(id.to_string(), next);
        self.notify(StoreChange::Updated { id: id.to_string() });
        true
    }

    /// Remove an entry. Returns `false` if the id is unknown.
    pub fn remove(&mut self, id: &str) -> bool {
        if !self.entries.contains_key(id) {
            return false;
        }
        if let Err(e) = self.registry.remove(id) {
            warn!("Registry rejected removal of {}: {}", id, e);
            return false;
        }
        self.entries.remove(id);
        self.order.retain(|existing| existing != id);
        debug!(file_id = %id, "Removed file");
        self.notify(StoreChange::Removed { id: id.to_string() });
        true
    }

    /// Remove every entry.
    pub fn clear_all(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.registry.clear();
        self.notify(StoreChange::Cleared);
    }

    /// Clear the store and drop all observers at the end of a session.
    pub fn destroy(&mut self) {
        self.clear_all();
        self.observers.clear();
    }

    /// Replace the order with `ids`.
    ///
    /// All-or-nothing: `ids` must list every entry exactly once. Any unknown,
    /// missing or repeated id leaves the store unchanged and returns `false`.
    pub fn reorder<S: AsRef<str>>(&mut self, ids: &[S]) -> bool {
        if ids.len() != self.order.len() {
            warn!(
                expected = self.order.len(),
                got = ids.len(),
                "Reorder rejected: id count mismatch"
            );
            return false;
        }
        let mut seen = HashSet::with_capacity(ids.len());
        for id in ids {
            let id = id.as_ref();
            if !self.entries.contains_key(id) || !seen.insert(id) {
                warn!(file_id = %id, "Reorder rejected: unknown or repeated id");
                return false;
            }
        }

        let next: Vec<String> = ids.iter().map(|id| id.as_ref().to_string()).collect();
        if next != self.order {
            self.order = next;
            self.notify(StoreChange::Reordered);
        }
        true
    }

    pub fn get_by_id(&self, id: &str) -> Option<&FileEntry> {
        self.entries.get(id)
    }

    /// Entries with `status`, in store order.
    pub fn get_by_status(&self, status: FileStatus) -> Vec<FileEntry> {
        self.iter().filter(|e| e.status == status).cloned().collect()
    }

    /// Entries in store order.
    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn entries(&self) -> Vec<FileEntry> {
        self.iter().cloned().collect()
    }

    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn urls(&self) -> Vec<String> {
        self.iter().map(|e| e.url.clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.iter().map(|e| e.file_name.clone()).collect()
    }

    pub fn to_legacy_arrays(&self) -> LegacyArrays {
        LegacyArrays {
            urls: self.urls(),
            names: self.names(),
        }
    }

    /// Whether any live entry currently has this url.
    pub fn contains_url(&self, url: &str) -> bool {
        if !self.registry.ids_for_url(url).is_empty() {
            return true;
        }
        self.entries.values().any(|e| e.url == url)
    }

    pub fn status_map(&self) -> StatusMap {
        let mut map = StatusMap::default();
        for entry in self.iter() {
            if !entry.status.is_terminal() {
                map.uploading
                    .insert(entry.id.clone(), entry.upload_progress.unwrap_or(0));
            }
            map.upload_status
                .insert(entry.id.clone(), entry.status.upload_label().to_string());
        }
        map
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Register an observer for change notifications.
    pub fn subscribe(&mut self, observer: Arc<dyn StoreObserver>) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.observers.push((id, observer));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() < before
    }

    fn notify(&self, change: StoreChange) {
        for (_, observer) in &self.observers {
            observer.on_store_changed(&change);
        }
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("order", &self.order)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::create_placeholder;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        changes: Mutex<Vec<StoreChange>>,
    }

    impl StoreObserver for Recorder {
        fn on_store_changed(&self, change: &StoreChange) {
            self.changes.lock().unwrap().push(change.clone());
        }
    }

    fn store_with(urls: &[&str]) -> (FileStore, Vec<String>) {
        let mut store = FileStore::new();
        let ids = urls
            .iter()
            .enumerate()
            .map(|(i, url)| store.add(&format!("{}.png", i), url, None))
            .collect();
        (store, ids)
    }

    #[test]
    fn test_add_preserves_call_order() {
        let mut store = FileStore::new();
        store.add("a.png", "u1", None);
        store.add("b.png", "u2", None);
        store.add("c.png", "u3", None);

        assert_eq!(store.urls(), vec!["u1", "u2", "u3"]);
        assert_eq!(store.names(), vec!["a.png", "b.png", "c.png"]);
        assert_eq!(
            store.to_legacy_arrays(),
            LegacyArrays::new(
                vec!["u1".into(), "u2".into(), "u3".into()],
                vec!["a.png".into(), "b.png".into(), "c.png".into()]
            )
        );
    }

    #[test]
    fn test_order_survives_many_adds() {
        let mut store = FileStore::new();
        let urls: Vec<String> = (0..200).map(|i| format!("u{}", i)).collect();
        for url in &urls {
            store.add("x.png", url, None);
        }
        assert_eq!(store.urls(), urls);
    }

    #[test]
    fn test_add_rejects_empty_input() {
        let mut store = FileStore::new();
        assert_eq!(store.add("", "u1", None), "");
        assert_eq!(store.add("  ", "u1", None), "");
        assert_eq!(store.add("a.png", "", None), "");
        assert!(store.is_empty());
    }

    #[test]
    fn test_caller_supplied_id() {
        let mut store = FileStore::new();
        assert_eq!(store.add("a.png", "u1", Some("file-42-ab")), "file-42-ab");

        let duplicate = store.add("b.png", "u2", Some("file-42-ab"));
        assert!(!duplicate.is_empty());
        assert_ne!(duplicate, "file-42-ab");

        let invalid = store.add("c.png", "u3", Some("bad id!"));
        assert!(!invalid.is_empty());
        assert_ne!(invalid, "bad id!");
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_remove() {
        let (mut store, ids) = store_with(&["u1", "u2"]);
        assert!(store.remove(&ids[0]));
        assert!(store.get_by_id(&ids[0]).is_none());
        assert!(store.registry().get_by_id(&ids[0]).is_none());
        assert_eq!(store.urls(), vec!["u2"]);

        assert!(!store.remove("unknown"));
        assert_eq!(store.urls(), vec!["u2"]);
    }

    #[test]
    fn test_update_unknown_id() {
        let mut store = FileStore::new();
        assert!(!store.update("nope", FileEntryPatch::rename("x.png")));
    }

    #[test]
    fn test_status_never_regresses() {
        let mut store = FileStore::new();
        let id = store.add("a.png", &create_placeholder("file-1", "a.png"), Some("file-1"));
        assert!(store.update(&id, FileEntryPatch::progress(10)));
        assert!(store.update(&id, FileEntryPatch::completed("data:image/png;base64,AA==")));

        assert!(!store.update(&id, FileEntryPatch::status(FileStatus::Processing)));
        assert!(!store.update(&id, FileEntryPatch::status(FileStatus::Pending)));
        assert!(!store.update(&id, FileEntryPatch::status(FileStatus::Error)));
        assert_eq!(store.get_by_id(&id).unwrap().status, FileStatus::Completed);
    }

    #[test]
    fn test_registry_follows_updates() {
        let mut store = FileStore::new();
        let token = create_placeholder("file-1", "a.png");
        let id = store.add("a.png", &token, Some("file-1"));
        assert!(store.registry().get_by_url("data:x;base64,AA==").is_none());

        assert!(store.update(&id, FileEntryPatch::completed("data:x;base64,AA==")));
        assert!(store.update(&id, FileEntryPatch::rename("renamed.png")));

        let registry = store.registry();
        assert_eq!(registry.get_by_url("data:x;base64,AA==").unwrap().file_id, id);
        assert_eq!(registry.get_by_name("renamed.png").unwrap().file_id, id);
        assert_eq!(registry.get_by_placeholder(&token).unwrap().file_id, id);
        registry.check_consistency().unwrap();
    }

    #[test]
    fn test_placeholder_swap_is_refused() {
        let mut store = FileStore::new();
        let token = create_placeholder("file-1", "a.png");
        let id = store.add("a.png", &token, Some("file-1"));

        let swap = FileEntryPatch {
            url: Some(create_placeholder("file-1", "other.png")),
            ..Default::default()
        };
        assert!(!store.update(&id, swap));
        assert_eq!(store.get_by_id(&id).unwrap().url, token);
        assert_eq!(store.registry().get_by_placeholder(&token).unwrap().file_id, id);
    }

    #[test]
    fn test_reorder_all_or_nothing() {
        let (mut store, ids) = store_with(&["u1", "u2", "u3"]);

        assert!(!store.reorder(&[ids[2].as_str(), "unknown", ids[0].as_str()]));
        assert_eq!(store.urls(), vec!["u1", "u2", "u3"]);

        assert!(!store.reorder(&[ids[2].as_str(), ids[2].as_str(), ids[0].as_str()]));
        assert!(!store.reorder(&[ids[1].as_str()]));
        assert_eq!(store.urls(), vec!["u1", "u2", "u3"]);

        assert!(store.reorder(&[ids[2].as_str(), ids[0].as_str(), ids[1].as_str()]));
        assert_eq!(store.urls(), vec!["u3", "u1", "u2"]);
        assert_eq!(store.names(), vec!["2.png", "0.png", "1.png"]);
    }

    #[test]
    fn test_get_by_status() {
        let mut store = FileStore::new();
        store.add("a.png", "u1", None);
        store.add("b.png", &create_placeholder("file-2", "b.png"), Some("file-2"));
        store.add("c.png", "u3", None);

        let done = store.get_by_status(FileStatus::Completed);
        assert_eq!(done.len(), 2);
        assert_eq!(done[0].url, "u1");
        assert_eq!(store.get_by_status(FileStatus::Pending)[0].id, "file-2");
    }

    #[test]
    fn test_status_map() {
        let mut store = FileStore::new();
        let done = store.add("a.png", "u1", None);
        let busy = store.add("b.png", &create_placeholder("file-2", "b.png"), Some("file-2"));
        store.update(&busy, FileEntryPatch::progress(40));

        let map = store.status_map();
        assert_eq!(map.uploading.get(&busy), Some(&40));
        assert!(!map.uploading.contains_key(&done));
        assert_eq!(map.upload_status[&done], "success");
        assert_eq!(map.upload_status[&busy], "uploading");

        let json = serde_json::to_value(&map).unwrap();
        assert!(json.get("uploadStatus").is_some());
    }

    #[test]
    fn test_clear_all() {
        let (mut store, _) = store_with(&["u1", "u2"]);
        store.clear_all();
        assert!(store.is_empty());
        assert!(store.urls().is_empty());
        assert!(store.registry().is_empty());
    }

    #[test]
    fn test_observers() {
        let mut store = FileStore::new();
        let recorder = Arc::new(Recorder::default());
        let sub = store.subscribe(recorder.clone());

        let id = store.add("a.png", "u1", None);
        store.update(&id, FileEntryPatch::rename("b.png"));
        store.update(&id, FileEntryPatch::rename("b.png"));
        store.remove(&id);
        store.clear_all();

        assert!(store.unsubscribe(sub));
        store.add("c.png", "u2", None);

        let changes = recorder.changes.lock().unwrap();
        assert_eq!(
            *changes,
            vec![
                StoreChange::Added { id: id.clone() },
                StoreChange::Updated { id: id.clone() },
                StoreChange::Removed { id },
                StoreChange::Cleared,
            ]
        );
    }
}
