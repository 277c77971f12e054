//! Synchronization between the store and legacy array-shaped state.
//!
//! Presentation code historically owned two parallel arrays (`urls`, `names`)
//! plus a "main image" url. The bridge folds that state into the store
//! additively: a merge only ever inserts urls the store does not have yet, so
//! running it again, or running it while loads complete, never loses entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::kv::KeyValueStore;
use crate::registry::is_placeholder;
use crate::store::{FileStore, LegacyArrays};

/// Outcome of one merge pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Ids of the entries inserted by this pass, in array order.
    pub added: Vec<String>,
    /// Pairs that were already present, empty or placeholders.
    pub skipped: usize,
}

impl MergeReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
    }
}

/// Folds legacy arrays into a [`FileStore`].
pub struct LegacyBridge;

impl LegacyBridge {
    /// Insert every `(url, name)` pair whose url is not in the store yet.
    ///
    /// Never clears or rebuilds the store, so the merge is idempotent.
    pub fn merge(store: &mut FileStore, arrays: &LegacyArrays) -> MergeReport {
        let mut report = MergeReport::default();

        for (index, url) in arrays.urls.iter().enumerate() {
            if url.is_empty() || is_placeholder(url) || store.contains_url(url) {
                report.skipped += 1;
                continue;
            }

            let name = arrays
                .names
                .get(index)
                .map(|n| n.trim())
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| fallback_name(url, index));

            let id = store.add(&name, url, None);
            if id.is_empty() {
                report.skipped += 1;
            } else {
                report.added.push(id);
            }
        }

        if arrays.names.len() > arrays.urls.len() {
            debug!(
                urls = arrays.urls.len(),
                names = arrays.names.len(),
                "Ignoring names without a matching url"
            );
        }
        if !report.is_noop() {
            info!(
                added = report.added.len(),
                skipped = report.skipped,
                "Merged legacy file state"
            );
        }
        report
    }
}

/// Name for a legacy url that arrived without one.
fn fallback_name(url: &str, index: usize) -> String {
    if !url.starts_with("data:") {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if let Some(segment) = path.rsplit('/').next() {
            if !segment.is_empty() && !segment.contains(':') {
                return segment.to_string();
            }
        }
    }
    format!("image-{}", index + 1)
}

/// The featured image of a session.
///
/// Holds either nothing or the url of a live, non-placeholder entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MainImage {
    url: String,
}

impl MainImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current main image url, `""` when unset.
    pub fn get(&self) -> &str {
        &self.url
    }

    pub fn is_set(&self) -> bool {
        !self.url.is_empty()
    }

    /// Point the main image at `url`.
    ///
    /// An empty url clears it. Placeholders and urls with no live entry are
    /// rejected and leave the current value alone.
    pub fn set(&mut self, url: &str, store: &FileStore) -> bool {
        if url.is_empty() {
            self.clear();
            return true;
        }
        if is_placeholder(url) {
            warn!("Rejected placeholder as main image");
            return false;
        }
        if !store.contains_url(url) {
            debug!("Rejected main image without a live entry");
            return false;
        }
        self.url = url.to_string();
        true
    }

    /// Clear the main image. Returns whether one was set.
    pub fn clear(&mut self) -> bool {
        let was_set = self.is_set();
        self.url.clear();
        was_set
    }

    /// Clear the main image if its entry is gone. Returns `true` if cleared.
    pub fn reconcile(&mut self, store: &FileStore) -> bool {
        if self.is_set() && !store.contains_url(&self.url) {
            debug!("Main image no longer live, clearing");
            self.url.clear();
            return true;
        }
        false
    }
}

/// Persisted record of the last chosen main image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainImageBackup {
    pub main_image: String,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

impl MainImageBackup {
    pub fn new(main_image: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            main_image: main_image.into(),
            timestamp: at.timestamp_millis(),
        }
    }

    /// Whether the record is no older than `window` at `now`.
    ///
    /// Records stamped in the future count as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let age_millis = now.timestamp_millis().saturating_sub(self.timestamp);
        age_millis <= 0 || (age_millis as u128) <= window.as_millis()
    }

    /// Read the record, `Ok(None)` if absent, `Err` if malformed.
    pub fn load(kv: &dyn KeyValueStore) -> Result<Option<Self>> {
        let Some(raw) = kv.get(IngestConfig::MAIN_IMAGE_BACKUP_KEY) else {
            return Ok(None);
        };
        let backup: MainImageBackup = serde_json::from_str(&raw)?;
        if backup.main_image.is_empty() {
            return Err(IngestError::validation(
                "mainImage",
                "backup record has an empty url",
            ));
        }
        Ok(Some(backup))
    }

    pub fn save(&self, kv: &dyn KeyValueStore) -> Result<()> {
        let raw = serde_json::to_string(self)?;
        kv.set(IngestConfig::MAIN_IMAGE_BACKUP_KEY, &raw)
    }

    pub fn remove(kv: &dyn KeyValueStore) -> Result<()> {
        kv.remove(IngestConfig::MAIN_IMAGE_BACKUP_KEY)
    }
}

/// Restore the main image from its backup record, using the current time.
pub fn recover_main_image(
    main_image: &mut MainImage,
    store: &FileStore,
    kv: &dyn KeyValueStore,
    freshness: Duration,
) -> Option<String> {
    recover_main_image_at(main_image, store, kv, freshness, Utc::now())
}

/// Restore the main image from its backup record as of `now`.
///
/// Only applies when no main image is set, the backed-up url is live and the
/// record is within `freshness`. Malformed records are deleted.
pub fn recover_main_image_at(
    main_image: &mut MainImage,
    store: &FileStore,
    kv: &dyn KeyValueStore,
    freshness: Duration,
    now: DateTime<Utc>,
) -> Option<String> {
    if main_image.is_set() {
        return None;
    }

    let backup = match MainImageBackup::load(kv) {
        Ok(Some(backup)) => backup,
        Ok(None) => return None,
        Err(e) => {
            warn!("Discarding malformed main image backup: {}", e);
            if let Err(e) = MainImageBackup::remove(kv) {
                warn!("Failed to remove main image backup: {}", e);
            }
            return None;
        }
    };

    if !backup.is_fresh(now, freshness) {
        debug!(timestamp = backup.timestamp, "Main image backup is stale");
        return None;
    }
    if !main_image.set(&backup.main_image, store) {
        debug!("Main image backup does not match a live entry");
        return None;
    }

    info!("Recovered main image from backup");
    Some(backup.main_image)
}
