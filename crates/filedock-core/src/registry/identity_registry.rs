//! Four-way identity index over file entries.
//!
//! The registry indexes every tracked file by id, display name, final url and
//! placeholder token. Names and urls are not unique (the same image can be
//! picked twice), so those indexes hold the ids that carry a key in
//! registration order. Every mutation validates first and commits second, so a
//! failed call leaves all four indexes exactly as they were.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::placeholder::{create_placeholder_at, is_placeholder};
use crate::entry::{FileEntry, FileStatus};
use crate::error::{IngestError, Result};

/// A registry record for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityMapping {
    pub file_id: String,
    pub file_name: String,
    /// Name at registration time; survives renames.
    pub original_file_name: String,
    pub url: String,
    pub placeholder_url: String,
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl IdentityMapping {
    /// Final url, if the content has arrived.
    pub fn final_url(&self) -> Option<&str> {
        if self.url.is_empty() || is_placeholder(&self.url) {
            None
        } else {
            Some(&self.url)
        }
    }
}

/// Diagnostic counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub error: usize,
    pub with_final_url: usize,
    pub first_created: Option<DateTime<Utc>>,
    pub last_created: Option<DateTime<Utc>>,
}

/// Multi-index lookup table over file identities.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    by_id: HashMap<String, IdentityMapping>,
    by_name: HashMap<String, Vec<String>>,
    by_url: HashMap<String, Vec<String>>,
    by_placeholder: HashMap<String, String>,
}

fn index_insert(index: &mut HashMap<String, Vec<String>>, key: &str, file_id: &str) {
    let ids = index.entry(key.to_string()).or_default();
    if !ids.iter().any(|id| id == file_id) {
        ids.push(file_id.to_string());
    }
}

fn index_remove(index: &mut HashMap<String, Vec<String>>, key: &str, file_id: &str) {
    if let Some(ids) = index.get_mut(key) {
        ids.retain(|id| id != file_id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new file.
    ///
    /// Fails if the id or its placeholder token is already registered.
    pub fn register(&mut self, entry: &FileEntry) -> Result<()> {
        if entry.id.is_empty() {
            return Err(IngestError::registry("", "cannot register an empty id"));
        }
        if self.by_id.contains_key(&entry.id) {
            return Err(IngestError::registry(&entry.id, "id is already registered"));
        }

        let placeholder_url = if is_placeholder(&entry.url) {
            entry.url.clone()
        } else {
            create_placeholder_at(
                &entry.id,
                &entry.file_name,
                entry.created_at.timestamp_millis(),
            )
        };
        if let Some(owner) = self.by_placeholder.get(&placeholder_url) {
            return Err(IngestError::registry(
                &entry.id,
                format!("placeholder already owned by {}", owner),
            ));
        }

        let mapping = IdentityMapping {
            file_id: entry.id.clone(),
            file_name: entry.file_name.clone(),
            original_file_name: entry.file_name.clone(),
            url: entry.url.clone(),
            placeholder_url,
            status: entry.status,
            created_at: entry.created_at,
            last_updated: Utc::now(),
        };
        self.index(&mapping);
        self.by_id.insert(mapping.file_id.clone(), mapping);
        debug!(file_id = %entry.id, "Registered identity");
        Ok(())
    }

    /// Bring an existing mapping in line with the entry's current state.
    pub fn update(&mut self, entry: &FileEntry) -> Result<()> {
        let Some(current) = self.by_id.get(&entry.id) else {
            return Err(IngestError::registry(&entry.id, "unknown id"));
        };
        if current.status.is_terminal() && entry.status != current.status {
            return Err(IngestError::registry(
                &entry.id,
                format!(
                    "status cannot move from {} to {}",
                    current.status, entry.status
                ),
            ));
        }
        if is_placeholder(&entry.url) && entry.url != current.placeholder_url {
            return Err(IngestError::registry(
                &entry.id,
                "placeholder token cannot change after registration",
            ));
        }

        let mut next = current.clone();
        next.file_name = entry.file_name.clone();
        next.url = entry.url.clone();
        next.status = entry.status;
        next.last_updated = Utc::now();

        let previous = current.clone();
        self.unindex(&previous);
        self.index(&next);
        self.by_id.insert(next.file_id.clone(), next);
        Ok(())
    }

    /// Remove a mapping and all of its index entries.
    pub fn remove(&mut self, file_id: &str) -> Result<IdentityMapping> {
        let Some(mapping) = self.by_id.remove(file_id) else {
            return Err(IngestError::registry(file_id, "unknown id"));
        };
        self.unindex(&mapping);
        debug!(file_id = %file_id, "Removed identity");
        Ok(mapping)
    }

    /// Drop every mapping.
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_name.clear();
        self.by_url.clear();
        self.by_placeholder.clear();
    }

    fn index(&mut self, mapping: &IdentityMapping) {
        index_insert(&mut self.by_name, &mapping.file_name, &mapping.file_id);
        if let Some(url) = mapping.final_url() {
            index_insert(&mut self.by_url, url, &mapping.file_id);
        }
        self.by_placeholder
            .insert(mapping.placeholder_url.clone(), mapping.file_id.clone());
    }

    fn unindex(&mut self, mapping: &IdentityMapping) {
        index_remove(&mut self.by_name, &mapping.file_name, &mapping.file_id);
        if let Some(url) = mapping.final_url() {
            index_remove(&mut self.by_url, url, &mapping.file_id);
        }
        if self.by_placeholder.get(&mapping.placeholder_url) == Some(&mapping.file_id) {
            self.by_placeholder.remove(&mapping.placeholder_url);
        }
    }

    pub fn get_by_id(&self, file_id: &str) -> Option<&IdentityMapping> {
        self.by_id.get(file_id)
    }

    /// Earliest registered mapping with this display name.
    pub fn get_by_name(&self, file_name: &str) -> Option<&IdentityMapping> {
        self.by_name
            .get(file_name)
            .and_then(|ids| ids.first())
            .and_then(|id| self.by_id.get(id))
    }

    /// Earliest registered mapping with this final url.
    pub fn get_by_url(&self, url: &str) -> Option<&IdentityMapping> {
        self.by_url
            .get(url)
            .and_then(|ids| ids.first())
            .and_then(|id| self.by_id.get(id))
    }

    pub fn get_by_placeholder(&self, token: &str) -> Option<&IdentityMapping> {
        self.by_placeholder
            .get(token)
            .and_then(|id| self.by_id.get(id))
    }

    pub fn ids_for_name(&self, file_name: &str) -> &[String] {
        self.by_name.get(file_name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ids_for_url(&self, url: &str) -> &[String] {
        self.by_url.get(url).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, file_id: &str) -> bool {
        self.by_id.contains_key(file_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.by_id.len(),
            ..RegistryStats::default()
        };
        for mapping in self.by_id.values() {
            match mapping.status {
                FileStatus::Pending => stats.pending += 1,
                FileStatus::Processing => stats.processing += 1,
                FileStatus::Completed => stats.completed += 1,
                FileStatus::Error => stats.error += 1,
            }
            if mapping.final_url().is_some() {
                stats.with_final_url += 1;
            }
            stats.first_created = Some(match stats.first_created {
                Some(first) => first.min(mapping.created_at),
                None => mapping.created_at,
            });
            stats.last_created = Some(match stats.last_created {
                Some(last) => last.max(mapping.created_at),
                None => mapping.created_at,
            });
        }
        stats
    }

    /// Verify that every index agrees with `by_id`.
    pub fn check_consistency(&self) -> Result<()> {
        let fail = |id: &str, msg: &str| Err(IngestError::registry(id, msg));

        for (id, mapping) in &self.by_id {
            if !self.ids_for_name(&mapping.file_name).contains(id) {
                return fail(id, "missing from name index");
            }
            if self.by_placeholder.get(&mapping.placeholder_url) != Some(id) {
                return fail(id, "missing from placeholder index");
            }
            match mapping.final_url() {
                Some(url) if !self.ids_for_url(url).contains(id) => {
                    return fail(id, "missing from url index");
                }
                None if self.by_url.values().any(|ids| ids.contains(id)) => {
                    return fail(id, "url index entry without a final url");
                }
                _ => {}
            }
        }

        let name_refs: usize = self.by_name.values().map(Vec::len).sum();
        let url_refs: usize = self.by_url.values().map(Vec::len).sum();
        let with_url = self
            .by_id
            .values()
            .filter(|m| m.final_url().is_some())
            .count();
        if name_refs != self.by_id.len()
            || url_refs != with_url
            || self.by_placeholder.len() != self.by_id.len()
        {
            return fail("", "index sizes disagree with id index");
        }
        Ok(())
    }
}
