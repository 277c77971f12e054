//! File entry model and status transition rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::is_placeholder;

/// Lifecycle status of an ingested file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Processing => "processing",
            FileStatus::Completed => "completed",
            FileStatus::Error => "error",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            FileStatus::Pending => 0,
            FileStatus::Processing => 1,
            FileStatus::Completed | FileStatus::Error => 2,
        }
    }

    /// Terminal states are absorbing.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Error)
    }

    /// Whether `self -> next` is a legal move.
    ///
    /// Status only moves forward. Staying in the same state is allowed; moving
    /// between the two terminal states is not.
    pub fn can_transition_to(&self, next: FileStatus) -> bool {
        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank()
    }

    /// Status label consumed by presentation code.
    pub fn upload_label(&self) -> &'static str {
        match self {
            FileStatus::Pending | FileStatus::Processing => "uploading",
            FileStatus::Completed => "success",
            FileStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single tracked file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub id: String,
    pub file_name: String,
    /// Placeholder token while in flight, content URI once completed.
    pub url: String,
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_progress: Option<u8>,
}

impl FileEntry {
    /// Build an entry, deriving the initial status from the url.
    pub fn new(id: String, file_name: String, url: String, created_at: DateTime<Utc>) -> Self {
        let (status, upload_progress) = if is_placeholder(&url) {
            (FileStatus::Pending, None)
        } else {
            (FileStatus::Completed, Some(100))
        };
        Self {
            id,
            file_name,
            url,
            status,
            created_at,
            upload_progress,
        }
    }

    /// Produce the entry that would result from applying `patch`.
    ///
    /// Returns `None` when the patch would regress the status or break the
    /// placeholder invariant. The placeholder token is fixed when the file is
    /// first tracked, so a patch cannot swap in a different one. The entry
    /// itself is not modified.
    pub fn patched(&self, patch: &FileEntryPatch) -> Option<FileEntry> {
        let mut next = self.clone();

        if let Some(status) = patch.status {
            if !self.status.can_transition_to(status) {
                return None;
            }
            next.status = status;
        }
        if let Some(name) = &patch.file_name {
            if name.trim().is_empty() {
                return None;
            }
            next.file_name = name.clone();
        }
        if let Some(url) = &patch.url {
            if url.is_empty() || (*url != self.url && is_placeholder(url)) {
                return None;
            }
            next.url = url.clone();
        }
        if let Some(progress) = patch.upload_progress {
            next.upload_progress = Some(progress.min(100));
        }
        if next.status == FileStatus::Completed {
            next.upload_progress = Some(100);
        }

        let placeholder = is_placeholder(&next.url);
        match next.status {
            FileStatus::Pending | FileStatus::Processing if !placeholder => None,
            FileStatus::Completed if placeholder => None,
            _ => Some(next),
        }
    }
}

/// Partial update for a [`FileEntry`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileEntryPatch {
    pub file_name: Option<String>,
    pub url: Option<String>,
    pub status: Option<FileStatus>,
    pub upload_progress: Option<u8>,
}

impl FileEntryPatch {
    pub fn status(status: FileStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn progress(progress: u8) -> Self {
        Self {
            status: Some(FileStatus::Processing),
            upload_progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn completed(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            status: Some(FileStatus::Completed),
            upload_progress: Some(100),
            ..Self::default()
        }
    }

    pub fn rename(file_name: impl Into<String>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::create_placeholder_at;

    fn pending_entry() -> FileEntry {
        let url = create_placeholder_at("file-a-1", "a.png", 1_700_000_000_000);
        FileEntry::new("file-a-1".into(), "a.png".into(), url, Utc::now())
    }

    #[test]
    fn test_forward_transitions() {
        use FileStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Error));
        assert!(Completed.can_transition_to(Completed));
    }

    #[test]
    fn test_no_regression() {
        use FileStatus::*;
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Error));
        assert!(!Error.can_transition_to(Pending));
    }

    #[test]
    fn test_initial_status_from_url() {
        assert_eq!(pending_entry().status, FileStatus::Pending);

        let done = FileEntry::new("x".into(), "b.png".into(), "u1".into(), Utc::now());
        assert_eq!(done.status, FileStatus::Completed);
        assert_eq!(done.upload_progress, Some(100));
    }

    #[test]
    fn test_patch_requires_placeholder_while_in_flight() {
        let entry = pending_entry();
        let patch = FileEntryPatch {
            url: Some("data:image/png;base64,AA==".into()),
            ..Default::default()
        };
        assert!(entry.patched(&patch).is_none());

        let done = entry
            .patched(&FileEntryPatch::completed("data:image/png;base64,AA=="))
            .unwrap();
        assert_eq!(done.status, FileStatus::Completed);
        assert_eq!(done.upload_progress, Some(100));
    }

    #[test]
    fn test_patch_cannot_swap_placeholder() {
        let entry = pending_entry();
        let other = create_placeholder_at("file-a-1", "a.png", 1_700_000_000_001);
        let patch = FileEntryPatch {
            url: Some(other),
            ..Default::default()
        };
        assert!(entry.patched(&patch).is_none());

        let same = FileEntryPatch {
            url: Some(entry.url.clone()),
            status: Some(FileStatus::Processing),
            ..Default::default()
        };
        assert_eq!(entry.patched(&same).unwrap().url, entry.url);
    }

    #[test]
    fn test_completed_rejects_placeholder() {
        let entry = pending_entry();
        assert!(entry
            .patched(&FileEntryPatch::status(FileStatus::Completed))
            .is_none());
    }

    #[test]
    fn test_progress_is_clamped() {
        let entry = pending_entry();
        let next = entry.patched(&FileEntryPatch::progress(250)).unwrap();
        assert_eq!(next.upload_progress, Some(100));
        assert_eq!(next.status, FileStatus::Processing);
    }

    #[test]
    fn test_serialized_shape() {
        let entry = FileEntry::new("x".into(), "b.png".into(), "u1".into(), Utc::now());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["fileName"], "b.png");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["uploadProgress"], 100);
    }
}
