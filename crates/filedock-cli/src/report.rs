//! JSON report printed on stdout.
//!
//! Content URIs are shortened unless the caller asks for them in full; a
//! single photo otherwise turns into megabytes of base64 on the terminal.

use filedock_core::{FileEntry, SessionSnapshot, SubmitOutcome};
use serde_json::{json, Value};

const PREVIEW_CHARS: usize = 48;

/// Shorten a `data:` url to its header and the first few payload characters.
pub fn preview_url(url: &str) -> String {
    if !url.starts_with("data:") || url.len() <= PREVIEW_CHARS {
        return url.to_string();
    }
    let cut = url
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|i| *i <= PREVIEW_CHARS)
        .last()
        .unwrap_or(0);
    format!("{}...({} chars)", &url[..cut], url.len())
}

fn shown(url: &str, full: bool) -> String {
    if full {
        url.to_string()
    } else {
        preview_url(url)
    }
}

/// Build the report for one run.
pub fn build_report(
    outcomes: &[SubmitOutcome],
    entries: &[FileEntry],
    snapshot: &SessionSnapshot,
    full: bool,
) -> Value {
    let rejected: Vec<Value> = outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            SubmitOutcome::Rejected { file_name, error } => Some(json!({
                "fileName": file_name,
                "error": error.to_string(),
            })),
            SubmitOutcome::Accepted { .. } => None,
        })
        .collect();

    let files: Vec<Value> = entries
        .iter()
        .map(|entry| {
            json!({
                "id": entry.id,
                "fileName": entry.file_name,
                "status": entry.status,
                "url": shown(&entry.url, full),
            })
        })
        .collect();

    let urls: Vec<String> = snapshot.urls.iter().map(|u| shown(u, full)).collect();

    json!({
        "success": rejected.is_empty(),
        "files": files,
        "rejected": rejected,
        "snapshot": {
            "urls": urls,
            "names": snapshot.names,
            "mainImage": shown(&snapshot.main_image, full),
            "uploading": snapshot.uploading,
            "uploadStatus": snapshot.upload_status,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use filedock_core::{FileStatus, IngestError};

    #[test]
    fn test_preview_url() {
        assert_eq!(preview_url("u1"), "u1");
        assert_eq!(preview_url("https://example.com/a.png"), "https://example.com/a.png");

        let long = format!("data:image/png;base64,{}", "A".repeat(200));
        let preview = preview_url(&long);
        assert!(preview.starts_with("data:image/png;base64,AAAA"));
        assert!(preview.ends_with(&format!("...({} chars)", long.len())));
        assert!(preview.len() < long.len());
    }

    #[test]
    fn test_build_report() {
        let entry = FileEntry::new("file-a-1".into(), "a.png".into(), "u1".into(), Utc::now());
        let snapshot = SessionSnapshot {
            urls: vec!["u1".into()],
            names: vec!["a.png".into()],
            main_image: "u1".into(),
            ..SessionSnapshot::default()
        };
        let outcomes = vec![
            SubmitOutcome::Accepted {
                file_id: "file-a-1".into(),
                file_name: "a.png".into(),
            },
            SubmitOutcome::Rejected {
                file_name: "notes.txt".into(),
                error: IngestError::validation("mimeType", "unsupported"),
            },
        ];

        let report = build_report(&outcomes, &[entry], &snapshot, false);
        assert_eq!(report["success"], false);
        assert_eq!(report["files"][0]["status"], json!(FileStatus::Completed));
        assert_eq!(report["rejected"][0]["fileName"], "notes.txt");
        assert_eq!(report["snapshot"]["mainImage"], "u1");
    }
}
