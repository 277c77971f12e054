//! File id generation and validation.

use chrono::Utc;
use rand::Rng;
use regex::Regex;
use std::sync::LazyLock;

use crate::config::IdentityConfig;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Characters allowed in a file id.
static VALID_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Characters that must be replaced when sanitizing an id.
static INVALID_ID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]").unwrap());

/// Generate a practically unique id for a file.
///
/// Shape: `file-<name fragment>-<millis base36>-<random base36>`. The name
/// fragment is only a readability aid; uniqueness comes from the timestamp and
/// the random suffix.
pub fn generate_id(file_name: &str) -> String {
    let fragment = name_fragment(file_name);
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    format!(
        "{}-{}-{}-{}",
        IdentityConfig::ID_PREFIX,
        fragment,
        to_base36(millis),
        random_suffix(IdentityConfig::RANDOM_SUFFIX_LENGTH)
    )
}

fn name_fragment(file_name: &str) -> String {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    let fragment: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .take(IdentityConfig::NAME_FRAGMENT_LENGTH)
        .collect();
    if fragment.is_empty() {
        IdentityConfig::ID_PREFIX.to_string()
    } else {
        fragment
    }
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

fn random_suffix(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect()
}

/// A single problem found while validating an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdIssue {
    Empty,
    SurroundingWhitespace,
    InvalidCharacters { count: usize },
    TooLong { length: usize, max: usize },
}

impl IdIssue {
    /// Recoverable issues are fixed by sanitization.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, IdIssue::Empty)
    }
}

impl std::fmt::Display for IdIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdIssue::Empty => write!(f, "id is empty"),
            IdIssue::SurroundingWhitespace => write!(f, "id has surrounding whitespace"),
            IdIssue::InvalidCharacters { count } => {
                write!(f, "id contains {} invalid character(s)", count)
            }
            IdIssue::TooLong { length, max } => {
                write!(f, "id is {} characters long (max {})", length, max)
            }
        }
    }
}

/// Outcome of [`validate_id`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdValidation {
    /// True when the id is usable, possibly after sanitization.
    pub is_valid: bool,
    /// Sanitized form of the input; empty when not recoverable.
    pub sanitized_id: String,
    pub issues: Vec<IdIssue>,
}

impl IdValidation {
    /// True when the input was already a valid id, untouched.
    pub fn is_clean(&self) -> bool {
        self.is_valid && self.issues.is_empty()
    }

    pub fn into_result(self) -> Result<String, Vec<IdIssue>> {
        if self.is_valid {
            Ok(self.sanitized_id)
        } else {
            Err(self.issues)
        }
    }
}

/// Validate an id, sanitizing recoverable issues.
pub fn validate_id(id: &str) -> IdValidation {
    let mut issues = Vec::new();

    let trimmed = id.trim();
    if trimmed.len() != id.len() {
        issues.push(IdIssue::SurroundingWhitespace);
    }
    if trimmed.is_empty() {
        issues.push(IdIssue::Empty);
        return IdValidation {
            is_valid: false,
            sanitized_id: String::new(),
            issues,
        };
    }

    let mut sanitized = trimmed.to_string();
    if !VALID_ID.is_match(&sanitized) {
        let count = INVALID_ID_CHARS.find_iter(&sanitized).count();
        issues.push(IdIssue::InvalidCharacters { count });
        sanitized = INVALID_ID_CHARS.replace_all(&sanitized, "_").to_string();
    }

    let max = IdentityConfig::MAX_ID_LENGTH;
    if sanitized.len() > max {
        issues.push(IdIssue::TooLong {
            length: sanitized.len(),
            max,
        });
        // Only ASCII remains at this point, so byte truncation is safe.
        sanitized.truncate(max);
    }

    if sanitized.trim_matches(|c| c == '_' || c == '-').is_empty() {
        issues.push(IdIssue::Empty);
        return IdValidation {
            is_valid: false,
            sanitized_id: String::new(),
            issues,
        };
    }

    IdValidation {
        is_valid: true,
        sanitized_id: sanitized,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_are_valid() {
        for name in ["photo.png", "", "...", "Ünïcode façade.jpeg", "a b c"] {
            let id = generate_id(name);
            let validation = validate_id(&id);
            assert!(validation.is_clean(), "{} -> {:?}", id, validation);
        }
    }

    #[test]
    fn test_generated_id_shape() {
        let id = generate_id("My Holiday Photo.JPG");
        assert!(id.starts_with("file-myholida-"));
        assert_eq!(id.split('-').count(), 4);
    }

    #[test]
    fn test_no_collisions() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(generate_id("photo.png")));
        }
    }

    #[test]
    fn test_validate_clean_id() {
        let v = validate_id("file-42-ab");
        assert!(v.is_clean());
        assert_eq!(v.sanitized_id, "file-42-ab");
    }

    #[test]
    fn test_validate_sanitizes_recoverable() {
        let v = validate_id("  file 42/ab ");
        assert!(v.is_valid);
        assert!(!v.is_clean());
        assert_eq!(v.sanitized_id, "file_42_ab");
        assert!(v.issues.contains(&IdIssue::SurroundingWhitespace));
        assert!(v.issues.contains(&IdIssue::InvalidCharacters { count: 2 }));
        assert!(v.issues.iter().all(IdIssue::is_recoverable));
    }

    #[test]
    fn test_validate_truncates() {
        let long = "a".repeat(IdentityConfig::MAX_ID_LENGTH + 10);
        let v = validate_id(&long);
        assert!(v.is_valid);
        assert_eq!(v.sanitized_id.len(), IdentityConfig::MAX_ID_LENGTH);
    }

    #[test]
    fn test_validate_unrecoverable() {
        assert_eq!(
            validate_id("   ").into_result(),
            Err(vec![IdIssue::SurroundingWhitespace, IdIssue::Empty])
        );
        assert!(!validate_id("").is_valid);
        assert!(!validate_id("???").is_valid);
    }
}
