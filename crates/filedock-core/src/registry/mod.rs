//! Identity registry: id generation, placeholder tokens, and the four-way
//! index over tracked files.
//!
//! - **Ids**: generated per file, validated when supplied by callers
//! - **Placeholders**: url-shaped tokens standing in for content still loading
//! - **IdentityRegistry**: lookups by id, display name, final url and
//!   placeholder token
//!
//! The registry is owned by a single [`FileStore`](crate::store::FileStore)
//! and lives as long as its session. Nothing here is process-global.

mod identity_registry;
mod ids;
mod placeholder;

pub use identity_registry::{IdentityMapping, IdentityRegistry, RegistryStats};
pub use ids::{generate_id, validate_id, IdIssue, IdValidation};
pub use placeholder::{
    create_placeholder, create_placeholder_at, extract_id, is_placeholder, parse_placeholder,
    sanitize_placeholder_name, PlaceholderParts,
};
