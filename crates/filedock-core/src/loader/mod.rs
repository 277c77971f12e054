//! Content loader pipeline.
//!
//! Converts raw files into `data:` content URIs on background tasks, reporting
//! integer progress and delivering exactly one terminal callback per load
//! unless the load is cancelled first.
//!
//! ```text
//! Idle ──permit──▶ Reading ──▶ Succeeded
//!                     │   └──▶ Failed
//!                     └─cancel─▶ Aborted
//! ```

mod content;
mod pipeline;
mod source;

pub use content::{data_uri_mime_type, encode_data_uri, validate_data_uri};
pub use pipeline::{
    ContentLoader, ErrorCallback, LoadCallbacks, LoadHandle, LoadState, LoadedContent,
    LoaderOptions, ProgressCallback, SuccessCallback,
};
pub use source::{FileSource, MemorySource, PathSource, SourceReader};
