//! Filedock CLI - ingest files from disk through a filedock session.
//!
//! Loads every given file into a content URI, optionally merging a legacy
//! state file first, and prints the resulting session snapshot as JSON on
//! stdout. Logs go to stderr.

mod legacy;
mod report;

use anyhow::{bail, Result};
use clap::Parser;
use filedock_core::{
    FileSource, IngestSession, JsonFileKeyValueStore, PathSource, SubmitOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::legacy::LegacyStateFile;

#[derive(Parser, Debug)]
#[command(name = "filedock")]
#[command(about = "Ingest image files and print the resulting file state")]
struct Args {
    /// Files to ingest
    files: Vec<PathBuf>,

    /// Legacy state file to merge first ({"urls", "names", "mainImage"})
    #[arg(long)]
    legacy_state: Option<PathBuf>,

    /// JSON file persisting the main image backup between runs
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Main image, given as a url or a file name
    #[arg(long)]
    main_image: Option<String>,

    /// Maximum simultaneous reads (default: unlimited)
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Maximum file size in bytes
    #[arg(long)]
    max_file_size: Option<u64>,

    /// Maximum number of files in the session
    #[arg(long)]
    max_files: Option<usize>,

    /// Print content URIs in full instead of a preview
    #[arg(long)]
    full: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    if args.files.is_empty() && args.legacy_state.is_none() {
        bail!("nothing to do: pass files to ingest or --legacy-state");
    }

    let mut builder = IngestSession::builder().max_concurrent_loads(args.max_concurrent);
    if let Some(bytes) = args.max_file_size {
        builder = builder.max_file_size(bytes);
    }
    if let Some(count) = args.max_files {
        builder = builder.max_files(count);
    }
    if let Some(path) = &args.state_file {
        info!("Main image backup: {}", path.display());
        builder = builder.key_value_store(Arc::new(JsonFileKeyValueStore::new(path)));
    }
    if let Some(path) = &args.legacy_state {
        let legacy = LegacyStateFile::read(path)?;
        info!(
            urls = legacy.urls.len(),
            "Merging legacy state from {}",
            path.display()
        );
        builder = builder.legacy_state(legacy.arrays());
        if let Some(main_image) = legacy.main_image {
            builder = builder.legacy_main_image(main_image);
        }
    }
    let session = builder.build()?;

    let mut sources: Vec<Arc<dyn FileSource>> = Vec::with_capacity(args.files.len());
    let mut unreadable = Vec::new();
    for path in &args.files {
        match PathSource::from_path(path).await {
            Ok(source) => sources.push(Arc::new(source)),
            Err(error) => unreadable.push(SubmitOutcome::Rejected {
                file_name: path.display().to_string(),
                error,
            }),
        }
    }
    let mut outcomes = session.submit(sources);
    outcomes.extend(unreadable);
    for outcome in &outcomes {
        if let SubmitOutcome::Rejected { file_name, error } = outcome {
            warn!("Skipped {}: {}", file_name, error);
        }
    }
    session.wait_for_loads().await;

    if let Some(main_image) = &args.main_image {
        let url = resolve_main_image(&session, main_image);
        if !session.set_main_image(&url) {
            warn!("{} is not a loaded file, main image unchanged", main_image);
        }
    }

    let report = report::build_report(
        &outcomes,
        &session.entries(),
        &session.snapshot(),
        args.full,
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    session.destroy();
    Ok(())
}

/// Accept either a url or the name of a file in the session.
fn resolve_main_image(session: &IngestSession, value: &str) -> String {
    session
        .with_store(|store| {
            store
                .registry()
                .get_by_name(value)
                .and_then(|m| m.final_url().map(str::to_string))
        })
        .unwrap_or_else(|| value.to_string())
}
