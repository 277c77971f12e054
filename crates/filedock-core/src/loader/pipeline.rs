//! Asynchronous content loading with progress and cancellation.
//!
//! Each call to [`ContentLoader::load`] spawns one read task and returns a
//! [`LoadHandle`]. Terminal callbacks and cancellation race on a single
//! `finalized` flag: whoever flips it first wins, so exactly one of
//! `on_success` / `on_error` fires, or neither if `cancel()` got there first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;
use tokio::runtime::Handle;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::content::{encode_data_uri, validate_data_uri};
use super::source::FileSource;
use crate::cancel::CancellationToken;
use crate::config::LoaderConfig;
use crate::error::{IngestError, Result};

/// Per-invocation load state. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Reading,
    Succeeded,
    Failed,
    Aborted,
}

impl LoadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoadState::Succeeded | LoadState::Failed | LoadState::Aborted
        )
    }
}

/// Successful load result.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedContent {
    pub file_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    pub data_uri: String,
}

pub type ProgressCallback = Box<dyn Fn(u8) + Send + Sync>;
pub type SuccessCallback = Box<dyn FnOnce(LoadedContent) + Send>;
pub type ErrorCallback = Box<dyn FnOnce(IngestError) + Send>;

/// Callbacks for one load.
pub struct LoadCallbacks {
    pub on_progress: ProgressCallback,
    pub on_success: SuccessCallback,
    pub on_error: ErrorCallback,
}

impl LoadCallbacks {
    pub fn new(
        on_progress: impl Fn(u8) + Send + Sync + 'static,
        on_success: impl FnOnce(LoadedContent) + Send + 'static,
        on_error: impl FnOnce(IngestError) + Send + 'static,
    ) -> Self {
        Self {
            on_progress: Box::new(on_progress),
            on_success: Box::new(on_success),
            on_error: Box::new(on_error),
        }
    }
}

/// Runtime options for the loader.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Upper bound on simultaneous reads. `None` starts every load at once.
    pub max_concurrent_loads: Option<usize>,
    pub chunk_size: usize,
    /// Reads past this many bytes fail, whatever size the source declared.
    pub max_bytes: Option<u64>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_concurrent_loads: None,
            chunk_size: LoaderConfig::READ_CHUNK_SIZE,
            max_bytes: None,
        }
    }
}

#[derive(Debug)]
struct LoadShared {
    finalized: AtomicBool,
    state: Mutex<LoadState>,
    token: CancellationToken,
}

impl LoadShared {
    fn new() -> Self {
        Self {
            finalized: AtomicBool::new(false),
            state: Mutex::new(LoadState::Idle),
            token: CancellationToken::new(),
        }
    }

    fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    fn state(&self) -> LoadState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: LoadState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.is_terminal() {
            *state = next;
        }
    }

    /// Claim the right to deliver a terminal event.
    fn finish(&self, terminal: LoadState) -> bool {
        if self
            .finalized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.set_state(terminal);
            true
        } else {
            false
        }
    }
}

/// Handle to one in-flight load.
#[derive(Debug)]
pub struct LoadHandle {
    file_id: String,
    shared: Arc<LoadShared>,
    task: JoinHandle<()>,
    done: watch::Receiver<bool>,
}

impl LoadHandle {
    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn state(&self) -> LoadState {
        self.shared.state()
    }

    /// Cancel the load. Idempotent, and a no-op once a terminal callback fired.
    ///
    /// The finalized flag is flipped before teardown so a terminal event that
    /// arrives during teardown is ignored.
    pub fn cancel(&self) -> bool {
        if self.shared.finalized.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.shared.set_state(LoadState::Aborted);
        self.shared.token.cancel();
        self.task.abort();
        debug!(file_id = %self.file_id, "Load cancelled");
        true
    }

    /// Whether the read task has stopped.
    pub fn is_finished(&self) -> bool {
        *self.done.borrow() || self.task.is_finished()
    }

    /// Wait until the read task has stopped for any reason.
    pub async fn finished(&self) {
        let mut done = self.done.clone();
        while !*done.borrow() {
            if done.changed().await.is_err() {
                break;
            }
        }
    }
}

/// Marks the load as done when the task ends, including on abort.
struct DoneGuard(watch::Sender<bool>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.0.send(true);
    }
}

/// Converts raw files into content URIs.
#[derive(Debug, Clone)]
pub struct ContentLoader {
    runtime: Handle,
    options: LoaderOptions,
    permits: Option<Arc<Semaphore>>,
}

impl ContentLoader {
    /// Create a loader bound to the current tokio runtime.
    pub fn new(options: LoaderOptions) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| IngestError::Config {
            message: format!("Content loader requires a tokio runtime: {}", e),
        })?;
        Ok(Self::with_handle(runtime, options))
    }

    pub fn with_handle(runtime: Handle, options: LoaderOptions) -> Self {
        let permits = options
            .max_concurrent_loads
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        Self {
            runtime,
            options,
            permits,
        }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Start loading `file`. Returns immediately.
    pub fn load(
        &self,
        file: Arc<dyn FileSource>,
        file_id: &str,
        callbacks: LoadCallbacks,
    ) -> LoadHandle {
        let shared = Arc::new(LoadShared::new());
        let (done_tx, done_rx) = watch::channel(false);
        let task = self.runtime.spawn(run_load(
            file,
            file_id.to_string(),
            callbacks,
            shared.clone(),
            self.permits.clone(),
            self.options.chunk_size.max(1),
            self.options.max_bytes,
            DoneGuard(done_tx),
        ));
        LoadHandle {
            file_id: file_id.to_string(),
            shared,
            task,
            done: done_rx,
        }
    }
}

async fn run_load(
    file: Arc<dyn FileSource>,
    file_id: String,
    callbacks: LoadCallbacks,
    shared: Arc<LoadShared>,
    permits: Option<Arc<Semaphore>>,
    chunk_size: usize,
    max_bytes: Option<u64>,
    _done: DoneGuard,
) {
    let LoadCallbacks {
        on_progress,
        on_success,
        on_error,
    } = callbacks;
    let token = shared.token.clone();

    let _permit = match permits {
        Some(semaphore) => {
            tokio::select! {
                permit = semaphore.acquire_owned() => permit.ok(),
                _ = token.cancelled() => return,
            }
        }
        None => None,
    };
    if shared.is_finalized() {
        return;
    }
    shared.set_state(LoadState::Reading);

    let result = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        result = read_content(
            file.as_ref(),
            &file_id,
            &shared,
            chunk_size,
            max_bytes,
            &on_progress,
        ) => result,
    };

    match result {
        Ok(content) => {
            if shared.finish(LoadState::Succeeded) {
                debug!(file_id = %file_id, size = content.size, "Load succeeded");
                on_success(content);
            }
        }
        Err(e) => {
            if shared.finish(LoadState::Failed) {
                warn!("Load failed for {}: {}", file_id, e);
                on_error(e);
            }
        }
    }
}

async fn read_content(
    file: &dyn FileSource,
    file_id: &str,
    shared: &LoadShared,
    chunk_size: usize,
    max_bytes: Option<u64>,
    on_progress: &ProgressCallback,
) -> Result<LoadedContent> {
    let file_name = file.name().to_string();
    let total = file.size().filter(|size| *size > 0);
    let mut reader = file.open().await?;

    let mut bytes = Vec::with_capacity(total.unwrap_or(0).min(64 * 1024 * 1024) as usize);
    let mut chunk = vec![0u8; chunk_size];
    let mut last_percent: Option<u8> = None;

    let mut report = |loaded: u64| {
        let Some(total) = total else {
            return;
        };
        let percent = (loaded.saturating_mul(100) / total).min(100) as u8;
        if last_percent != Some(percent) && !shared.is_finalized() {
            last_percent = Some(percent);
            on_progress(percent);
        }
    };

    report(0);
    loop {
        let n = reader.read(&mut chunk).await.map_err(|e| IngestError::Read {
            file_name: file_name.clone(),
            message: e.to_string(),
        })?;
        if n == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..n]);
        if let Some(limit) = max_bytes {
            if bytes.len() as u64 > limit {
                return Err(IngestError::validation(
                    "size",
                    format!("{} exceeds the {} byte limit", file_name, limit),
                ));
            }
        }
        report(bytes.len() as u64);
    }

    let mime_type = file
        .mime_type()
        .unwrap_or(LoaderConfig::FALLBACK_MIME_TYPE)
        .to_string();
    let size = bytes.len() as u64;

    let encode_mime = mime_type.clone();
    let data_uri = tokio::task::spawn_blocking(move || encode_data_uri(&encode_mime, &bytes))
        .await
        .map_err(|e| IngestError::Other(format!("Encoding task failed: {}", e)))?;

    if size == 0 {
        return Err(IngestError::validation(
            "content",
            format!("{} is empty", file_name),
        ));
    }
    validate_data_uri(&data_uri)?;

    Ok(LoadedContent {
        file_id: file_id.to_string(),
        file_name,
        mime_type,
        size,
        data_uri,
    })
}
