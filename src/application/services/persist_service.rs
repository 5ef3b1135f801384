//! Background download of full images to durable storage.
//!
//! Jobs run on a bounded worker pool, separate from display loads. Bytes go
//! through the DATA disk tier and are copied into the destination directory
//! via a temporary file, so a failed task never leaves a partial file behind.

use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use directories::{ProjectDirs, UserDirs};
use futures_util::FutureExt;
use image::ImageFormat;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::entities::{CacheKey, PersistState};
use crate::domain::errors::{FetchError, PersistError};
use crate::domain::ports::{FetchedBytes, ImageFetcher, PersistListener};
use crate::infrastructure::image::CacheManager;

const DEFAULT_EXTENSION: &str = "jpg";
const PENDING_PREFIX: &str = ".pending-";

/// Persist pool settings.
#[derive(Debug, Clone)]
pub struct PersistConfig {
    /// Directory receiving persisted files. Created on first use.
    pub dir: PathBuf,
    /// Maximum tasks copying at once.
    pub workers: usize,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            dir: default_persist_dir(),
            workers: 2,
        }
    }
}

/// One persist task: a URL, its destination once known, and its state.
struct PersistTask {
    url: String,
    state: watch::Sender<PersistState>,
    destination: Mutex<Option<PathBuf>>,
    /// Set once the file is in place. Held across the final rename.
    committed: Mutex<bool>,
    listener: Arc<dyn PersistListener>,
}

impl PersistTask {
    /// Moves to `state` unless already terminal. Only the winner reports.
    fn finish(&self, state: PersistState) -> bool {
        self.state.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            *current = state;
            true
        })
    }

    /// Ends the task with `err` unless its file is already committed.
    fn fail(&self, err: &PersistError) {
        let state = if matches!(err, PersistError::Cancelled) {
            PersistState::Cancelled
        } else {
            PersistState::Failed
        };
        let failed = {
            let committed = self.committed.lock();
            !*committed && self.finish(state)
        };
        if failed {
            warn!(url = %self.url, error = %err, "Persist task failed");
            self.listener.on_fail(err);
        }
    }

    fn is_terminal(&self) -> bool {
        self.state.borrow().is_terminal()
    }
}

/// Caller-side view of a persist task.
#[derive(Clone)]
pub struct PersistHandle {
    task: Arc<PersistTask>,
}

impl std::fmt::Debug for PersistHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistHandle")
            .field("url", &self.task.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PersistHandle {
    /// Source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.task.url
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PersistState {
        *self.task.state.borrow()
    }

    /// Final path, set once the task succeeded.
    #[must_use]
    pub fn destination(&self) -> Option<PathBuf> {
        self.task.destination.lock().clone()
    }

    /// Cancels the task unless it already finished.
    ///
    /// The listener receives `on_fail` with [`PersistError::Cancelled`] if
    /// this call is what ended the task. Blocks briefly if the final rename
    /// is in progress.
    pub fn cancel(&self) {
        self.task.fail(&PersistError::Cancelled);
    }

    /// Waits for a terminal state.
    pub async fn wait(&self) -> PersistState {
        let mut rx = self.task.state.subscribe();
        rx.wait_for(|state| state.is_terminal())
            .await
            .map_or(PersistState::Failed, |state| *state)
    }
}

/// Queues persist tasks onto the worker pool.
pub struct PersistService {
    job_tx: mpsc::UnboundedSender<Arc<PersistTask>>,
    config: PersistConfig,
}

impl std::fmt::Debug for PersistService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// State for the background worker loop.
struct WorkerState {
    caches: CacheManager,
    fetcher: Arc<dyn ImageFetcher>,
    dir: PathBuf,
    semaphore: Arc<Semaphore>,
    job_rx: mpsc::UnboundedReceiver<Arc<PersistTask>>,
}

/// Everything one job needs, cloned out of the worker state.
#[derive(Clone)]
struct JobContext {
    caches: CacheManager,
    fetcher: Arc<dyn ImageFetcher>,
    dir: PathBuf,
}

impl PersistService {
    /// Starts the worker loop. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(caches: CacheManager, fetcher: Arc<dyn ImageFetcher>, config: PersistConfig) -> Self {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let state = WorkerState {
            caches,
            fetcher,
            dir: config.dir.clone(),
            semaphore: Arc::new(Semaphore::new(config.workers.max(1))),
            job_rx,
        };
        tokio::spawn(Self::run_worker_loop(state));
        Self { job_tx, config }
    }

    /// Destination directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Schedules a download of `url`.
    ///
    /// The listener is invoked exactly once, with either the final path or
    /// the reason no file was produced.
    pub fn persist(&self, url: impl Into<String>, listener: Arc<dyn PersistListener>) -> PersistHandle {
        let task = Arc::new(PersistTask {
            url: url.into(),
            state: watch::Sender::new(PersistState::Running),
            destination: Mutex::new(None),
            committed: Mutex::new(false),
            listener,
        });
        debug!(url = %task.url, "Persist task queued");

        if self.job_tx.send(task.clone()).is_err() {
            task.fail(&PersistError::Worker {
                message: "persist worker stopped".to_string(),
            });
        }
        PersistHandle { task }
    }

    async fn run_worker_loop(mut state: WorkerState) {
        let context = JobContext {
            caches: state.caches,
            fetcher: state.fetcher,
            dir: state.dir,
        };

        while let Some(task) = state.job_rx.recv().await {
            if task.is_terminal() {
                continue;
            }
            let Ok(permit) = state.semaphore.clone().acquire_owned().await else {
                break;
            };
            let context = context.clone();

            tokio::spawn(async move {
                let run = AssertUnwindSafe(context.run(&task)).catch_unwind().await;
                if run.is_err() {
                    error!(url = %task.url, "Persist task panicked");
                    task.fail(&PersistError::Worker {
                        message: "persist task panicked".to_string(),
                    });
                }
                drop(permit);
            });
        }
        debug!("Persist worker loop stopped");
    }
}

impl JobContext {
    async fn run(&self, task: &Arc<PersistTask>) {
        let mut cancelled = task.state.subscribe();
        let fetched = tokio::select! {
            result = self.bytes_for(&task.url) => result,
            _ = cancelled.wait_for(|state| state.is_terminal()) => return,
        };

        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(e) => return task.fail(&PersistError::from(e)),
        };
        if task.is_terminal() {
            return;
        }

        let file_name = persist_file_name(&task.url, fetched.content_type.as_deref());
        let dest = self.dir.join(file_name);
        let dir = self.dir.clone();
        let bytes = fetched.bytes;
        let committing = task.clone();
        let target = dest.clone();
        let committed = tokio::task::spawn_blocking(move || {
            let pending = stage(&dir, &bytes)?;
            commit(&committing, pending, &target)
        })
        .await;

        match committed {
            Ok(Ok(true)) => {
                info!(url = %task.url, path = %dest.display(), "Image persisted");
                let listener = task.listener.clone();
                let reported =
                    std::panic::catch_unwind(AssertUnwindSafe(|| listener.on_success(&dest)));
                if reported.is_err() {
                    error!(url = %task.url, "Persist listener panicked");
                }
                task.finish(PersistState::Succeeded);
            }
            Ok(Ok(false)) => debug!(url = %task.url, "Persist task ended before commit"),
            Ok(Err(e)) => task.fail(&e),
            Err(e) => task.fail(&PersistError::Worker {
                message: e.to_string(),
            }),
        }
    }

    /// Full bytes from the DATA disk entry, else from the network.
    async fn bytes_for(&self, url: &str) -> Result<FetchedBytes, FetchError> {
        let key = CacheKey::source(url);
        let disk = self.caches.disk();

        match disk.get_bytes(&key).await {
            Ok(Some(bytes)) => {
                debug!(url, key = %key, "Persisting from data cache");
                return Ok(FetchedBytes {
                    bytes: Bytes::from(bytes),
                    content_type: None,
                });
            }
            Ok(None) => {}
            Err(e) => warn!(url, error = %e, "Data cache read failed, downloading"),
        }

        let fetched = self.fetcher.fetch(url).await?;
        if let Err(e) = disk.put_bytes(&key, &fetched.bytes).await {
            warn!(url, error = %e, "Failed to store downloaded bytes in data cache");
        }
        Ok(fetched)
    }
}

/// Writes `bytes` to a temporary file in `dir` and verifies its length.
fn stage(dir: &Path, bytes: &[u8]) -> Result<tempfile::NamedTempFile, PersistError> {
    std::fs::create_dir_all(dir)?;
    let mut pending = tempfile::Builder::new()
        .prefix(PENDING_PREFIX)
        .tempfile_in(dir)?;
    pending.write_all(bytes)?;
    pending.flush()?;
    pending.as_file().sync_all()?;

    let expected = bytes.len() as u64;
    let written = pending.as_file().metadata()?.len();
    if written != expected {
        return Err(PersistError::Incomplete { expected, written });
    }
    Ok(pending)
}

/// Renames `pending` to `dest` unless the task already ended.
///
/// Returns `Ok(false)` when the task was cancelled first; the temp file is
/// dropped and removed. On success the destination is recorded before the
/// commit lock is released, so `cancel` can no longer end the task.
fn commit(
    task: &PersistTask,
    pending: tempfile::NamedTempFile,
    dest: &Path,
) -> Result<bool, PersistError> {
    let mut committed = task.committed.lock();
    if task.is_terminal() {
        return Ok(false);
    }
    pending
        .persist_noclobber(dest)
        .map_err(|e| PersistError::Io(e.error))?;
    *task.destination.lock() = Some(dest.to_path_buf());
    *committed = true;
    Ok(true)
}

/// `<unix-millis>-<8 hex>.<ext>`.
fn persist_file_name(url: &str, content_type: Option<&str>) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let nonce = Uuid::new_v4().simple().to_string();
    let ext = extension_for(url, content_type);
    format!("{millis}-{}.{ext}", &nonce[..8])
}

/// File extension from the content type, then the URL, else `jpg`.
fn extension_for(url: &str, content_type: Option<&str>) -> String {
    let from_mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .and_then(ImageFormat::from_mime_type);

    let from_url = || {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let name = path.rsplit('/').next().unwrap_or(path);
        let (_, ext) = name.rsplit_once('.')?;
        ImageFormat::from_extension(ext).map(|_| ext.to_ascii_lowercase())
    };

    from_mime
        .and_then(|format| format.extensions_str().first().map(|ext| (*ext).to_string()))
        .or_else(from_url)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// The user's Pictures directory, else `<data_dir>/pictures`.
#[must_use]
pub fn default_persist_dir() -> PathBuf {
    UserDirs::new()
        .and_then(|dirs| dirs.picture_dir().map(|p| p.join("pictor")))
        .or_else(|| {
            ProjectDirs::from("com", "linuxmobile", "pictor").map(|p| p.data_dir().join("pictures"))
        })
        .unwrap_or_else(|| std::env::temp_dir().join("pictor-pictures"))
}
