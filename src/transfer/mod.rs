//! Single-file transfer engines.
//!
//! `Downloader` and `Uploader` carry exactly one transfer each: the path
//! pair, listeners and resume policy are fixed at construction, and the
//! runnable performs the transfer once and fires the completion listener
//! with the outcome (`Canceled` included). They share the lifecycle of the
//! queue engine but have no queue of their own.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use log::{info, warn};

use crate::cancel::CancelToken;
use crate::client::{Resume, TransferClient};
use crate::error::{Result, TransferError};

/// Progress listener for a single-file transfer.
pub type TransferProgressFn = Box<dyn Fn(u8) + Send + Sync>;
/// Completion listener for a single-file transfer, fired exactly once.
pub type TransferCompletionFn = Box<dyn FnOnce(Result<()>) + Send>;

enum Direction {
    Download,
    Upload,
}

/// Shared core of the two engines.
struct FileTransfer {
    client: Arc<dyn TransferClient>,
    direction: Direction,
    remote_path: String,
    local_path: PathBuf,
    resume: Resume,
    progress: Option<TransferProgressFn>,
    completion: Mutex<Option<TransferCompletionFn>>,
    cancel: CancelToken,
    running: AtomicBool,
    closed: AtomicBool,
}

impl FileTransfer {
    fn new(
        client: Arc<dyn TransferClient>,
        direction: Direction,
        remote_path: &str,
        local_path: &Path,
        resume: Resume,
        progress: Option<TransferProgressFn>,
        completion: Option<TransferCompletionFn>,
    ) -> Result<Self> {
        if remote_path.is_empty() {
            return Err(TransferError::BadParameter("empty remote path"));
        }
        if local_path.as_os_str().is_empty() {
            return Err(TransferError::BadParameter("empty local path"));
        }
        Ok(Self {
            client,
            direction,
            remote_path: remote_path.to_string(),
            local_path: local_path.to_path_buf(),
            resume,
            progress,
            completion: Mutex::new(completion),
            cancel: CancelToken::new(),
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    async fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(TransferError::WorkerAlreadyRunning);
        }

        let result = if self.cancel.is_canceled() {
            Err(TransferError::Canceled)
        } else {
            let progress = |percent: u8| {
                if let Some(listener) = &self.progress {
                    listener(percent);
                }
            };
            match self.direction {
                Direction::Download => {
                    self.client
                        .get(
                            &self.remote_path,
                            &self.local_path,
                            Some(&progress),
                            self.resume,
                            &self.cancel,
                        )
                        .await
                }
                Direction::Upload => {
                    self.client
                        .put(
                            &self.remote_path,
                            &self.local_path,
                            Some(&progress),
                            self.resume,
                            &self.cancel,
                        )
                        .await
                }
            }
        };

        match &result {
            Ok(()) => info!("transfer_done: {}", self.remote_path),
            Err(err) if err.is_canceled() => info!("transfer_canceled: {}", self.remote_path),
            Err(err) => warn!("transfer_failed: {} error={}", self.remote_path, err),
        }
        if let Some(completion) = self.completion.lock().unwrap().take() {
            completion(result.clone());
        }
        self.running.store(false, Ordering::SeqCst);
        result
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) -> Result<()> {
        if self.is_running() {
            return Err(TransferError::WorkerBusy);
        }
        self.closed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        Ok(())
    }
}

/// One-shot download of a single remote file.
pub struct Downloader {
    inner: FileTransfer,
}

impl Downloader {
    pub(crate) fn new(
        client: Arc<dyn TransferClient>,
        remote_path: &str,
        local_path: &Path,
        resume: Resume,
        progress: Option<TransferProgressFn>,
        completion: Option<TransferCompletionFn>,
    ) -> Result<Self> {
        Ok(Self {
            inner: FileTransfer::new(
                client,
                Direction::Download,
                remote_path,
                local_path,
                resume,
                progress,
                completion,
            )?,
        })
    }

    /// The transfer as a future for the caller to schedule. Runs once;
    /// `None` once the engine is closed.
    pub fn runnable(self: &Arc<Self>) -> Option<BoxFuture<'static, ()>> {
        if self.inner.is_closed() {
            return None;
        }
        let engine = Arc::clone(self);
        Some(Box::pin(async move {
            if let Err(err) = engine.inner.run().await {
                if matches!(err, TransferError::WorkerAlreadyRunning) {
                    warn!("transfer_refused: {}", err);
                }
            }
        }))
    }

    /// Ask the in-flight transfer to abort. Cancellation is a request, not a
    /// synchronous guarantee.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    pub(crate) fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

/// One-shot upload of a single local file.
pub struct Uploader {
    inner: FileTransfer,
}

impl Uploader {
    pub(crate) fn new(
        client: Arc<dyn TransferClient>,
        remote_path: &str,
        local_path: &Path,
        resume: Resume,
        progress: Option<TransferProgressFn>,
        completion: Option<TransferCompletionFn>,
    ) -> Result<Self> {
        Ok(Self {
            inner: FileTransfer::new(
                client,
                Direction::Upload,
                remote_path,
                local_path,
                resume,
                progress,
                completion,
            )?,
        })
    }

    /// `None` once the engine is closed.
    pub fn runnable(self: &Arc<Self>) -> Option<BoxFuture<'static, ()>> {
        if self.inner.is_closed() {
            return None;
        }
        let engine = Arc::clone(self);
        Some(Box::pin(async move {
            if let Err(err) = engine.inner.run().await {
                if matches!(err, TransferError::WorkerAlreadyRunning) {
                    warn!("transfer_refused: {}", err);
                }
            }
        }))
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    pub(crate) fn close(&self) -> Result<()> {
        self.inner.close()
    }
}
