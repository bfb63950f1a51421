//! Media downloader engine: catalog population plus the download/upload
//! queue.
//!
//! The engine spawns nothing. Both the queue worker and the asynchronous
//! catalog scan are handed out as futures the caller schedules on whatever
//! execution context it prefers; the engine only guarantees sequencing (one
//! transfer in flight, FIFO completions) and cooperative cancellation.

mod catalog;
mod queue;
mod worker;

pub use catalog::{MediaCatalog, ScanEvent, ScanObserver};
pub use queue::{CompletionListener, ProgressListener, TaskKind, TransferQueue, TransferTask};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use log::{debug, info, warn};
use tokio::sync::Mutex as AsyncMutex;

use crate::cancel::CancelToken;
use crate::client::{remote_join, Resume, TransferClient};
use crate::error::{Result, TransferError};
use crate::media::{MediaEntry, THUMB_DIR};

/// Engine tuning knobs.
#[derive(Debug, Clone, Default)]
pub struct MediasDownloaderConfig {
    /// When true, any failed thumbnail fetch fails the whole scan instead of
    /// yielding the entry with `thumbnail: None`.
    pub thumbnail_failure_fatal: bool,
}

/// Download/upload queue engine for one remote/local directory pair.
///
/// Obtained from [`crate::TransferManager::create_medias_downloader`]; the
/// manager enforces the `Closed -> Open -> Running -> Closed` lifecycle.
pub struct MediasDownloader {
    pub(crate) client: Arc<dyn TransferClient>,
    remote_dir: String,
    pub(crate) local_dir: PathBuf,
    config: MediasDownloaderConfig,
    catalog: MediaCatalog,
    pub(crate) queue: TransferQueue,
    pub(crate) queue_cancel: CancelToken,
    pub(crate) worker_running: AtomicBool,
    closed: AtomicBool,
    scan_gate: Arc<AsyncMutex<()>>,
    scan_cancel: Mutex<Option<CancelToken>>,
}

impl MediasDownloader {
    pub(crate) fn new(
        client: Arc<dyn TransferClient>,
        remote_dir: &str,
        local_dir: &Path,
        config: MediasDownloaderConfig,
    ) -> Result<Self> {
        if local_dir.as_os_str().is_empty() {
            return Err(TransferError::BadParameter("empty local directory"));
        }
        crate::fs::ensure_dir(local_dir)?;

        Ok(Self {
            client,
            remote_dir: remote_dir.to_string(),
            local_dir: local_dir.to_path_buf(),
            config,
            catalog: MediaCatalog::new(),
            queue: TransferQueue::new(),
            queue_cancel: CancelToken::new(),
            worker_running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            scan_gate: Arc::new(AsyncMutex::new(())),
            scan_cancel: Mutex::new(None),
        })
    }

    // --- catalog -----------------------------------------------------------

    /// Scan the remote store, blocking the calling context, and replace the
    /// catalog atomically on success. Returns the number of discovered
    /// medias. On error (including `Canceled`) the catalog keeps its
    /// pre-scan contents.
    pub async fn available_medias_sync(&self, with_thumbnails: bool) -> Result<usize> {
        let _gate = self
            .scan_gate
            .try_lock()
            .map_err(|_| TransferError::WorkerBusy)?;
        let cancel = self.arm_scan();

        let result = catalog::collect_medias(
            catalog::ScanParams {
                client: self.client.as_ref(),
                remote_dir: &self.remote_dir,
                local_dir: &self.local_dir,
                with_thumbnails,
                thumbnail_failure_fatal: self.config.thumbnail_failure_fatal,
                cancel: &cancel,
            },
            |_, _| {},
        )
        .await;
        self.disarm_scan();

        let entries = result?;
        let count = entries.len();
        info!("scan_sync_done: {} medias", count);
        self.catalog.replace(entries);
        Ok(count)
    }

    /// Hand out the asynchronous scan as a future for the caller to schedule.
    ///
    /// The catalog is cleared at scan start and appended to incrementally;
    /// `observer` receives one `Entry` per discovery (before the append),
    /// then a terminal `Done` or `Failed`.
    pub fn available_medias_async(
        self: &Arc<Self>,
        with_thumbnails: bool,
        observer: ScanObserver,
    ) -> BoxFuture<'static, ()> {
        let engine = Arc::clone(self);
        Box::pin(async move {
            engine.run_async_scan(with_thumbnails, observer).await;
        })
    }

    async fn run_async_scan(&self, with_thumbnails: bool, observer: ScanObserver) {
        let _gate = match self.scan_gate.try_lock() {
            Ok(gate) => gate,
            Err(_) => {
                observer(ScanEvent::Failed {
                    error: TransferError::WorkerBusy,
                });
                return;
            }
        };
        let cancel = self.arm_scan();
        self.catalog.clear();

        let result = catalog::collect_medias(
            catalog::ScanParams {
                client: self.client.as_ref(),
                remote_dir: &self.remote_dir,
                local_dir: &self.local_dir,
                with_thumbnails,
                thumbnail_failure_fatal: self.config.thumbnail_failure_fatal,
                cancel: &cancel,
            },
            |entry, index| {
                observer(ScanEvent::Entry {
                    entry: entry.clone(),
                    index,
                });
                self.catalog.push(entry);
            },
        )
        .await;
        self.disarm_scan();

        match result {
            Ok(entries) => {
                info!("scan_async_done: {} medias", entries.len());
                observer(ScanEvent::Done {
                    total: entries.len(),
                });
            }
            Err(error) => {
                warn!("scan_async_failed: {}", error);
                observer(ScanEvent::Failed { error });
            }
        }
    }

    /// Signal the active scan's cancellation token. `NotInitialized` when no
    /// scan is in flight.
    pub fn cancel_scan(&self) -> Result<()> {
        match self.scan_cancel.lock().unwrap().as_ref() {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(TransferError::NotInitialized),
        }
    }

    /// Random access into the catalog after a completed scan.
    pub fn media_at(&self, index: usize) -> Result<Arc<MediaEntry>> {
        self.catalog.entry_at(index)
    }

    pub fn media_count(&self) -> usize {
        self.catalog.len()
    }

    pub fn medias(&self) -> Vec<Arc<MediaEntry>> {
        self.catalog.snapshot()
    }

    /// Delete a media from the remote store (and its thumbnail, best-effort)
    /// and drop it from the catalog.
    pub async fn delete_media(&self, media: &MediaEntry) -> Result<()> {
        if media.remote_path.is_empty() {
            return Err(TransferError::BadParameter("media without remote path"));
        }
        self.client.delete(&media.remote_path).await?;

        let device_dir = remote_join(&self.remote_dir, &media.device);
        let thumb_path = remote_join(
            &remote_join(&device_dir, THUMB_DIR),
            &MediaEntry::thumbnail_name(&media.name),
        );
        if let Err(err) = self.client.delete(&thumb_path).await {
            debug!("delete_thumbnail_skipped: {} error={}", media.name, err);
        }

        self.catalog.remove(&media.device, &media.remote_path);
        Ok(())
    }

    // --- queue -------------------------------------------------------------

    /// Enqueue a download of `media`. Returns immediately; the transfer runs
    /// once the queue worker reaches it.
    pub fn add_media_to_queue(
        &self,
        media: Arc<MediaEntry>,
        resume: Resume,
        progress: Option<ProgressListener>,
        completion: Option<CompletionListener>,
    ) -> Result<()> {
        self.queue
            .push(TransferTask::download(media, resume, progress, completion))
    }

    /// Enqueue an upload of `media` (its `local_path` is the source).
    pub fn add_upload_to_queue(
        &self,
        media: Arc<MediaEntry>,
        resume: Resume,
        progress: Option<ProgressListener>,
        completion: Option<CompletionListener>,
    ) -> Result<()> {
        self.queue
            .push(TransferTask::upload(media, resume, progress, completion))
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// Hand out the queue worker as a future for the caller to schedule.
    /// The worker drains strictly FIFO, one task end-to-end at a time.
    /// `None` once the engine is closed.
    pub fn queue_runnable(self: &Arc<Self>) -> Option<BoxFuture<'static, ()>> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        let engine = Arc::clone(self);
        Some(Box::pin(async move {
            if let Err(err) = worker::run_queue(engine).await {
                warn!("queue_worker_refused: {}", err);
            }
        }))
    }

    /// Request cancellation of the queue: the in-flight transfer is asked to
    /// abort and every queued-but-not-started task receives a `Canceled`
    /// completion in FIFO order. Returns once the request is signaled; it
    /// does not wait for the in-flight abort.
    pub fn cancel_queue(&self) -> Result<()> {
        self.queue_cancel.cancel();
        // With a live worker the drain happens in its loop so completions
        // stay globally FIFO after the in-flight task's.
        if !self.worker_running.load(Ordering::SeqCst) {
            for task in self.queue.drain() {
                task.complete(Err(TransferError::Canceled));
            }
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker_running.load(Ordering::SeqCst)
    }

    // --- lifecycle ---------------------------------------------------------

    pub(crate) fn close(&self) -> Result<()> {
        if self.is_running() {
            return Err(TransferError::WorkerBusy);
        }
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.cancel_queue();
        if let Some(token) = self.scan_cancel.lock().unwrap().as_ref() {
            token.cancel();
        }
        self.catalog.clear();
        Ok(())
    }

    fn arm_scan(&self) -> CancelToken {
        let token = CancelToken::new();
        *self.scan_cancel.lock().unwrap() = Some(token.clone());
        token
    }

    fn disarm_scan(&self) {
        *self.scan_cancel.lock().unwrap() = None;
    }
}

impl std::fmt::Debug for MediasDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediasDownloader")
            .field("remote_dir", &self.remote_dir)
            .field("local_dir", &self.local_dir)
            .field("medias", &self.media_count())
            .field("queued", &self.queued_count())
            .field("running", &self.is_running())
            .finish()
    }
}
