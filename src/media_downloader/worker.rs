//! Queue worker: drains the transfer queue strictly FIFO, one task at a time.
//!
//! Downloads are staged under a `downloading_` prefix and renamed into place
//! on success, so an interrupted transfer leaves a resumable partial file
//! and never a half-written final file.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::{info, warn};

use crate::client::Resume;
use crate::error::{Result, TransferError};
use crate::fs;
use crate::media::DOWNLOADING_PREFIX;

use super::queue::{TaskKind, TransferTask};
use super::MediasDownloader;

/// Queue worker entry-point. Runs until the engine's cycle token is signaled,
/// then drains still-queued tasks with a `Canceled` completion each, in FIFO
/// order.
///
/// Fails fast with `WorkerAlreadyRunning` when a worker is already draining
/// this engine, and with `Canceled` when the cycle token fired before the
/// worker started (queued tasks are drained in that case too).
pub(crate) async fn run_queue(engine: Arc<MediasDownloader>) -> Result<()> {
    if engine.worker_running.swap(true, Ordering::SeqCst) {
        return Err(TransferError::WorkerAlreadyRunning);
    }

    let already_canceled = engine.queue_cancel.is_canceled();
    if !already_canceled {
        info!("queue_worker_start");
        while let Some(task) = engine.queue.pop_wait(&engine.queue_cancel).await {
            let label = task.media.name.clone();
            let result = execute_task(&engine, &task).await;
            match &result {
                Ok(()) => info!("queue_task_done: {}", label),
                Err(err) if err.is_canceled() => info!("queue_task_canceled: {}", label),
                Err(err) => warn!("queue_task_failed: {} error={}", label, err),
            }
            task.complete(result);
        }
    }

    for task in engine.queue.drain() {
        task.complete(Err(TransferError::Canceled));
    }

    engine.worker_running.store(false, Ordering::SeqCst);
    info!("queue_worker_exit");

    if already_canceled {
        Err(TransferError::Canceled)
    } else {
        Ok(())
    }
}

async fn execute_task(engine: &MediasDownloader, task: &TransferTask) -> Result<()> {
    match task.kind {
        TaskKind::Download => download_media(engine, task).await,
        TaskKind::Upload => upload_media(engine, task).await,
    }
}

/// Download one media into its staging path, then rename into place.
async fn download_media(engine: &MediasDownloader, task: &TransferTask) -> Result<()> {
    let media = &task.media;
    let final_path = media
        .local_path
        .clone()
        .ok_or(TransferError::BadParameter("media without local path"))?;
    let staging = engine
        .local_dir
        .join(format!("{}{}", DOWNLOADING_PREFIX, media.name));

    // Resume only when the caller asked for it and a partial actually exists.
    let staged_len = tokio::fs::metadata(&staging)
        .await
        .map(|m| m.len())
        .unwrap_or(0);
    let resume = if task.resume == Resume::Continue && staged_len > 0 {
        Resume::Continue
    } else {
        Resume::Restart
    };

    let progress = |percent: u8| {
        if let Some(listener) = &task.progress {
            listener(&task.media, percent);
        }
    };
    engine
        .client
        .get(
            &media.remote_path,
            &staging,
            Some(&progress),
            resume,
            &engine.queue_cancel,
        )
        .await?;

    fs::rename(&staging, &final_path)
        .await
        .map_err(|err| TransferError::File(err.to_string()))?;
    Ok(())
}

async fn upload_media(engine: &MediasDownloader, task: &TransferTask) -> Result<()> {
    let media = &task.media;
    let local = media
        .local_path
        .clone()
        .ok_or(TransferError::BadParameter("media without local path"))?;

    let progress = |percent: u8| {
        if let Some(listener) = &task.progress {
            listener(&task.media, percent);
        }
    };
    engine
        .client
        .put(
            &media.remote_path,
            &local,
            Some(&progress),
            task.resume,
            &engine.queue_cancel,
        )
        .await
}
