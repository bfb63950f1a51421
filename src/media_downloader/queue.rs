//! FIFO transfer queue.
//!
//! Tasks are owned exclusively by the queue from enqueue until a worker pops
//! them; the caller keeps only its listener closures. The queue itself never
//! executes anything; draining is the worker's job (one task in flight at a
//! time, see `worker.rs`).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::Notify;

use crate::cancel::CancelToken;
use crate::client::Resume;
use crate::error::{Result, TransferError};
use crate::media::MediaEntry;

/// Direction of one queued transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskKind {
    #[serde(rename = "download")]
    Download,
    #[serde(rename = "upload")]
    Upload,
}

/// Per-task progress listener: `(media, percent)`.
pub type ProgressListener = Box<dyn Fn(&MediaEntry, u8) + Send + Sync>;
/// Per-task completion listener, fired exactly once with the task outcome.
pub type CompletionListener = Box<dyn FnOnce(&MediaEntry, Result<()>) + Send + Sync>;

/// One queued unit of work.
pub struct TransferTask {
    pub kind: TaskKind,
    pub media: Arc<MediaEntry>,
    pub resume: Resume,
    pub progress: Option<ProgressListener>,
    completion: Option<CompletionListener>,
}

impl TransferTask {
    pub fn download(
        media: Arc<MediaEntry>,
        resume: Resume,
        progress: Option<ProgressListener>,
        completion: Option<CompletionListener>,
    ) -> Self {
        Self {
            kind: TaskKind::Download,
            media,
            resume,
            progress,
            completion,
        }
    }

    pub fn upload(
        media: Arc<MediaEntry>,
        resume: Resume,
        progress: Option<ProgressListener>,
        completion: Option<CompletionListener>,
    ) -> Self {
        Self {
            kind: TaskKind::Upload,
            media,
            resume,
            progress,
            completion,
        }
    }

    /// Fire the completion listener with the task outcome. Consumes the task
    /// so it can only ever fire once.
    pub fn complete(mut self, result: Result<()>) {
        if let Some(completion) = self.completion.take() {
            completion(&self.media, result);
        }
    }
}

impl std::fmt::Debug for TransferTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferTask")
            .field("kind", &self.kind)
            .field("media", &self.media.name)
            .field("resume", &self.resume)
            .finish()
    }
}

/// Ordered task collection, drained by at most one worker.
pub struct TransferQueue {
    tasks: Mutex<VecDeque<TransferTask>>,
    notify: Notify,
}

impl TransferQueue {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a task to the tail. Returns immediately; `BadParameter` when
    /// the task's subject is missing a required path.
    pub fn push(&self, task: TransferTask) -> Result<()> {
        if task.media.remote_path.is_empty() {
            return Err(TransferError::BadParameter("task without remote path"));
        }
        if task.media.local_path.is_none() {
            return Err(TransferError::BadParameter("task without local path"));
        }
        self.tasks.lock().unwrap().push_back(task);
        self.notify.notify_one();
        Ok(())
    }

    pub fn pop(&self) -> Option<TransferTask> {
        self.tasks.lock().unwrap().pop_front()
    }

    /// Await the next task, or `None` once `cancel` is signaled.
    pub async fn pop_wait(&self, cancel: &CancelToken) -> Option<TransferTask> {
        loop {
            let notified = self.notify.notified();
            if cancel.is_canceled() {
                return None;
            }
            if let Some(task) = self.pop() {
                return Some(task);
            }
            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Remove every queued task, preserving FIFO order.
    pub fn drain(&self) -> Vec<TransferTask> {
        self.tasks.lock().unwrap().drain(..).collect()
    }
}

impl Default for TransferQueue {
    fn default() -> Self {
        Self::new()
    }
}
