//! In-memory remote store for end-to-end tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;

use media_dl::{CancelToken, ProgressFn, RemoteEntry, Result, Resume, TransferClient, TransferError};

const CHUNK: usize = 16 * 1024;

/// `TransferClient` backed by a path -> bytes map. Directory listings are
/// derived from the stored paths. Transfers move in 16 KiB chunks with a
/// cancel check between chunks; an optional gate holds the transfer after
/// its first chunk so tests can cancel mid-flight.
pub struct MockClient {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    gate: Mutex<Option<Arc<Notify>>>,
    buffer_gate: Mutex<Option<Arc<Notify>>>,
    buffer_calls: AtomicUsize,
    get_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    resume_offsets: Mutex<Vec<u64>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(BTreeMap::new()),
            gate: Mutex::new(None),
            buffer_gate: Mutex::new(None),
            buffer_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            resume_offsets: Mutex::new(Vec::new()),
        }
    }

    pub fn insert_file(&self, path: &str, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(path.to_string(), bytes);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    pub fn remote_file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn remote_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    /// Hold every subsequent `get` after its first chunk until canceled.
    pub fn hold_transfers(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    /// Stop holding transfers; subsequent `get`s run to completion.
    pub fn release_transfers(&self) {
        *self.gate.lock().unwrap() = None;
    }

    /// Hold every `get_buffer` until its cancel token fires.
    pub fn hold_buffers(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.buffer_gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn buffer_calls(&self) -> usize {
        self.buffer_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn resume_offsets(&self) -> Vec<u64> {
        self.resume_offsets.lock().unwrap().clone()
    }

    fn lookup(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| TransferError::File(path.to_string()))
    }
}

#[async_trait]
impl TransferClient for MockClient {
    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>> {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir.trim_end_matches('/'))
        };

        let mut entries: BTreeMap<String, RemoteEntry> = BTreeMap::new();
        for (path, bytes) in self.files.lock().unwrap().iter() {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                Some((segment, _)) => {
                    entries
                        .entry(segment.to_string())
                        .or_insert_with(|| RemoteEntry {
                            name: segment.to_string(),
                            size: 0,
                            is_dir: true,
                        });
                }
                None => {
                    entries.insert(
                        rest.to_string(),
                        RemoteEntry {
                            name: rest.to_string(),
                            size: bytes.len() as u64,
                            is_dir: false,
                        },
                    );
                }
            }
        }
        Ok(entries.into_values().collect())
    }

    async fn size(&self, path: &str) -> Result<u64> {
        Ok(self.lookup(path)?.len() as u64)
    }

    async fn get(
        &self,
        remote: &str,
        local: &Path,
        progress: Option<ProgressFn<'_>>,
        resume: Resume,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let active = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(active, Ordering::SeqCst);
        let result = self.get_inner(remote, local, progress, resume, cancel).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn get_buffer(&self, remote: &str, cancel: &CancelToken) -> Result<Vec<u8>> {
        self.buffer_calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_canceled() {
            return Err(TransferError::Canceled);
        }
        let gate = self.buffer_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            tokio::select! {
                _ = gate.notified() => {}
                _ = cancel.cancelled() => return Err(TransferError::Canceled),
            }
        }
        self.lookup(remote)
    }

    async fn put(
        &self,
        remote: &str,
        local: &Path,
        progress: Option<ProgressFn<'_>>,
        _resume: Resume,
        cancel: &CancelToken,
    ) -> Result<()> {
        if cancel.is_canceled() {
            return Err(TransferError::Canceled);
        }
        let bytes = tokio::fs::read(local)
            .await
            .map_err(|err| TransferError::File(err.to_string()))?;
        if let Some(progress) = progress {
            progress(100);
        }
        self.files.lock().unwrap().insert(remote.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| TransferError::File(path.to_string()))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        let bytes = files
            .remove(from)
            .ok_or_else(|| TransferError::File(from.to_string()))?;
        files.insert(to.to_string(), bytes);
        Ok(())
    }
}

impl MockClient {
    async fn get_inner(
        &self,
        remote: &str,
        local: &Path,
        progress: Option<ProgressFn<'_>>,
        resume: Resume,
        cancel: &CancelToken,
    ) -> Result<()> {
        let bytes = self.lookup(remote)?;
        let total = bytes.len() as u64;

        let offset = match resume {
            Resume::Continue => tokio::fs::metadata(local).await.map(|m| m.len()).unwrap_or(0),
            Resume::Restart => 0,
        };
        self.resume_offsets.lock().unwrap().push(offset);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(offset > 0)
            .truncate(offset == 0)
            .open(local)
            .await
            .map_err(|err| TransferError::File(err.to_string()))?;

        let mut written = offset;
        let mut first_chunk = true;
        while written < total {
            if cancel.is_canceled() {
                return Err(TransferError::Canceled);
            }
            if !first_chunk {
                let gate = self.gate.lock().unwrap().clone();
                if let Some(gate) = gate {
                    tokio::select! {
                        _ = gate.notified() => {}
                        _ = cancel.cancelled() => return Err(TransferError::Canceled),
                    }
                }
            }

            let end = (written as usize + CHUNK).min(bytes.len());
            file.write_all(&bytes[written as usize..end])
                .await
                .map_err(|err| TransferError::File(err.to_string()))?;
            written = end as u64;
            first_chunk = false;

            if let Some(progress) = progress {
                progress(((written * 100) / total.max(1)) as u8);
            }
            tokio::task::yield_now().await;
        }
        file.flush()
            .await
            .map_err(|err| TransferError::File(err.to_string()))?;
        Ok(())
    }
}
