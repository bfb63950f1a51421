//! In-memory media catalog and the remote scan that populates it.
//!
//! The remote layout is one directory per device under the remote root, each
//! holding a `media/` directory (the assets) and a `thumb/` directory
//! (pre-rendered thumbnails). Entry sizes come from the directory listing;
//! a per-file size round-trip per entry is far too slow on these links.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, RwLock};

use log::debug;

use crate::cancel::CancelToken;
use crate::client::{remote_join, TransferClient};
use crate::error::{Result, TransferError};
use crate::media::{MediaEntry, MEDIA_DIR, THUMB_DIR};

/// One notification of an asynchronous scan.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A media was discovered; emitted before the entry is appended to the
    /// catalog, in discovery order.
    Entry {
        entry: Arc<MediaEntry>,
        index: usize,
    },
    /// Terminal: the scan walked the whole store.
    Done { total: usize },
    /// Terminal: the scan stopped on an error (including `Canceled`).
    Failed { error: TransferError },
}

/// Observer for asynchronous scans.
pub type ScanObserver = Arc<dyn Fn(ScanEvent) + Send + Sync>;

/// Ordered, indexed collection of discovered media.
///
/// Appends are atomic with respect to concurrent index/length reads; no two
/// entries share `(device, remote_path)`.
pub struct MediaCatalog {
    entries: RwLock<Vec<Arc<MediaEntry>>>,
}

impl MediaCatalog {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Random access into the materialized catalog.
    pub fn entry_at(&self, index: usize) -> Result<Arc<MediaEntry>> {
        self.entries
            .read()
            .unwrap()
            .get(index)
            .cloned()
            .ok_or(TransferError::BadParameter("catalog index out of bounds"))
    }

    pub fn snapshot(&self) -> Vec<Arc<MediaEntry>> {
        self.entries.read().unwrap().clone()
    }

    /// Replace the whole catalog (synchronous scan commit).
    pub fn replace(&self, entries: Vec<Arc<MediaEntry>>) {
        *self.entries.write().unwrap() = entries;
    }

    /// Append one entry; rejects duplicates of `(device, remote_path)`.
    pub fn push(&self, entry: Arc<MediaEntry>) -> bool {
        let mut entries = self.entries.write().unwrap();
        if entries.iter().any(|e| e.key() == entry.key()) {
            return false;
        }
        entries.push(entry);
        true
    }

    /// Drop the entry with the given identity, if present.
    pub fn remove(&self, device: &str, remote_path: &str) -> bool {
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|e| e.key() != (device, remote_path));
        entries.len() != before
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }
}

impl Default for MediaCatalog {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct ScanParams<'a> {
    pub client: &'a dyn TransferClient,
    pub remote_dir: &'a str,
    pub local_dir: &'a Path,
    pub with_thumbnails: bool,
    pub thumbnail_failure_fatal: bool,
    pub cancel: &'a CancelToken,
}

/// Walk the remote store and build the discovered entries in order.
///
/// `sink` is invoked once per accepted entry, before the entry is added to
/// the returned list (asynchronous scans append to the catalog from there).
/// Stops with `Canceled` as soon as the token fires; the caller decides what
/// to do with partial results.
pub(crate) async fn collect_medias(
    params: ScanParams<'_>,
    mut sink: impl FnMut(Arc<MediaEntry>, usize),
) -> Result<Vec<Arc<MediaEntry>>> {
    let mut discovered: Vec<Arc<MediaEntry>> = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    let devices = params.client.list(params.remote_dir).await?;
    for device in devices.iter().filter(|e| e.is_dir) {
        if params.cancel.is_canceled() {
            return Err(TransferError::Canceled);
        }

        let device_dir = remote_join(params.remote_dir, &device.name);
        let media_dir = remote_join(&device_dir, MEDIA_DIR);
        let listing = match params.client.list(&media_dir).await {
            Ok(listing) => listing,
            Err(err) => {
                // Devices without a media directory are not an error.
                debug!("scan_skip_device: {} error={}", device.name, err);
                continue;
            }
        };

        for file in listing.iter().filter(|e| !e.is_dir) {
            if params.cancel.is_canceled() {
                return Err(TransferError::Canceled);
            }
            if !MediaEntry::has_media_extension(&file.name) {
                continue;
            }

            let remote_path = remote_join(&media_dir, &file.name);
            let key = (device.name.clone(), remote_path.clone());
            if !seen.insert(key) {
                continue;
            }

            let thumbnail = if params.with_thumbnails {
                let thumb_path = remote_join(
                    &remote_join(&device_dir, THUMB_DIR),
                    &MediaEntry::thumbnail_name(&file.name),
                );
                match params.client.get_buffer(&thumb_path, params.cancel).await {
                    Ok(bytes) => Some(bytes),
                    Err(TransferError::Canceled) => return Err(TransferError::Canceled),
                    Err(err) if params.thumbnail_failure_fatal => return Err(err),
                    Err(err) => {
                        debug!("scan_thumbnail_missing: {} error={}", file.name, err);
                        None
                    }
                }
            } else {
                None
            };

            let entry = Arc::new(MediaEntry {
                device: device.name.clone(),
                name: file.name.clone(),
                remote_path,
                local_path: Some(params.local_dir.join(&file.name)),
                date: MediaEntry::date_from_name(&file.name),
                size: file.size,
                uuid: None,
                thumbnail,
            });

            sink(entry.clone(), discovered.len());
            discovered.push(entry);
        }
    }

    Ok(discovered)
}
