//! Top-level engine container.
//!
//! A `TransferManager` owns at most one instance of each sub-engine. Engines
//! move through `Closed -> Open -> Running -> Closed`: `create_*` opens,
//! handing out a runnable and later awaiting it runs, `close_*` closes.
//! Closing an engine that was never opened is a no-op; closing one whose
//! worker is still draining fails with `WorkerBusy`.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use log::warn;

use crate::client::{Resume, TransferClient};
use crate::data_sync::{DataDownloader, DataSyncConfig, FileCompletionFn};
use crate::error::{Result, TransferError};
use crate::media_downloader::{MediasDownloader, MediasDownloaderConfig};
use crate::transfer::{Downloader, TransferCompletionFn, TransferProgressFn, Uploader};

lazy_static! {
    // Managers that still hold at least one open engine, by id.
    static ref OPEN_MANAGERS: Mutex<HashSet<u64>> = Mutex::new(HashSet::new());
}

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Container of the four transfer engines for one remote store connection.
pub struct TransferManager {
    id: u64,
    client: Arc<dyn TransferClient>,
    medias_downloader: Mutex<Option<Arc<MediasDownloader>>>,
    data_downloader: Mutex<Option<Arc<DataDownloader>>>,
    downloader: Mutex<Option<Arc<Downloader>>>,
    uploader: Mutex<Option<Arc<Uploader>>>,
}

impl TransferManager {
    pub fn new(client: Arc<dyn TransferClient>) -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            client,
            medias_downloader: Mutex::new(None),
            data_downloader: Mutex::new(None),
            downloader: Mutex::new(None),
            uploader: Mutex::new(None),
        }
    }

    // --- medias downloader --------------------------------------------------

    /// Open the queue engine. `AlreadyInitialized` when one is already open.
    pub fn create_medias_downloader(
        &self,
        remote_dir: &str,
        local_dir: &Path,
        config: MediasDownloaderConfig,
    ) -> Result<Arc<MediasDownloader>> {
        let mut slot = self.medias_downloader.lock().unwrap();
        if slot.is_some() {
            return Err(TransferError::AlreadyInitialized);
        }
        let engine = Arc::new(MediasDownloader::new(
            Arc::clone(&self.client),
            remote_dir,
            local_dir,
            config,
        )?);
        *slot = Some(Arc::clone(&engine));
        self.mark_open();
        Ok(engine)
    }

    pub fn medias_downloader(&self) -> Result<Arc<MediasDownloader>> {
        self.medias_downloader
            .lock()
            .unwrap()
            .clone()
            .ok_or(TransferError::NotInitialized)
    }

    /// Close the queue engine. Ok when none is open.
    pub fn close_medias_downloader(&self) -> Result<()> {
        let mut slot = self.medias_downloader.lock().unwrap();
        if let Some(engine) = slot.as_ref() {
            engine.close()?;
            *slot = None;
        }
        drop(slot);
        self.update_registry();
        Ok(())
    }

    // --- data downloader ----------------------------------------------------

    pub fn create_data_downloader(
        &self,
        remote_dir: &str,
        local_dir: &Path,
        config: DataSyncConfig,
        completion: Option<FileCompletionFn>,
    ) -> Result<Arc<DataDownloader>> {
        let mut slot = self.data_downloader.lock().unwrap();
        if slot.is_some() {
            return Err(TransferError::AlreadyInitialized);
        }
        let engine = Arc::new(DataDownloader::new(
            Arc::clone(&self.client),
            remote_dir,
            local_dir,
            config,
            completion,
        )?);
        *slot = Some(Arc::clone(&engine));
        self.mark_open();
        Ok(engine)
    }

    pub fn data_downloader(&self) -> Result<Arc<DataDownloader>> {
        self.data_downloader
            .lock()
            .unwrap()
            .clone()
            .ok_or(TransferError::NotInitialized)
    }

    pub fn close_data_downloader(&self) -> Result<()> {
        let mut slot = self.data_downloader.lock().unwrap();
        if let Some(engine) = slot.as_ref() {
            engine.close()?;
            *slot = None;
        }
        drop(slot);
        self.update_registry();
        Ok(())
    }

    // --- single-file engines ------------------------------------------------

    pub fn create_downloader(
        &self,
        remote_path: &str,
        local_path: &Path,
        resume: Resume,
        progress: Option<TransferProgressFn>,
        completion: Option<TransferCompletionFn>,
    ) -> Result<Arc<Downloader>> {
        let mut slot = self.downloader.lock().unwrap();
        if slot.is_some() {
            return Err(TransferError::AlreadyInitialized);
        }
        let engine = Arc::new(Downloader::new(
            Arc::clone(&self.client),
            remote_path,
            local_path,
            resume,
            progress,
            completion,
        )?);
        *slot = Some(Arc::clone(&engine));
        self.mark_open();
        Ok(engine)
    }

    pub fn downloader(&self) -> Result<Arc<Downloader>> {
        self.downloader
            .lock()
            .unwrap()
            .clone()
            .ok_or(TransferError::NotInitialized)
    }

    pub fn close_downloader(&self) -> Result<()> {
        let mut slot = self.downloader.lock().unwrap();
        if let Some(engine) = slot.as_ref() {
            engine.close()?;
            *slot = None;
        }
        drop(slot);
        self.update_registry();
        Ok(())
    }

    pub fn create_uploader(
        &self,
        remote_path: &str,
        local_path: &Path,
        resume: Resume,
        progress: Option<TransferProgressFn>,
        completion: Option<TransferCompletionFn>,
    ) -> Result<Arc<Uploader>> {
        let mut slot = self.uploader.lock().unwrap();
        if slot.is_some() {
            return Err(TransferError::AlreadyInitialized);
        }
        let engine = Arc::new(Uploader::new(
            Arc::clone(&self.client),
            remote_path,
            local_path,
            resume,
            progress,
            completion,
        )?);
        *slot = Some(Arc::clone(&engine));
        self.mark_open();
        Ok(engine)
    }

    pub fn uploader(&self) -> Result<Arc<Uploader>> {
        self.uploader
            .lock()
            .unwrap()
            .clone()
            .ok_or(TransferError::NotInitialized)
    }

    pub fn close_uploader(&self) -> Result<()> {
        let mut slot = self.uploader.lock().unwrap();
        if let Some(engine) = slot.as_ref() {
            engine.close()?;
            *slot = None;
        }
        drop(slot);
        self.update_registry();
        Ok(())
    }

    // --- lifecycle ----------------------------------------------------------

    /// Close every open engine. Safe to call repeatedly. All four closes are
    /// attempted even when one fails; the first error is returned.
    pub fn dispose(&self) -> Result<()> {
        [
            self.close_medias_downloader(),
            self.close_data_downloader(),
            self.close_downloader(),
            self.close_uploader(),
        ]
        .into_iter()
        .collect()
    }

    fn has_open_engine(&self) -> bool {
        self.medias_downloader.lock().unwrap().is_some()
            || self.data_downloader.lock().unwrap().is_some()
            || self.downloader.lock().unwrap().is_some()
            || self.uploader.lock().unwrap().is_some()
    }

    fn mark_open(&self) {
        OPEN_MANAGERS.lock().unwrap().insert(self.id);
    }

    fn update_registry(&self) {
        if !self.has_open_engine() {
            OPEN_MANAGERS.lock().unwrap().remove(&self.id);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_leak_tracked(&self) -> bool {
        OPEN_MANAGERS.lock().unwrap().contains(&self.id)
    }
}

impl Drop for TransferManager {
    fn drop(&mut self) {
        if OPEN_MANAGERS.lock().unwrap().remove(&self.id) {
            warn!("manager_dropped_with_open_engines: id={}", self.id);
        }
    }
}

impl std::fmt::Debug for TransferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferManager")
            .field("id", &self.id)
            .field(
                "medias_downloader",
                &self.medias_downloader.lock().unwrap().is_some(),
            )
            .field(
                "data_downloader",
                &self.data_downloader.lock().unwrap().is_some(),
            )
            .field("downloader", &self.downloader.lock().unwrap().is_some())
            .field("uploader", &self.uploader.lock().unwrap().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests_support::EmptyClient;

    fn manager() -> TransferManager {
        TransferManager::new(Arc::new(EmptyClient))
    }

    #[test]
    fn second_create_is_already_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager();
        manager
            .create_medias_downloader("", dir.path(), MediasDownloaderConfig::default())
            .unwrap();
        assert!(matches!(
            manager.create_medias_downloader("", dir.path(), MediasDownloaderConfig::default()),
            Err(TransferError::AlreadyInitialized)
        ));
    }

    #[test]
    fn accessor_before_create_is_not_initialized() {
        let manager = manager();
        assert!(matches!(
            manager.medias_downloader(),
            Err(TransferError::NotInitialized)
        ));
        assert!(matches!(
            manager.data_downloader(),
            Err(TransferError::NotInitialized)
        ));
    }

    #[test]
    fn close_without_create_is_ok_and_repeatable() {
        let manager = manager();
        manager.dispose().unwrap();
        manager.dispose().unwrap();
    }

    #[test]
    fn registry_tracks_open_engines() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager();
        assert!(!manager.is_leak_tracked());
        manager
            .create_medias_downloader("", dir.path(), MediasDownloaderConfig::default())
            .unwrap();
        assert!(manager.is_leak_tracked());
        manager.dispose().unwrap();
        assert!(!manager.is_leak_tracked());
    }

    #[tokio::test]
    async fn dispose_closes_remaining_engines_when_one_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager();
        let engine = manager
            .create_medias_downloader("", dir.path(), MediasDownloaderConfig::default())
            .unwrap();
        manager
            .create_downloader("dev0/media/a.jpg", &dir.path().join("a.jpg"), Resume::Restart, None, None)
            .unwrap();

        // Park a worker so the medias downloader refuses to close.
        let worker = tokio::spawn(engine.queue_runnable().unwrap());
        while !engine.is_running() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        assert!(matches!(manager.dispose(), Err(TransferError::WorkerBusy)));
        // The busy engine stays open, the idle one was still closed.
        assert!(manager.medias_downloader().is_ok());
        assert!(matches!(
            manager.downloader(),
            Err(TransferError::NotInitialized)
        ));

        engine.cancel_queue().unwrap();
        worker.await.unwrap();
        manager.dispose().unwrap();
    }

    #[test]
    fn create_after_close_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager();
        manager
            .create_medias_downloader("", dir.path(), MediasDownloaderConfig::default())
            .unwrap();
        manager.close_medias_downloader().unwrap();
        manager
            .create_medias_downloader("", dir.path(), MediasDownloaderConfig::default())
            .unwrap();
    }
}
