//! Background telemetry fetch.
//!
//! Devices drop small telemetry files (`.pud` by default) into a data
//! directory on the remote store. The `DataDownloader` runnable polls that
//! directory, claims files by renaming them under the `downloading_` prefix,
//! downloads and then deletes them remotely, and keeps the local data
//! directory under a configured fraction of the volume.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use log::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::client::{remote_join, Resume, TransferClient};
use crate::error::{Result, TransferError};
use crate::fs;
use crate::media::DOWNLOADING_PREFIX;

/// Per-file completion callback: file name plus transfer outcome.
pub type FileCompletionFn = Box<dyn Fn(&str, Result<()>) + Send + Sync>;

/// Data-sync tuning knobs.
#[derive(Debug, Clone)]
pub struct DataSyncConfig {
    /// Remote directory holding the telemetry files, under the remote root.
    pub data_dir_name: String,
    /// Extension of the files to fetch, without the dot.
    pub extension: String,
    /// Pause between two sync passes.
    pub interval: Duration,
    /// Local data directory may occupy at most this fraction of its volume
    /// before the oldest files are purged.
    pub space_fraction: f64,
}

impl Default for DataSyncConfig {
    fn default() -> Self {
        Self {
            data_dir_name: "academy".to_string(),
            extension: "pud".to_string(),
            interval: Duration::from_secs(5),
            space_fraction: 0.20,
        }
    }
}

/// Periodic telemetry downloader.
///
/// Obtained from [`crate::TransferManager::create_data_downloader`]. The
/// runnable loops until canceled; per-file failures are reported through the
/// completion callback and never stop the loop.
pub struct DataDownloader {
    client: Arc<dyn TransferClient>,
    remote_data_dir: String,
    local_dir: PathBuf,
    config: DataSyncConfig,
    completion: Option<FileCompletionFn>,
    cancel: CancelToken,
    running: AtomicBool,
    closed: AtomicBool,
}

impl DataDownloader {
    pub(crate) fn new(
        client: Arc<dyn TransferClient>,
        remote_dir: &str,
        local_dir: &std::path::Path,
        config: DataSyncConfig,
        completion: Option<FileCompletionFn>,
    ) -> Result<Self> {
        if local_dir.as_os_str().is_empty() {
            return Err(TransferError::BadParameter("empty local directory"));
        }
        fs::ensure_dir(local_dir)?;

        Ok(Self {
            client,
            remote_data_dir: remote_join(remote_dir, &config.data_dir_name),
            local_dir: local_dir.to_path_buf(),
            config,
            completion,
            cancel: CancelToken::new(),
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Count remote telemetry files not yet claimed by any downloader.
    pub async fn available_files(&self) -> Result<u64> {
        let listing = self.client.list(&self.remote_data_dir).await?;
        let count = listing
            .iter()
            .filter(|e| {
                !e.is_dir
                    && self.matches_extension(&e.name)
                    && !e.name.starts_with(DOWNLOADING_PREFIX)
            })
            .count();
        Ok(count as u64)
    }

    /// The sync loop as a future for the caller to schedule. `None` once the
    /// engine is closed.
    pub fn runnable(self: &Arc<Self>) -> Option<BoxFuture<'static, ()>> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        let engine = Arc::clone(self);
        Some(Box::pin(async move {
            if let Err(err) = engine.run_loop().await {
                warn!("data_sync_refused: {}", err);
            }
        }))
    }

    async fn run_loop(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(TransferError::WorkerAlreadyRunning);
        }
        info!("data_sync_start: {}", self.remote_data_dir);

        while !self.cancel.is_canceled() {
            if let Err(err) = self.sync_pass().await {
                if err.is_canceled() {
                    break;
                }
                debug!("data_sync_pass_failed: {}", err);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("data_sync_exit");
        Ok(())
    }

    /// One pass: resume claimed files first, then claim and fetch fresh ones,
    /// then enforce the space limit.
    async fn sync_pass(&self) -> Result<()> {
        let listing = self.client.list(&self.remote_data_dir).await?;

        for entry in listing.iter().filter(|e| !e.is_dir) {
            if self.cancel.is_canceled() {
                return Err(TransferError::Canceled);
            }
            let Some(name) = entry.name.strip_prefix(DOWNLOADING_PREFIX) else {
                continue;
            };
            if !self.matches_extension(name) {
                continue;
            }
            let result = self.fetch_claimed(&entry.name, name).await;
            if result.as_ref().is_err_and(|e| e.is_canceled()) {
                return Err(TransferError::Canceled);
            }
            self.report(name, result);
        }

        for entry in listing.iter().filter(|e| !e.is_dir) {
            if self.cancel.is_canceled() {
                return Err(TransferError::Canceled);
            }
            if entry.name.starts_with(DOWNLOADING_PREFIX) || !self.matches_extension(&entry.name) {
                continue;
            }
            let result = self.fetch_fresh(&entry.name).await;
            if result.as_ref().is_err_and(|e| e.is_canceled()) {
                return Err(TransferError::Canceled);
            }
            self.report(&entry.name, result);
        }

        match fs::purge_oldest(&self.local_dir, &self.config.extension, self.config.space_fraction)
            .await
        {
            Ok(0) => {}
            Ok(deleted) => info!("data_sync_purged: {} files", deleted),
            Err(err) => debug!("data_sync_purge_failed: {}", err),
        }
        Ok(())
    }

    /// Finish a file some earlier pass already claimed.
    async fn fetch_claimed(&self, claimed_name: &str, final_name: &str) -> Result<()> {
        let remote = remote_join(&self.remote_data_dir, claimed_name);
        let staging = self.local_dir.join(claimed_name);

        self.client
            .get(&remote, &staging, None, Resume::Continue, &self.cancel)
            .await?;
        self.client.delete(&remote).await?;
        fs::rename(&staging, &self.local_dir.join(final_name)).await?;
        Ok(())
    }

    /// Claim a fresh file by remote rename, then fetch it.
    async fn fetch_fresh(&self, name: &str) -> Result<()> {
        let claimed_name = format!("{}{}", DOWNLOADING_PREFIX, name);
        let remote = remote_join(&self.remote_data_dir, name);
        let claimed = remote_join(&self.remote_data_dir, &claimed_name);

        self.client.rename(&remote, &claimed).await?;

        let staging = self.local_dir.join(&claimed_name);
        self.client
            .get(&claimed, &staging, None, Resume::Restart, &self.cancel)
            .await?;
        self.client.delete(&claimed).await?;
        fs::rename(&staging, &self.local_dir.join(name)).await?;
        Ok(())
    }

    fn report(&self, name: &str, result: Result<()>) {
        match &result {
            Ok(()) => info!("data_sync_file_done: {}", name),
            Err(err) => warn!("data_sync_file_failed: {} error={}", name, err),
        }
        if let Some(completion) = &self.completion {
            completion(name, result);
        }
    }

    fn matches_extension(&self, name: &str) -> bool {
        std::path::Path::new(name)
            .extension()
            .map_or(false, |ext| ext == self.config.extension.as_str())
    }

    /// Ask the loop to stop after the current file.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn close(&self) -> Result<()> {
        if self.is_running() {
            return Err(TransferError::WorkerBusy);
        }
        self.closed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        Ok(())
    }
}

impl std::fmt::Debug for DataDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataDownloader")
            .field("remote_data_dir", &self.remote_data_dir)
            .field("local_dir", &self.local_dir)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests_support::EmptyClient;

    fn engine(dir: &std::path::Path) -> DataDownloader {
        DataDownloader::new(
            Arc::new(EmptyClient),
            "",
            dir,
            DataSyncConfig::default(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn default_config_matches_device_conventions() {
        let config = DataSyncConfig::default();
        assert_eq!(config.data_dir_name, "academy");
        assert_eq!(config.extension, "pud");
        assert_eq!(config.interval, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn available_files_skips_claimed_and_foreign_names() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        // EmptyClient lists nothing.
        assert_eq!(engine.available_files().await.unwrap(), 0);
        assert!(engine.matches_extension("flight.pud"));
        assert!(!engine.matches_extension("flight.jpg"));
        assert!(!engine.matches_extension("pud"));
    }

    #[tokio::test]
    async fn canceled_loop_exits_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(engine(dir.path()));
        engine.cancel();
        engine.runnable().unwrap().await;
        assert!(!engine.is_running());
    }

    #[test]
    fn closed_engine_hands_out_no_runnable() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(engine(dir.path()));
        assert!(engine.runnable().is_some());
        engine.close().unwrap();
        assert!(engine.runnable().is_none());
    }
}
