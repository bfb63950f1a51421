//! Transfer engines for device media and telemetry over an FTP-like remote
//! store.
//!
//! The crate is a coordination library: it owns queues, catalogs, lifecycle
//! and cancellation, while the actual protocol I/O is injected through the
//! [`TransferClient`] trait. No task is ever spawned internally; every worker
//! is handed out as a boxed future (`runnable`) for the embedding application
//! to schedule on its own runtime.
//!
//! Entry point is [`TransferManager`], which opens and closes the four
//! engines:
//!
//! - [`MediasDownloader`]: media catalog scans plus a FIFO download/upload
//!   queue with staged files and resume.
//! - [`Downloader`] / [`Uploader`]: one-shot single-file transfers.
//! - [`DataDownloader`]: periodic background fetch of device telemetry.

mod cancel;
mod client;
mod error;
mod manager;
mod media;

pub mod fs;

pub mod data_sync;
pub mod media_downloader;
pub mod transfer;

pub use cancel::CancelToken;
pub use client::{ProgressFn, RemoteEntry, Resume, TransferClient};
pub use data_sync::{DataDownloader, DataSyncConfig, FileCompletionFn};
pub use error::{Result, TransferError};
pub use manager::TransferManager;
pub use media::MediaEntry;
pub use media_downloader::{
    CompletionListener, MediaCatalog, MediasDownloader, MediasDownloaderConfig, ProgressListener,
    ScanEvent, ScanObserver, TaskKind, TransferTask,
};
pub use transfer::{Downloader, TransferCompletionFn, TransferProgressFn, Uploader};
