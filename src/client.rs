//! Remote-store capability boundary.
//!
//! The engines in this crate never open sockets themselves: the protocol
//! client (FTP or similar) is injected at construction as a [`TransferClient`]
//! trait object. Every long-running operation takes the caller's
//! [`CancelToken`] and is expected to check it between chunks.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;

/// Byte-level progress callback, as a percentage of the whole transfer.
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// Resume policy for a single transfer.
///
/// `Continue` relies on the collaborator to determine the resume offset from
/// the partially written local (or remote) file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resume {
    #[serde(rename = "restart")]
    Restart,
    #[serde(rename = "continue")]
    Continue,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    /// Device-reported size in bytes; zero for directories.
    pub size: u64,
    pub is_dir: bool,
}

/// One network operation against the remote store.
///
/// Implementations may fail with `Protocol` (remote-store failure), `File`
/// (missing file) or `Canceled`, and must abort promptly once the passed
/// token is signaled.
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Ordered listing of one remote directory.
    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>>;

    /// Size of one remote file in bytes.
    async fn size(&self, path: &str) -> Result<u64>;

    /// Download `remote` into the local file at `local`.
    async fn get(
        &self,
        remote: &str,
        local: &Path,
        progress: Option<ProgressFn<'_>>,
        resume: Resume,
        cancel: &CancelToken,
    ) -> Result<()>;

    /// Download a small remote object (thumbnails) straight into memory.
    async fn get_buffer(&self, remote: &str, cancel: &CancelToken) -> Result<Vec<u8>>;

    /// Upload the local file at `local` to `remote`.
    async fn put(
        &self,
        remote: &str,
        local: &Path,
        progress: Option<ProgressFn<'_>>,
        resume: Resume,
        cancel: &CancelToken,
    ) -> Result<()>;

    /// Delete one remote file.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Rename a remote file in place (used to claim files for download).
    async fn rename(&self, from: &str, to: &str) -> Result<()>;
}

/// Join two remote path segments with a single `/`.
pub(crate) fn remote_join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use crate::error::TransferError;

    /// Client for lifecycle tests that never touch the network: every
    /// operation reports an empty store.
    pub(crate) struct EmptyClient;

    #[async_trait]
    impl TransferClient for EmptyClient {
        async fn list(&self, _dir: &str) -> Result<Vec<RemoteEntry>> {
            Ok(Vec::new())
        }

        async fn size(&self, path: &str) -> Result<u64> {
            Err(TransferError::File(path.to_string()))
        }

        async fn get(
            &self,
            remote: &str,
            _local: &Path,
            _progress: Option<ProgressFn<'_>>,
            _resume: Resume,
            _cancel: &CancelToken,
        ) -> Result<()> {
            Err(TransferError::File(remote.to_string()))
        }

        async fn get_buffer(&self, remote: &str, _cancel: &CancelToken) -> Result<Vec<u8>> {
            Err(TransferError::File(remote.to_string()))
        }

        async fn put(
            &self,
            remote: &str,
            _local: &Path,
            _progress: Option<ProgressFn<'_>>,
            _resume: Resume,
            _cancel: &CancelToken,
        ) -> Result<()> {
            Err(TransferError::File(remote.to_string()))
        }

        async fn delete(&self, path: &str) -> Result<()> {
            Err(TransferError::File(path.to_string()))
        }

        async fn rename(&self, from: &str, _to: &str) -> Result<()> {
            Err(TransferError::File(from.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::remote_join;

    #[test]
    fn remote_join_handles_empty_and_trailing_slash() {
        assert_eq!(remote_join("", "dev0"), "dev0");
        assert_eq!(remote_join("root", "dev0"), "root/dev0");
        assert_eq!(remote_join("root/", "dev0"), "root/dev0");
    }
}
