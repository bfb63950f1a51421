//! Local filesystem capability: free-space probing, rename with cross-device
//! fallback, and the purge policy that keeps the telemetry directory from
//! filling the volume.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, warn};

use crate::error::{Result, TransferError};

/// Create `dir` and its parents if missing. Synchronous: engines call it at
/// construction, before any worker runs.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

pub async fn remove_file(path: &Path) -> Result<()> {
    tokio::fs::remove_file(path).await?;
    Ok(())
}

/// Total size in bytes of the regular files directly under `dir`.
pub async fn dir_size(dir: &Path) -> Result<u64> {
    let mut total = 0u64;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if meta.is_file() {
            total += meta.len();
        }
    }
    Ok(total)
}

/// Rename `from` to `to`, falling back to copy + remove when the OS rejects
/// the rename (cross-device moves).
pub async fn rename(from: &Path, to: &Path) -> Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(err) => {
            debug!("fs_rename_fallback: {} error={}", from.display(), err);
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await?;
            Ok(())
        }
    }
}

/// Available bytes on the volume holding `dir`.
///
/// Matches `dir` against the longest mount point that prefixes it.
pub fn free_space(dir: &Path) -> Result<u64> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let mut best: Option<(usize, u64)> = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if dir.starts_with(mount) {
            let depth = mount.as_os_str().len();
            if best.map_or(true, |(d, _)| depth > d) {
                best = Some((depth, disk.available_space()));
            }
        }
    }
    best.map(|(_, avail)| avail)
        .ok_or_else(|| TransferError::System(format!("no volume found for {}", dir.display())))
}

/// Delete the oldest `ext` files under `dir` until the directory occupies at
/// most `fraction` of the volume (used + available). Returns the number of
/// files deleted.
pub async fn purge_oldest(dir: &Path, ext: &str, fraction: f64) -> Result<u64> {
    let mut files: Vec<(PathBuf, u64, SystemTime)> = Vec::new();
    let mut used = 0u64;

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        used += meta.len();
        let path = entry.path();
        let matches_ext = path.extension().map_or(false, |e| e == ext);
        if matches_ext {
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((path, meta.len(), modified));
        }
    }

    let free = free_space(dir)?;
    let limit = ((used.saturating_add(free)) as f64 * fraction) as u64;
    if used <= limit {
        return Ok(0);
    }

    files.sort_by_key(|(_, _, modified)| *modified);

    let mut deleted = 0u64;
    for (path, size, _) in files {
        if used <= limit {
            break;
        }
        match remove_file(&path).await {
            Ok(()) => {
                used = used.saturating_sub(size);
                deleted += 1;
                debug!("fs_purged: {}", path.display());
            }
            Err(err) => {
                warn!("fs_purge_failed: {} error={}", path.display(), err);
            }
        }
    }
    Ok(deleted)
}
