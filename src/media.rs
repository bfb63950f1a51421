//! Media entry value type and the device-side naming conventions.
//!
//! A remote device exposes one directory per device tag, each with a
//! `media/` directory holding photos and videos and a sibling `thumb/`
//! directory holding pre-rendered thumbnails. Video thumbnails carry an
//! extra `.jpg` suffix (`video_x.mp4` -> `thumb/video_x.mp4.jpg`).

use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Remote directory holding the media files of one device.
pub const MEDIA_DIR: &str = "media";
/// Remote directory holding pre-rendered thumbnails of one device.
pub const THUMB_DIR: &str = "thumb";

/// Prefix for in-flight local (and claimed remote) files.
pub const DOWNLOADING_PREFIX: &str = "downloading_";

const EXT_JPG: &str = "jpg";
const EXT_MP4: &str = "mp4";

/// Timestamp layout embedded in media file names
/// (`<prefix>_YYYYMMDDTHHMMSS.<ext>`).
const NAME_DATE_FORMAT: &str = "%Y%m%dT%H%M%S";

/// One discoverable remote media asset.
///
/// Identity is `(device, remote_path)`; entries are immutable once
/// constructed. Deleting a media removes it from the catalog rather than
/// mutating it. `thumbnail` is either absent or a fully formed image blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaEntry {
    /// Tag of the device that produced the media.
    pub device: String,
    /// Bare file name, e.g. `Bebop_20160115T153049.jpg`.
    pub name: String,
    /// Full remote path of the media file.
    pub remote_path: String,
    /// Local destination path, known once the owning engine is configured.
    pub local_path: Option<PathBuf>,
    /// Date string extracted from the file name; empty when absent.
    pub date: String,
    /// Device-reported size in bytes (may be approximate).
    pub size: u64,
    /// Stable identifier independent of the path, when the store provides one.
    pub uuid: Option<String>,
    /// Thumbnail blob, fetched on demand during catalog scans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Vec<u8>>,
}

impl MediaEntry {
    /// Catalog identity of this entry.
    pub fn key(&self) -> (&str, &str) {
        (&self.device, &self.remote_path)
    }

    /// The embedded date, parsed; `None` when the name carries none.
    pub fn parsed_date(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.date, NAME_DATE_FORMAT).ok()
    }

    /// Whether `name` carries one of the recognized media extensions.
    pub fn has_media_extension(name: &str) -> bool {
        matches!(extension_of(name), Some(EXT_JPG) | Some(EXT_MP4))
    }

    /// Date portion of a media file name: the segment between the last `_`
    /// and the final `.`, empty when the name does not follow the convention.
    pub fn date_from_name(name: &str) -> String {
        let stem = match name.rfind('.') {
            Some(dot) => &name[..dot],
            None => name,
        };
        match stem.rfind('_') {
            Some(us) => stem[us + 1..].to_string(),
            None => String::new(),
        }
    }

    /// Thumbnail file name for a media file name. Videos get `.jpg` appended.
    pub fn thumbnail_name(name: &str) -> String {
        if extension_of(name) == Some(EXT_MP4) {
            format!("{}.{}", name, EXT_JPG)
        } else {
            name.to_string()
        }
    }
}

fn extension_of(name: &str) -> Option<&str> {
    name.rfind('.').map(|dot| &name[dot + 1..])
}
