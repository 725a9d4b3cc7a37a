//! Discovery of downloaded media under `<images_root>/<channel>/<message_id>.<ext>`.

use std::path::{Path, PathBuf};

use crate::error::DetectionFileError;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// One media file eligible for detection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MediaItem {
    pub channel_name: String,
    pub message_id: i64,
    pub path: PathBuf,
}

/// Lists every image whose file stem is a numeric message id, sorted by
/// channel then id. A missing root yields an empty list.
///
/// # Errors
///
/// Returns [`DetectionFileError::Io`] if a directory cannot be listed.
pub async fn scan_media(images_root: &Path) -> Result<Vec<MediaItem>, DetectionFileError> {
    if !is_kind(images_root, std::fs::Metadata::is_dir).await {
        return Ok(Vec::new());
    }

    let mut items = Vec::new();
    for channel_dir in list_dir(images_root).await? {
        if !is_kind(&channel_dir, std::fs::Metadata::is_dir).await {
            continue;
        }
        let Some(channel_name) = channel_dir.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        let channel_name = channel_name.to_string();

        for path in list_dir(&channel_dir).await? {
            if !is_kind(&path, std::fs::Metadata::is_file).await {
                continue;
            }
            if let Some(message_id) = message_id_for(&path) {
                items.push(MediaItem {
                    channel_name: channel_name.clone(),
                    message_id,
                    path,
                });
            }
        }
    }

    items.sort();
    Ok(items)
}

fn message_id_for(path: &Path) -> Option<i64> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    path.file_stem()?.to_str()?.parse::<i64>().ok()
}

async fn is_kind(path: &Path, kind: fn(&std::fs::Metadata) -> bool) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| kind(&m))
}

async fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, DetectionFileError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| DetectionFileError::io(dir, e))?;
    let mut out = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DetectionFileError::io(dir, e))?
    {
        out.push(entry.path());
    }
    Ok(out)
}
