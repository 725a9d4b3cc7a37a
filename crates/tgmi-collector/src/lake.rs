//! Lake layout: dated snapshot partitions and per-channel media directories.
//!
//! ```text
//! <snapshots_root>/<YYYY-MM-DD>/<channel>.json   JSON array of CollectedMessage
//! <images_root>/<channel>/<message_id>.jpg       downloaded media
//! ```
//!
//! A snapshot is written to `<channel>.json.partial` and renamed into place
//! once complete. Readers only ever see whole files; a re-run on the same
//! day replaces the earlier snapshot instead of appending to it.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tgmi_core::{ChannelIdentity, CollectedMessage};

use crate::error::LakeError;

const DATE_FORMAT: &str = "%Y-%m-%d";
const SNAPSHOT_EXT: &str = "json";
const PARTIAL_SUFFIX: &str = ".partial";

/// A closed snapshot for one `(capture_date, channel)` partition.
#[derive(Debug, Clone, PartialEq)]
pub struct LakeSnapshot {
    pub capture_date: NaiveDate,
    pub channel: ChannelIdentity,
    pub path: PathBuf,
    /// Messages in source order (newest first).
    pub messages: Vec<CollectedMessage>,
}

/// A snapshot file located on disk, not yet read.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SnapshotFile {
    pub capture_date: NaiveDate,
    pub channel: ChannelIdentity,
    pub path: PathBuf,
}

/// Deterministic snapshot location for a partition.
#[must_use]
pub fn snapshot_path(snapshots_root: &Path, date: NaiveDate, channel: &ChannelIdentity) -> PathBuf {
    snapshots_root
        .join(date.format(DATE_FORMAT).to_string())
        .join(format!("{}.{SNAPSHOT_EXT}", channel.as_str()))
}

/// Deterministic media location for one message.
#[must_use]
pub fn media_path(images_root: &Path, channel: &ChannelIdentity, message_id: i64) -> PathBuf {
    images_root
        .join(channel.as_str())
        .join(format!("{message_id}.jpg"))
}

/// Writes a snapshot atomically, replacing any earlier snapshot for the same
/// partition.
///
/// # Errors
///
/// Returns [`LakeError::Serialize`] if a message cannot be encoded, or
/// [`LakeError::Io`] if the directory, temp file, or rename fails.
pub async fn write_snapshot(
    snapshots_root: &Path,
    capture_date: NaiveDate,
    channel: &ChannelIdentity,
    messages: Vec<CollectedMessage>,
) -> Result<LakeSnapshot, LakeError> {
    let path = snapshot_path(snapshots_root, capture_date, channel);
    let body = serde_json::to_vec_pretty(&messages).map_err(|source| LakeError::Serialize {
        channel: channel.to_string(),
        source,
    })?;

    write_atomically(&path, &body).await?;

    Ok(LakeSnapshot {
        capture_date,
        channel: channel.clone(),
        path,
        messages,
    })
}

/// Stores one media blob at its deterministic location and returns the path.
///
/// # Errors
///
/// Returns [`LakeError::Io`] if the directory or file cannot be written.
pub async fn write_media(
    images_root: &Path,
    channel: &ChannelIdentity,
    message_id: i64,
    bytes: &[u8],
) -> Result<PathBuf, LakeError> {
    let path = media_path(images_root, channel, message_id);
    write_atomically(&path, bytes).await?;
    Ok(path)
}

async fn write_atomically(path: &Path, body: &[u8]) -> Result<(), LakeError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LakeError::io(parent, e))?;
    }

    let mut partial = path.as_os_str().to_owned();
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);

    tokio::fs::write(&partial, body)
        .await
        .map_err(|e| LakeError::io(&partial, e))?;
    tokio::fs::rename(&partial, path)
        .await
        .map_err(|e| LakeError::io(path, e))?;
    Ok(())
}

/// Reads a snapshot as loosely typed records so that each entry can be
/// validated on its own.
///
/// # Errors
///
/// Returns [`LakeError::Io`] if the file cannot be read, or
/// [`LakeError::Parse`] if it is not a JSON array.
pub async fn read_snapshot_entries(path: &Path) -> Result<Vec<serde_json::Value>, LakeError> {
    let body = tokio::fs::read(path)
        .await
        .map_err(|e| LakeError::io(path, e))?;
    serde_json::from_slice::<Vec<serde_json::Value>>(&body).map_err(|source| LakeError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Splits `<root>/<date>/<channel>.json` back into its partition key.
///
/// # Errors
///
/// Returns [`LakeError::BadLayout`] if the path does not follow the layout.
pub fn parse_snapshot_path(path: &Path) -> Result<SnapshotFile, LakeError> {
    let bad = || LakeError::BadLayout {
        path: path.to_path_buf(),
    };

    if path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXT) {
        return Err(bad());
    }
    let channel = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(bad)?;
    let capture_date = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|s| s.to_str())
        .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
        .ok_or_else(bad)?;

    Ok(SnapshotFile {
        capture_date,
        channel: ChannelIdentity::new(channel),
        path: path.to_path_buf(),
    })
}

/// Lists every closed snapshot under `snapshots_root`, optionally limited to
/// one capture date. Sorted by date, then channel.
///
/// Temp files and anything outside the dated layout are ignored. A missing
/// root yields an empty list.
///
/// # Errors
///
/// Returns [`LakeError::Io`] if a directory exists but cannot be listed.
pub async fn discover_snapshots(
    snapshots_root: &Path,
    date: Option<NaiveDate>,
) -> Result<Vec<SnapshotFile>, LakeError> {
    if !is_dir(snapshots_root).await {
        return Ok(Vec::new());
    }

    let date_dirs: Vec<PathBuf> = match date {
        Some(d) => vec![snapshots_root.join(d.format(DATE_FORMAT).to_string())],
        None => read_dir_paths(snapshots_root).await?,
    };

    let mut found = Vec::new();
    for dir in date_dirs {
        if !is_dir(&dir).await {
            continue;
        }
        for path in read_dir_paths(&dir).await? {
            if !is_file(&path).await {
                continue;
            }
            match parse_snapshot_path(&path) {
                Ok(file) => found.push(file),
                Err(_) => tracing::debug!(path = %path.display(), "skipping non-snapshot file"),
            }
        }
    }

    found.sort();
    Ok(found)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

async fn read_dir_paths(dir: &Path) -> Result<Vec<PathBuf>, LakeError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| LakeError::io(dir, e))?;
    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| LakeError::io(dir, e))?
    {
        paths.push(entry.path());
    }
    Ok(paths)
}

#[cfg(test)]
#[path = "lake_test.rs"]
mod tests;
