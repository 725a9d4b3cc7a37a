//! Promotion of lake snapshots and detection results into the warehouse.

use std::path::Path;

use tgmi_collector::{read_snapshot_entries, LakeSnapshot, SnapshotFile};
use tgmi_core::{CollectedMessage, LoadReport};
use tgmi_vision::{read_detection_records, DetectionRecord};
use tokio::sync::OnceCell;

use crate::error::LoaderError;
use crate::warehouse::Warehouse;

/// Validates one raw snapshot entry.
///
/// # Errors
///
/// Returns a description of why the entry cannot be loaded: a missing or
/// mistyped field, an unparseable date, a negative counter, or a media flag
/// that disagrees with the media path.
pub fn parse_message_entry(entry: serde_json::Value) -> Result<CollectedMessage, String> {
    let message: CollectedMessage = serde_json::from_value(entry).map_err(|e| e.to_string())?;

    if message.channel_name.trim().is_empty() {
        return Err("empty channel_name".to_string());
    }
    if message.view_count < 0 || message.forward_count < 0 {
        return Err("negative views or forwards".to_string());
    }
    if !message.media_is_consistent() {
        return Err("has_media disagrees with image_path".to_string());
    }
    Ok(message)
}

/// Idempotent loader: re-running it on unchanged input leaves the warehouse
/// as it was.
pub struct WarehouseLoader<W> {
    warehouse: W,
    schema_ready: OnceCell<()>,
}

impl<W: Warehouse> WarehouseLoader<W> {
    pub fn new(warehouse: W) -> Self {
        Self {
            warehouse,
            schema_ready: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn warehouse(&self) -> &W {
        &self.warehouse
    }

    async fn ensure_schema(&self) -> Result<(), LoaderError> {
        self.schema_ready
            .get_or_try_init(|| self.warehouse.ensure_schema())
            .await?;
        Ok(())
    }

    /// Loads every entry of a freshly written snapshot, reading it back from
    /// the lake.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError`] if the snapshot cannot be read or the
    /// warehouse rejects a write.
    pub async fn load_messages(&self, snapshot: &LakeSnapshot) -> Result<LoadReport, LoaderError> {
        self.load_snapshot_path(&snapshot.path).await
    }

    /// Loads a snapshot discovered on disk.
    ///
    /// # Errors
    ///
    /// See [`load_messages`](Self::load_messages).
    pub async fn load_snapshot_file(&self, file: &SnapshotFile) -> Result<LoadReport, LoaderError> {
        self.load_snapshot_path(&file.path).await
    }

    async fn load_snapshot_path(&self, path: &Path) -> Result<LoadReport, LoaderError> {
        let entries = read_snapshot_entries(path).await?;
        let report = self.load_message_entries(entries).await?;
        tracing::info!(
            path = %path.display(),
            written = report.inserted_or_updated,
            skipped = report.skipped,
            "snapshot loaded"
        );
        Ok(report)
    }

    /// Upserts each valid entry; invalid ones are skipped and counted.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError`] if schema setup or a write fails.
    pub async fn load_message_entries(
        &self,
        entries: Vec<serde_json::Value>,
    ) -> Result<LoadReport, LoaderError> {
        self.ensure_schema().await?;

        let mut report = LoadReport::default();
        for (index, entry) in entries.into_iter().enumerate() {
            match parse_message_entry(entry) {
                Ok(message) => {
                    self.warehouse.upsert_message(&message).await?;
                    report.record_written();
                }
                Err(reason) => {
                    tracing::warn!(index, reason = %reason, "skipping malformed message record");
                    report.record_skipped();
                }
            }
        }
        Ok(report)
    }

    /// Upserts each valid detection record; invalid ones are skipped and
    /// counted.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError`] if schema setup or a write fails.
    pub async fn load_detections(
        &self,
        records: &[DetectionRecord],
    ) -> Result<LoadReport, LoaderError> {
        self.ensure_schema().await?;

        let mut report = LoadReport::default();
        for (index, record) in records.iter().enumerate() {
            match record.to_classified() {
                Ok(detection) => {
                    self.warehouse.upsert_detection(&detection).await?;
                    report.record_written();
                }
                Err(reason) => {
                    tracing::warn!(index, reason = %reason, "skipping malformed detection record");
                    report.record_skipped();
                }
            }
        }

        tracing::info!(
            written = report.inserted_or_updated,
            skipped = report.skipped,
            "detections loaded"
        );
        Ok(report)
    }

    /// Reads the detection result file and loads it.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError`] if the file cannot be read or a write fails.
    pub async fn load_detection_file(&self, path: &Path) -> Result<LoadReport, LoaderError> {
        let records = read_detection_records(path).await?;
        self.load_detections(&records).await
    }
}

#[cfg(test)]
#[path = "loader_test.rs"]
mod tests;
