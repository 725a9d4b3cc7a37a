//! The tabular detection result file handed from classification to loading.
//!
//! Columns: `message_id,channel_name,detected_objects,confidence_score,image_category`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tgmi_core::{ClassifiedDetection, ImageCategory};

use crate::error::DetectionFileError;

const HEADER: [&str; 5] = [
    "message_id",
    "channel_name",
    "detected_objects",
    "confidence_score",
    "image_category",
];

#[derive(Serialize)]
struct DetectionRow<'a> {
    message_id: i64,
    channel_name: &'a str,
    detected_objects: &'a str,
    confidence_score: f64,
    image_category: &'a str,
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Writes classified detections, replacing any earlier file.
///
/// Scores are rounded to four decimal places. The CSV work runs on the
/// blocking pool.
///
/// # Errors
///
/// Returns [`DetectionFileError`] if the directory, file, or rename fails.
pub async fn write_detections(
    path: &Path,
    detections: &[ClassifiedDetection],
) -> Result<(), DetectionFileError> {
    let path = path.to_path_buf();
    let detections = detections.to_vec();
    tokio::task::spawn_blocking(move || write_detections_blocking(&path, &detections)).await?
}

fn write_detections_blocking(
    path: &Path,
    detections: &[ClassifiedDetection],
) -> Result<(), DetectionFileError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DetectionFileError::io(parent, e))?;
    }

    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    let mut writer = csv::Writer::from_path(&partial)
        .map_err(|e| DetectionFileError::csv(&partial, e))?;
    if detections.is_empty() {
        writer
            .write_record(HEADER)
            .map_err(|e| DetectionFileError::csv(&partial, e))?;
    }
    for d in detections {
        writer
            .serialize(DetectionRow {
                message_id: d.message_id,
                channel_name: &d.channel_name,
                detected_objects: &d.detected_objects,
                confidence_score: round4(d.confidence_score),
                image_category: d.image_category.as_str(),
            })
            .map_err(|e| DetectionFileError::csv(&partial, e))?;
    }
    writer
        .flush()
        .map_err(|e| DetectionFileError::io(&partial, e))?;
    drop(writer);

    std::fs::rename(&partial, path).map_err(|e| DetectionFileError::io(path, e))?;
    Ok(())
}

/// One row as read back from disk, before validation.
///
/// Every field is optional so that short or damaged rows can still be
/// counted by the loader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionRecord {
    pub message_id: Option<String>,
    pub channel_name: Option<String>,
    pub detected_objects: Option<String>,
    pub confidence_score: Option<String>,
    pub image_category: Option<String>,
}

impl From<&ClassifiedDetection> for DetectionRecord {
    fn from(d: &ClassifiedDetection) -> Self {
        Self {
            message_id: Some(d.message_id.to_string()),
            channel_name: Some(d.channel_name.clone()),
            detected_objects: Some(d.detected_objects.clone()),
            confidence_score: Some(d.confidence_score.to_string()),
            image_category: Some(d.image_category.as_str().to_string()),
        }
    }
}

impl DetectionRecord {
    /// Validates the record into a [`ClassifiedDetection`].
    ///
    /// # Errors
    ///
    /// Returns a description of the first missing or unparseable field.
    pub fn to_classified(&self) -> Result<ClassifiedDetection, String> {
        let message_id = required(self.message_id.as_deref(), "message_id")?
            .parse::<i64>()
            .map_err(|e| format!("message_id: {e}"))?;
        let channel_name = required(self.channel_name.as_deref(), "channel_name")?.to_string();
        let confidence_score = required(self.confidence_score.as_deref(), "confidence_score")?
            .parse::<f64>()
            .map_err(|e| format!("confidence_score: {e}"))?;
        if !(0.0..=1.0).contains(&confidence_score) {
            return Err(format!("confidence_score {confidence_score} outside [0, 1]"));
        }
        let image_category =
            required(self.image_category.as_deref(), "image_category")?.parse::<ImageCategory>()?;

        Ok(ClassifiedDetection {
            message_id,
            channel_name,
            detected_objects: self.detected_objects.clone().unwrap_or_default(),
            confidence_score,
            image_category,
        })
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(format!("missing {field}")),
    }
}

/// Reads every row of the detection file. Columns are located by header
/// name; absent columns and unreadable fields become `None`.
///
/// # Errors
///
/// Returns [`DetectionFileError`] if the file cannot be opened or its header
/// cannot be read.
pub async fn read_detection_records(
    path: &Path,
) -> Result<Vec<DetectionRecord>, DetectionFileError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || read_detection_records_blocking(&path)).await?
}

fn read_detection_records_blocking(
    path: &Path,
) -> Result<Vec<DetectionRecord>, DetectionFileError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| DetectionFileError::csv(path, e))?;

    let headers = reader
        .byte_headers()
        .map_err(|e| DetectionFileError::csv(path, e))?
        .clone();
    let column = |name: &str| headers.iter().position(|h| h == name.as_bytes());
    let idx = [
        column("message_id"),
        column("channel_name"),
        column("detected_objects"),
        column("confidence_score"),
        column("image_category"),
    ];

    let mut records = Vec::new();
    for (line, row) in reader.byte_records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(path = %path.display(), line = line + 2, error = %e, "unreadable detection row");
                records.push(DetectionRecord::default());
                continue;
            }
        };
        let field = |i: Option<usize>| {
            i.and_then(|i| row.get(i))
                .and_then(|b| std::str::from_utf8(b).ok())
                .map(str::to_string)
        };
        records.push(DetectionRecord {
            message_id: field(idx[0]),
            channel_name: field(idx[1]),
            detected_objects: field(idx[2]),
            confidence_score: field(idx[3]),
            image_category: field(idx[4]),
        });
    }

    Ok(records)
}
