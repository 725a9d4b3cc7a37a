//! Database operations for `raw.image_detections`.

use sqlx::PgPool;
use tgmi_core::ClassifiedDetection;

use crate::DbError;

/// A row from the `raw.image_detections` table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DetectionRow {
    pub channel_name: String,
    pub message_id: i64,
    pub detected_objects: String,
    pub confidence_score: f64,
    /// One of `promotional`, `product_display`, `lifestyle`, `other`.
    pub image_category: String,
}

/// Upserts the classification for one media item.
///
/// Conflicts on `(channel_name, message_id)` overwrite `detected_objects`,
/// `confidence_score` and `image_category` in place.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_detection(
    pool: &PgPool,
    detection: &ClassifiedDetection,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO raw.image_detections \
             (channel_name, message_id, detected_objects, confidence_score, image_category) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (channel_name, message_id) DO UPDATE SET \
             detected_objects = EXCLUDED.detected_objects, \
             confidence_score = EXCLUDED.confidence_score, \
             image_category   = EXCLUDED.image_category, \
             updated_at       = NOW()",
    )
    .bind(&detection.channel_name)
    .bind(detection.message_id)
    .bind(&detection.detected_objects)
    .bind(detection.confidence_score)
    .bind(detection.image_category.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetches the detection row for one media item.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_detection(
    pool: &PgPool,
    channel_name: &str,
    message_id: i64,
) -> Result<Option<DetectionRow>, DbError> {
    let row = sqlx::query_as::<_, DetectionRow>(
        "SELECT channel_name, message_id, detected_objects, confidence_score, image_category \
         FROM raw.image_detections \
         WHERE channel_name = $1 AND message_id = $2",
    )
    .bind(channel_name)
    .bind(message_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Counts detection rows, optionally restricted to one category.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_detections(pool: &PgPool, category: Option<&str>) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM raw.image_detections \
         WHERE $1::text IS NULL OR image_category = $1",
    )
    .bind(category)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
