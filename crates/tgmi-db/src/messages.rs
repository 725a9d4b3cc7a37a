//! Database operations for `raw.telegram_messages`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tgmi_core::CollectedMessage;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `raw.telegram_messages` table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MessageRow {
    pub channel_name: String,
    pub message_id: i64,
    pub message_date: DateTime<Utc>,
    pub message_text: Option<String>,
    pub has_media: bool,
    pub image_path: Option<String>,
    pub views: i64,
    pub forwards: i64,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Upserts one collected message.
///
/// Conflicts on `(channel_name, message_id)` overwrite every non-key column
/// with the incoming values, so re-loading an unchanged snapshot leaves the
/// table as it was.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_message(pool: &PgPool, message: &CollectedMessage) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO raw.telegram_messages \
             (channel_name, message_id, message_date, message_text, has_media, \
              image_path, views, forwards) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (channel_name, message_id) DO UPDATE SET \
             message_date = EXCLUDED.message_date, \
             message_text = EXCLUDED.message_text, \
             has_media    = EXCLUDED.has_media, \
             image_path   = EXCLUDED.image_path, \
             views        = EXCLUDED.views, \
             forwards     = EXCLUDED.forwards, \
             updated_at   = NOW()",
    )
    .bind(&message.channel_name)
    .bind(message.message_id)
    .bind(message.captured_at)
    .bind(&message.text)
    .bind(message.has_media)
    .bind(&message.media_path)
    .bind(message.view_count)
    .bind(message.forward_count)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetches one message by its key, or `None` if it has not been loaded.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_message(
    pool: &PgPool,
    channel_name: &str,
    message_id: i64,
) -> Result<Option<MessageRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(
        "SELECT channel_name, message_id, message_date, message_text, has_media, \
                image_path, views, forwards \
         FROM raw.telegram_messages \
         WHERE channel_name = $1 AND message_id = $2",
    )
    .bind(channel_name)
    .bind(message_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns up to `limit` messages for a channel, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_channel_messages(
    pool: &PgPool,
    channel_name: &str,
    limit: i64,
) -> Result<Vec<MessageRow>, DbError> {
    let rows = sqlx::query_as::<_, MessageRow>(
        "SELECT channel_name, message_id, message_date, message_text, has_media, \
                image_path, views, forwards \
         FROM raw.telegram_messages \
         WHERE channel_name = $1 \
         ORDER BY message_date DESC, message_id DESC \
         LIMIT $2",
    )
    .bind(channel_name)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Counts loaded messages, optionally restricted to one channel.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_messages(pool: &PgPool, channel_name: Option<&str>) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM raw.telegram_messages \
         WHERE $1::text IS NULL OR channel_name = $1",
    )
    .bind(channel_name)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
