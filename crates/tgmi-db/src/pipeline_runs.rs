//! Database operations for `pipeline_runs` and `pipeline_run_channels`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `pipeline_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PipelineRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub trigger_source: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_processed: i32,
    /// Name of the stage that terminated a failed run.
    pub failed_stage: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A row from the `pipeline_run_channels` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PipelineRunChannelRow {
    pub id: i64,
    pub pipeline_run_id: i64,
    pub channel_name: String,
    pub status: String,
    pub records_processed: i32,
    pub media_failures: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

const RUN_COLUMNS: &str = "id, public_id, trigger_source, status, started_at, completed_at, \
                           records_processed, failed_stage, error_message, created_at";

// ---------------------------------------------------------------------------
// pipeline_runs operations
// ---------------------------------------------------------------------------

/// Creates a new pipeline run in `queued` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_pipeline_run(
    pool: &PgPool,
    trigger_source: &str,
) -> Result<PipelineRunRow, DbError> {
    let public_id = Uuid::new_v4();

    let row = sqlx::query_as::<_, PipelineRunRow>(&format!(
        "INSERT INTO pipeline_runs (public_id, trigger_source, status) \
         VALUES ($1, $2, 'queued') \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(public_id)
    .bind(trigger_source)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Marks a run as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidPipelineRunTransition`] if the run is not
/// `queued`, or [`DbError::Sqlx`] if the update fails.
pub async fn start_pipeline_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE pipeline_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidPipelineRunTransition {
            id,
            expected_status: "queued",
        });
    }

    Ok(())
}

/// Marks a run as `succeeded` and records how many rows it wrote.
///
/// # Errors
///
/// Returns [`DbError::InvalidPipelineRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_pipeline_run(
    pool: &PgPool,
    id: i64,
    records_processed: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE pipeline_runs \
         SET status = 'succeeded', completed_at = NOW(), records_processed = $1 \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(records_processed)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidPipelineRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `failed`, recording the stage that stopped it.
///
/// # Errors
///
/// Returns [`DbError::InvalidPipelineRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_pipeline_run(
    pool: &PgPool,
    id: i64,
    failed_stage: Option<&str>,
    records_processed: i32,
    error_message: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE pipeline_runs \
         SET status = 'failed', completed_at = NOW(), failed_stage = $1, \
             records_processed = $2, error_message = $3 \
         WHERE id = $4 AND status = 'running'",
    )
    .bind(failed_stage)
    .bind(records_processed)
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidPipelineRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_pipeline_run(pool: &PgPool, id: i64) -> Result<PipelineRunRow, DbError> {
    sqlx::query_as::<_, PipelineRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM pipeline_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pipeline_runs(pool: &PgPool, limit: i64) -> Result<Vec<PipelineRunRow>, DbError> {
    let rows = sqlx::query_as::<_, PipelineRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM pipeline_runs \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// pipeline_run_channels operations
// ---------------------------------------------------------------------------

/// Inserts or updates the per-channel collection result for a run.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_pipeline_run_channel(
    pool: &PgPool,
    run_id: i64,
    channel_name: &str,
    status: &str,
    records_processed: i32,
    media_failures: i32,
    error_message: Option<&str>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO pipeline_run_channels \
             (pipeline_run_id, channel_name, status, records_processed, media_failures, \
              error_message) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (pipeline_run_id, channel_name) DO UPDATE SET \
             status            = EXCLUDED.status, \
             records_processed = EXCLUDED.records_processed, \
             media_failures    = EXCLUDED.media_failures, \
             error_message     = EXCLUDED.error_message",
    )
    .bind(run_id)
    .bind(channel_name)
    .bind(status)
    .bind(records_processed)
    .bind(media_failures)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns all channel rows recorded for a run, ordered by channel name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pipeline_run_channels(
    pool: &PgPool,
    run_id: i64,
) -> Result<Vec<PipelineRunChannelRow>, DbError> {
    let rows = sqlx::query_as::<_, PipelineRunChannelRow>(
        "SELECT id, pipeline_run_id, channel_name, status, records_processed, \
                media_failures, error_message, created_at \
         FROM pipeline_run_channels \
         WHERE pipeline_run_id = $1 \
         ORDER BY channel_name",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
