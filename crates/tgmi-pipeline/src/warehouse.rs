//! Storage backends the loader writes through.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;
use tgmi_core::{ClassifiedDetection, CollectedMessage};

use crate::error::LoaderError;

/// Key-upserting store for messages and detections.
///
/// Every write is an upsert on `(channel_name, message_id)`: an existing row
/// has all non-key fields overwritten, a missing row is inserted.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Creates the namespace and tables if absent. Must be idempotent.
    async fn ensure_schema(&self) -> Result<(), LoaderError>;

    async fn upsert_message(&self, message: &CollectedMessage) -> Result<(), LoaderError>;

    async fn upsert_detection(&self, detection: &ClassifiedDetection) -> Result<(), LoaderError>;
}

/// Postgres warehouse backed by `tgmi-db`.
#[derive(Debug, Clone)]
pub struct PgWarehouse {
    pool: PgPool,
}

impl PgWarehouse {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn ensure_schema(&self) -> Result<(), LoaderError> {
        tgmi_db::ensure_schema(&self.pool).await?;
        Ok(())
    }

    async fn upsert_message(&self, message: &CollectedMessage) -> Result<(), LoaderError> {
        tgmi_db::upsert_message(&self.pool, message).await?;
        Ok(())
    }

    async fn upsert_detection(&self, detection: &ClassifiedDetection) -> Result<(), LoaderError> {
        tgmi_db::upsert_detection(&self.pool, detection).await?;
        Ok(())
    }
}

type Key = (String, i64);

/// In-process warehouse with the same upsert semantics as [`PgWarehouse`].
///
/// Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    messages: Mutex<BTreeMap<Key, CollectedMessage>>,
    detections: Mutex<BTreeMap<Key, ClassifiedDetection>>,
    schema_calls: AtomicUsize,
}

impl MemoryWarehouse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored messages ordered by `(channel_name, message_id)`.
    #[must_use]
    pub fn messages(&self) -> Vec<CollectedMessage> {
        self.messages
            .lock()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// All stored detections ordered by `(channel_name, message_id)`.
    #[must_use]
    pub fn detections(&self) -> Vec<ClassifiedDetection> {
        self.detections
            .lock()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn schema_calls(&self) -> usize {
        self.schema_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn ensure_schema(&self) -> Result<(), LoaderError> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert_message(&self, message: &CollectedMessage) -> Result<(), LoaderError> {
        let mut rows = self.messages.lock().map_err(|_| LoaderError::Poisoned)?;
        rows.insert(
            (message.channel_name.clone(), message.message_id),
            message.clone(),
        );
        Ok(())
    }

    async fn upsert_detection(&self, detection: &ClassifiedDetection) -> Result<(), LoaderError> {
        let mut rows = self.detections.lock().map_err(|_| LoaderError::Poisoned)?;
        rows.insert(
            (detection.channel_name.clone(), detection.message_id),
            detection.clone(),
        );
        Ok(())
    }
}

#[async_trait]
impl<T: Warehouse + ?Sized> Warehouse for std::sync::Arc<T> {
    async fn ensure_schema(&self) -> Result<(), LoaderError> {
        (**self).ensure_schema().await
    }

    async fn upsert_message(&self, message: &CollectedMessage) -> Result<(), LoaderError> {
        (**self).upsert_message(message).await
    }

    async fn upsert_detection(&self, detection: &ClassifiedDetection) -> Result<(), LoaderError> {
        (**self).upsert_detection(detection).await
    }
}
