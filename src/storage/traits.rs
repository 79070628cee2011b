//! Storage trait and error types
//!
//! This module defines the sink interface record batches are persisted
//! through, and the errors persistence can produce.

use crate::record::RecordBatch;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for record persistence backends
///
/// One sink is opened per run and shared by every site task. Appends are
/// serialized inside the sink, so `store` may be called from concurrent
/// tasks. Storing an empty batch is a no-op and must not touch the
/// destination.
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Appends a batch of records to the destination
    ///
    /// # Arguments
    ///
    /// * `batch` - The records to persist, in batch order
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Every record in the batch was persisted
    /// * `Err(StorageError)` - The batch was not (fully) persisted
    async fn store(&self, batch: &RecordBatch) -> StorageResult<()>;

    /// Human-readable destination, for logs and reports
    fn destination(&self) -> String;
}
