//! JSON storage sink
//!
//! Keeps the whole destination as one JSON array of flat record objects.
//! Appending re-reads the array, extends it, and rewrites the file, so the
//! document stays valid after every store.

use crate::record::RecordBatch;
use crate::storage::traits::{StorageError, StorageResult, StorageSink};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

/// JSON file sink
pub struct JsonSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonSink {
    /// Creates a sink appending to the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl StorageSink for JsonSink {
    async fn store(&self, batch: &RecordBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;

        let mut entries: Vec<serde_json::Value> = if self.path.exists() {
            let contents = std::fs::read_to_string(&self.path)?;
            if contents.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&contents).map_err(|error| {
                    StorageError::Serialization(format!(
                        "existing file {} is not a JSON array: {}",
                        self.path.display(),
                        error
                    ))
                })?
            }
        } else {
            Vec::new()
        };

        for record in batch {
            let value = serde_json::to_value(record)
                .map_err(|error| StorageError::Serialization(error.to_string()))?;
            entries.push(value);
        }

        let rendered = serde_json::to_string_pretty(&entries)
            .map_err(|error| StorageError::Serialization(error.to_string()))?;
        std::fs::write(&self.path, rendered)?;

        debug!(
            path = %self.path.display(),
            records = batch.len(),
            total = entries.len(),
            "rewrote JSON file with appended batch"
        );
        Ok(())
    }

    fn destination(&self) -> String {
        self.path.display().to_string()
    }
}
