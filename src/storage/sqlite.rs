//! SQLite storage sink
//!
//! Records land in a single table with fixed columns for the fields every
//! record carries plus the common `title`/`content` pair; anything else a
//! record extracted goes into the `extra` column as a JSON object.

use crate::record::{Record, RecordBatch};
use crate::storage::traits::{StorageError, StorageResult, StorageSink};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

/// Fields with their own column; everything else goes into `extra`
const FIXED_COLUMNS: [&str; 5] = ["site", "url", "title", "content", "fetched_at"];

/// SQLite storage backend
pub struct SqliteSink {
    conn: Mutex<Connection>,
    table: String,
    destination: String,
}

impl SqliteSink {
    /// Opens (or creates) the database and ensures the record table exists
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `table` - Name of the record table
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Successfully opened database
    /// * `Err(StorageError)` - Failed to open database or create the table
    pub fn open(path: &Path, table: &str) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;

        initialize_table(&conn, table)?;

        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
            destination: path.display().to_string(),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory(table: &str) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_table(&conn, table)?;
        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
            destination: ":memory:".to_string(),
        })
    }
}

#[async_trait]
impl StorageSink for SqliteSink {
    async fn store(&self, batch: &RecordBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (site, url, title, content, fetched_at, extra)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                self.table
            ))?;

            for record in batch {
                stmt.execute(params![
                    record.text("site").unwrap_or_default(),
                    record.text("url").unwrap_or_default(),
                    record.text("title"),
                    record.text("content"),
                    record.text("fetched_at").unwrap_or_default(),
                    extra_fields(record)?,
                ])?;
            }
        }
        tx.commit()?;

        debug!(
            table = %self.table,
            records = batch.len(),
            "inserted batch into SQLite"
        );
        Ok(())
    }

    fn destination(&self) -> String {
        self.destination.clone()
    }
}

fn initialize_table(conn: &Connection, table: &str) -> StorageResult<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                site TEXT NOT NULL,
                url TEXT NOT NULL,
                title TEXT,
                content TEXT,
                fetched_at TEXT NOT NULL,
                extra TEXT
            )",
            table
        ),
        [],
    )?;
    Ok(())
}

/// Renders the fields without a fixed column as a JSON object
fn extra_fields(record: &Record) -> StorageResult<Option<String>> {
    let mut extra = serde_json::Map::new();
    for (name, value) in record.iter() {
        if FIXED_COLUMNS.contains(&name.as_str()) {
            continue;
        }
        let rendered = serde_json::to_value(value)
            .map_err(|error| StorageError::Serialization(error.to_string()))?;
        extra.insert(name.clone(), rendered);
    }

    if extra.is_empty() {
        return Ok(None);
    }

    serde_json::to_string(&serde_json::Value::Object(extra))
        .map(Some)
        .map_err(|error| StorageError::Serialization(error.to_string()))
}
