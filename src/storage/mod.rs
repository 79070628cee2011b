//! Record persistence
//!
//! This module handles persisting extracted records. One sink is opened per
//! run from the global `[storage]` table and shared by every site task; a
//! pipeline's `[post-processing.export]` block, when present, redirects the
//! run's output instead.

mod csv;
mod json;
mod sqlite;
mod traits;

pub use csv::CsvSink;
pub use json::JsonSink;
pub use sqlite::SqliteSink;
pub use traits::{StorageError, StorageResult, StorageSink};

use crate::config::{ExportConfig, ExportFormat, StorageConfig, StorageKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Opens the sink described by the global storage config
///
/// # Arguments
///
/// * `config` - The `[storage]` table of the run's config
///
/// # Returns
///
/// * `Ok(Arc<dyn StorageSink>)` - Successfully opened sink
/// * `Err(StorageError)` - Failed to open the destination
pub fn open_sink(config: &StorageConfig) -> StorageResult<Arc<dyn StorageSink>> {
    let path = Path::new(&config.path);
    let sink: Arc<dyn StorageSink> = match config.kind {
        StorageKind::Csv => Arc::new(CsvSink::new(path)),
        StorageKind::Json => Arc::new(JsonSink::new(path)),
        StorageKind::Sqlite => Arc::new(SqliteSink::open(path, &config.table)?),
    };
    Ok(sink)
}

/// Opens the sink described by a pipeline's export block
///
/// The export path names a file stem; the format's extension is appended to
/// it, so `path = "processed_data"` with the csv format writes
/// `processed_data.csv`.
pub fn open_export_sink(export: &ExportConfig) -> StorageResult<Arc<dyn StorageSink>> {
    let sink: Arc<dyn StorageSink> = match export.format {
        ExportFormat::Csv => Arc::new(CsvSink::new(export_path(&export.path, "csv"))),
        ExportFormat::Json => Arc::new(JsonSink::new(export_path(&export.path, "json"))),
    };
    Ok(sink)
}

fn export_path(stem: &str, extension: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", stem, extension))
}
