//! CSV storage sink
//!
//! Appends records to a single CSV file. The column order is fixed the
//! first time the file gains a header: the implicit context fields first,
//! then the remaining field names in sort order. Later batches are aligned
//! to that header; fields without a column are dropped with a warning and
//! missing fields become empty cells.

use crate::record::RecordBatch;
use crate::storage::traits::{StorageResult, StorageSink};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::mem::take;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Columns every record carries, pinned to the front of a fresh header
const CONTEXT_COLUMNS: [&str; 3] = ["site", "url", "fetched_at"];

/// CSV file sink
pub struct CsvSink {
    path: PathBuf,

    /// Column order, locked in when the header is first read or written
    header: Mutex<Option<Vec<String>>>,
}

impl CsvSink {
    /// Creates a sink appending to the given file
    ///
    /// The file is not touched until the first non-empty batch is stored.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            header: Mutex::new(None),
        }
    }
}

#[async_trait]
impl StorageSink for CsvSink {
    async fn store(&self, batch: &RecordBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        // Holding the header lock across the append serializes concurrent
        // store calls on the same file.
        let mut guard = self.header.lock().await;

        if guard.is_none() {
            *guard = read_header(&self.path)?;
        }

        let mut out = String::new();
        let columns = guard.get_or_insert_with(|| {
            let columns = batch_columns(batch);
            push_row(&mut out, columns.iter().map(String::as_str));
            columns
        });

        let mut dropped: BTreeSet<&str> = BTreeSet::new();
        for record in batch {
            for name in record.field_names() {
                if !columns.iter().any(|column| column == name) {
                    dropped.insert(name);
                }
            }
            let cells: Vec<String> = columns
                .iter()
                .map(|column| record.text(column).unwrap_or_default())
                .collect();
            push_row(&mut out, cells.iter().map(String::as_str));
        }

        if !dropped.is_empty() {
            warn!(
                path = %self.path.display(),
                fields = ?dropped,
                "fields missing from the existing CSV header were dropped"
            );
        }

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        file.write_all(out.as_bytes())?;

        debug!(
            path = %self.path.display(),
            records = batch.len(),
            "appended batch to CSV file"
        );
        Ok(())
    }

    fn destination(&self) -> String {
        self.path.display().to_string()
    }
}

/// Column order for a fresh file
fn batch_columns(batch: &RecordBatch) -> Vec<String> {
    let mut extra: BTreeSet<&str> = BTreeSet::new();
    for record in batch {
        for name in record.field_names() {
            if !CONTEXT_COLUMNS.contains(&name) {
                extra.insert(name);
            }
        }
    }

    CONTEXT_COLUMNS
        .iter()
        .copied()
        .chain(extra)
        .map(str::to_string)
        .collect()
}

/// Reads the header of an existing file, if there is one
fn read_header(path: &Path) -> StorageResult<Option<Vec<String>>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)?;
    match contents.lines().next() {
        Some(line) if !line.trim().is_empty() => Ok(Some(parse_row(line))),
        _ => Ok(None),
    }
}

/// Splits one CSV line into cells, honoring quotes and doubled-quote escapes
fn parse_row(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        cell.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => cells.push(take(&mut cell)),
            _ => cell.push(ch),
        }
    }

    cells.push(cell);
    cells
}

/// Appends one quoted CSV row to the buffer
fn push_row<'a, I>(out: &mut String, cells: I)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut first = true;
    for cell in cells {
        if !first {
            out.push(',');
        } else {
            first = false;
        }
        if needs_quotes(cell) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(cell);
        }
    }
    out.push('\n');
}

fn needs_quotes(cell: &str) -> bool {
    cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r')
}
