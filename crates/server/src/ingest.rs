//! Bulk loading of raw consultations into the record store
//!
//! Input is JSON Lines with one `{"idx", "conversation", "note"}` object per
//! line (`notes` is accepted for `note`). Each complete row becomes a raw
//! record keyed by `idx`, with no derived artifacts. Rows are written in
//! batches; a failed batch is logged and the run carries on.

use clinai_core::{PatientRecord, normalize};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::db::RecordStore;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_MAX_RECORDS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Records per `insert_many` call
    pub batch_size: usize,
    /// Input rows to read at most; `None` reads everything
    pub max_records: Option<usize>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_records: Some(DEFAULT_MAX_RECORDS),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Non-blank input rows read, up to the cap
    pub rows: usize,
    /// Rows that were malformed or missing a field
    pub skipped: usize,
    /// Records actually written; ids already stored are not counted
    pub inserted: u64,
    pub failed_batches: usize,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    idx: Option<JsonValue>,
    conversation: Option<String>,
    note: Option<String>,
    notes: Option<String>,
}

impl RawRow {
    fn into_record(self) -> Option<PatientRecord> {
        let idx = self.idx.as_ref().and_then(normalize::scalar_text)?;
        let idx = idx.trim();
        if idx.is_empty() {
            return None;
        }
        let note = self.note.filter(|n| !n.is_empty()).or(self.notes)?;
        let conversation = self.conversation?;
        Some(PatientRecord::new(idx, note, conversation))
    }
}

/// Stream rows from `reader` into `store`.
///
/// Only read errors abort the run.
pub async fn ingest<R>(
    store: &dyn RecordStore,
    reader: R,
    options: &IngestOptions,
) -> std::io::Result<IngestReport>
where
    R: AsyncBufRead + Unpin,
{
    let batch_size = options.batch_size.max(1);
    let mut lines = reader.lines();
    let mut batch = Vec::with_capacity(batch_size);
    let mut report = IngestReport::default();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        if options.max_records.is_some_and(|max| report.rows >= max) {
            break;
        }
        report.rows += 1;

        match serde_json::from_str::<RawRow>(&line) {
            Ok(row) => match row.into_record() {
                Some(record) => batch.push(record),
                None => {
                    tracing::debug!(line = line_no, "Skipping incomplete row");
                    report.skipped += 1;
                }
            },
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping malformed row");
                report.skipped += 1;
            }
        }

        if batch.len() >= batch_size {
            flush(store, &mut batch, &mut report).await;
        }
    }

    if !batch.is_empty() {
        flush(store, &mut batch, &mut report).await;
    }

    Ok(report)
}

async fn flush(
    store: &dyn RecordStore,
    batch: &mut Vec<PatientRecord>,
    report: &mut IngestReport,
) {
    match store.insert_many(batch).await {
        Ok(inserted) => {
            report.inserted += inserted;
            tracing::info!(inserted, batch = batch.len(), "Batch inserted");
        }
        Err(e) => {
            report.failed_batches += 1;
            tracing::error!(error = %e, batch = batch.len(), "Batch insert failed");
        }
    }
    batch.clear();
}
