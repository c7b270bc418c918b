//! Ingestion pipeline orchestration.
//!
//! Two write paths feed the index:
//!
//! - **Full rebuild** ([`Ingestor::rebuild_index`]): drops the
//!   `bulk_export` partition, then streams the export through the chunker
//!   and embedder in fixed-size batches. Ids are `export-<n>` with `n`
//!   restarting at 0 on every rebuild.
//! - **Incremental append** ([`Ingestor::ingest_new`]): reads the live
//!   log past the persisted cursor and adds one `live-<line>` entry per
//!   interaction. The cursor is committed after every flushed batch, so a
//!   failed run resumes from the last batch that reached the store.
//!
//! Both paths are sequential: each embed and add call completes before
//! the next one starts. Embedding and store failures abort the run.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::connector_export;
use crate::cursor::{CursorStore, IngestCursor};
use crate::embedding::{embed_batch, Embedder};
use crate::error::{IngestError, InputWarning};
use crate::models::{EntryMetadata, IndexEntry, LiveRecord, Source};
use crate::progress::{IngestPhase, IngestProgressEvent, IngestProgressReporter, NoProgress};
use crate::store::IndexStore;

/// Outcome of a full rebuild.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RebuildReport {
    /// Entries removed from the old `bulk_export` partition; `None` if the
    /// delete failed and was skipped.
    pub deleted: Option<u64>,
    pub records: u64,
    pub entries: u64,
    pub batches: u64,
    pub warnings: Vec<InputWarning>,
}

/// Outcome of an incremental live-log ingest.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LiveIngestReport {
    pub previous: IngestCursor,
    pub cursor: IngestCursor,
    pub lines_scanned: u64,
    pub entries: u64,
    pub batches: u64,
    pub skipped_noise: u64,
    pub warnings: Vec<InputWarning>,
}

/// A document waiting for its batch to be embedded.
struct Pending {
    id: String,
    document: String,
    metadata: EntryMetadata,
    /// Live-log line number; unused for export chunks.
    line: u64,
}

pub struct Ingestor {
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn Embedder>,
    cursor_store: Arc<dyn CursorStore>,
    progress: Box<dyn IngestProgressReporter>,
    export_dir: PathBuf,
    live_log: PathBuf,
    max_chars: usize,
    export_batch_size: usize,
    live_batch_size: usize,
}

impl Ingestor {
    pub fn new(
        config: &Config,
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn Embedder>,
        cursor_store: Arc<dyn CursorStore>,
    ) -> Self {
        Self {
            store,
            embedder,
            cursor_store,
            progress: Box::new(NoProgress),
            export_dir: config.paths.export_dir.clone(),
            live_log: config.paths.live_log.clone(),
            max_chars: config.chunking.max_chars,
            export_batch_size: config.ingest.export_batch_size,
            live_batch_size: config.ingest.live_batch_size,
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn IngestProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Replace the `bulk_export` partition with a fresh pass over the export.
    pub async fn rebuild_index(&self) -> Result<RebuildReport, IngestError> {
        let mut report = RebuildReport::default();

        match self.store.delete(Source::BulkExport).await {
            Ok(n) => {
                info!(deleted = n, "cleared bulk_export partition");
                report.deleted = Some(n);
            }
            Err(e) => warn!("could not clear bulk_export partition, continuing: {}", e),
        }

        let mut messages = connector_export::iter_messages(&self.export_dir).map_err(|e| {
            IngestError::ExportScan {
                path: self.export_dir.clone(),
                message: e.to_string(),
            }
        })?;

        let mut counter = 0u64;
        let mut batch: Vec<Pending> = Vec::with_capacity(self.export_batch_size);

        for record in messages.by_ref() {
            report.records += 1;
            let metadata = EntryMetadata::bulk_export(&record.conversation_title, record.role);

            for chunk in chunk_text(&record.text, self.max_chars) {
                batch.push(Pending {
                    id: format!("export-{}", counter),
                    document: chunk,
                    metadata: metadata.clone(),
                    line: 0,
                });
                counter += 1;

                if batch.len() >= self.export_batch_size {
                    report.entries += self.flush(&mut batch).await?;
                    report.batches += 1;
                    self.report_batch(IngestPhase::Rebuild, report.batches, report.entries, None);
                }
            }
        }

        if !batch.is_empty() {
            report.entries += self.flush(&mut batch).await?;
            report.batches += 1;
            self.report_batch(IngestPhase::Rebuild, report.batches, report.entries, None);
        }

        report.warnings = messages.warnings().to_vec();
        info!(
            records = report.records,
            entries = report.entries,
            skipped_files = report.warnings.len(),
            "rebuild complete"
        );
        Ok(report)
    }

    /// Ingest live-log lines after the persisted cursor.
    pub async fn ingest_live(&self) -> Result<LiveIngestReport, IngestError> {
        let cursor = self.cursor_store.load()?;
        self.ingest_new(cursor).await
    }

    /// Ingest live-log lines after `cursor`, returning the advanced cursor.
    ///
    /// The cursor is persisted after each flushed batch and once more at
    /// the end of the scan, covering trailing noise lines.
    pub async fn ingest_new(&self, cursor: IngestCursor) -> Result<LiveIngestReport, IngestError> {
        let mut report = LiveIngestReport {
            previous: cursor,
            cursor,
            ..Default::default()
        };

        let file = match tokio::fs::File::open(&self.live_log).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.live_log.display(), "no live log yet");
                return Ok(report);
            }
            Err(source) => {
                return Err(IngestError::LiveLog {
                    path: self.live_log.clone(),
                    source,
                })
            }
        };

        let mut lines = BufReader::new(file).split(b'\n');
        let mut committed = cursor;
        let mut line_no = 0u64;
        let mut batch: Vec<Pending> = Vec::with_capacity(self.live_batch_size);

        while let Some(raw) = lines
            .next_segment()
            .await
            .map_err(|source| IngestError::LiveLog {
                path: self.live_log.clone(),
                source,
            })?
        {
            line_no += 1;
            if line_no <= cursor.last_line {
                continue;
            }
            report.lines_scanned += 1;

            let line = match std::str::from_utf8(&raw) {
                Ok(text) => text.trim(),
                Err(e) => {
                    self.skip_line(&mut report, line_no, &e);
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            let record: LiveRecord = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    self.skip_line(&mut report, line_no, &e);
                    continue;
                }
            };

            if record.is_noise() {
                report.skipped_noise += 1;
                continue;
            }

            batch.push(Pending {
                id: format!("live-{}", line_no),
                document: record.document(),
                metadata: EntryMetadata::live(&record.timestamp, &record.model, record.used_rag),
                line: line_no,
            });

            if batch.len() >= self.live_batch_size {
                let last = batch.last().map(|p| p.line).unwrap_or(line_no);
                report.entries += self.flush(&mut batch).await?;
                report.batches += 1;
                committed = self.commit(committed, last)?;
                self.report_batch(
                    IngestPhase::Live,
                    report.batches,
                    report.entries,
                    Some(committed.last_line),
                );
            }
        }

        if !batch.is_empty() {
            let last = batch.last().map(|p| p.line);
            report.entries += self.flush(&mut batch).await?;
            report.batches += 1;
            self.report_batch(IngestPhase::Live, report.batches, report.entries, last);
        }

        if line_no < cursor.last_line {
            warn!(
                lines = line_no,
                cursor = cursor.last_line,
                "live log is shorter than the ingest cursor; leaving cursor unchanged"
            );
        }

        let end = line_no.max(committed.last_line);
        if end > committed.last_line {
            committed = self.commit(committed, end)?;
        }

        report.cursor = committed;
        info!(
            from = cursor.last_line,
            to = committed.last_line,
            entries = report.entries,
            skipped_lines = report.warnings.len(),
            "live ingest complete"
        );
        Ok(report)
    }

    /// Embed and add one batch, leaving `batch` empty.
    async fn flush(&self, batch: &mut Vec<Pending>) -> Result<u64, IngestError> {
        let pending = std::mem::take(batch);
        let texts: Vec<String> = pending.iter().map(|p| p.document.clone()).collect();
        let vectors = match embed_batch(self.embedder.as_ref(), &texts).await {
            Ok(v) => v,
            Err(e) => {
                if e.is_transient() {
                    warn!("embedding backend unavailable ({}); rerun to resume from the last committed batch", e);
                }
                return Err(e.into());
            }
        };

        let entries: Vec<IndexEntry> = pending
            .into_iter()
            .zip(vectors)
            .map(|(p, embedding)| IndexEntry {
                id: p.id,
                document: p.document,
                metadata: p.metadata,
                embedding,
            })
            .collect();

        let n = entries.len() as u64;
        self.store.add(entries).await?;
        debug!(entries = n, "batch added");
        Ok(n)
    }

    /// Record an unusable live-log line; it still counts as consumed.
    fn skip_line(&self, report: &mut LiveIngestReport, line_no: u64, err: &dyn std::fmt::Display) {
        let location = format!("{}:{}", self.live_log.display(), line_no);
        warn!("skipping live log line {}: {}", location, err);
        report.warnings.push(InputWarning {
            location,
            message: err.to_string(),
        });
    }

    fn commit(&self, current: IngestCursor, line: u64) -> Result<IngestCursor, IngestError> {
        let next = current.advance_to(line)?;
        self.cursor_store.save(next)?;
        Ok(next)
    }

    fn report_batch(&self, phase: IngestPhase, batch: u64, entries: u64, cursor: Option<u64>) {
        self.progress.report(IngestProgressEvent::BatchAdded {
            phase,
            batch,
            entries,
            cursor,
        });
    }
}
