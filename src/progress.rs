//! Ingestion progress reporting.
//!
//! Reports observable progress during `brain rebuild` and `brain ingest`
//! so users see how many batches have been embedded and where the live
//! cursor stands. Progress is emitted on **stderr** so stdout remains
//! parseable for scripts.

use std::io::Write;

/// Which ingestion path is running.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IngestPhase {
    Rebuild,
    Live,
}

impl IngestPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestPhase::Rebuild => "rebuild",
            IngestPhase::Live => "ingest",
        }
    }
}

/// A single progress event.
#[derive(Clone, Debug)]
pub enum IngestProgressEvent {
    /// A batch was embedded and added. `entries` is the running total.
    BatchAdded {
        phase: IngestPhase,
        batch: u64,
        entries: u64,
        /// Live ingestion only: the cursor after this batch.
        cursor: Option<u64>,
    },
}

pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "rebuild  batch 3  384 entries".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::BatchAdded {
                phase,
                batch,
                entries,
                cursor,
            } => match cursor {
                Some(line) => format!(
                    "{}  batch {}  {} entries  (line {})\n",
                    phase.as_str(),
                    batch,
                    format_number(*entries),
                    format_number(*line)
                ),
                None => format!(
                    "{}  batch {}  {} entries\n",
                    phase.as_str(),
                    batch,
                    format_number(*entries)
                ),
            },
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = match &event {
            IngestProgressEvent::BatchAdded {
                phase,
                batch,
                entries,
                cursor,
            } => serde_json::json!({
                "event": "progress",
                "phase": phase.as_str(),
                "batch": batch,
                "entries": entries,
                "cursor": cursor,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
