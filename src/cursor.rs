//! Persisted position of the live-log ingester.
//!
//! The cursor is the 1-based number of the last live-log line that has
//! been fully handled (embedded and added, or skipped as noise). It only
//! moves forward. [`FileCursorStore`] persists it as
//! `{"last_line": <n>}` and replaces the file atomically so a crash
//! mid-write leaves the previous value intact.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CursorError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestCursor {
    #[serde(default)]
    pub last_line: u64,
}

impl IngestCursor {
    pub fn new(last_line: u64) -> Self {
        Self { last_line }
    }

    /// Move the cursor to `line`. Moving backwards is an error.
    pub fn advance_to(self, line: u64) -> Result<Self, CursorError> {
        if line < self.last_line {
            return Err(CursorError::Regression {
                from: self.last_line,
                to: line,
            });
        }
        Ok(Self { last_line: line })
    }
}

/// Durable home of the ingest cursor.
pub trait CursorStore: Send + Sync {
    /// Load the cursor; a store that was never written yields line 0.
    fn load(&self) -> Result<IngestCursor, CursorError>;

    fn save(&self, cursor: IngestCursor) -> Result<(), CursorError>;
}

/// Cursor kept in a small JSON file next to the live log.
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CursorStore for FileCursorStore {
    fn load(&self) -> Result<IngestCursor, CursorError> {
        if !self.path.exists() {
            return Ok(IngestCursor::default());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|source| CursorError::Read {
            path: self.path.clone(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| CursorError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, cursor: IngestCursor) -> Result<(), CursorError> {
        let write_err = |source| CursorError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let json = serde_json::to_string_pretty(&cursor).map_err(|e| CursorError::Write {
            path: self.path.clone(),
            source: std::io::Error::other(e),
        })?;

        let tmp = self.temp_path();
        std::fs::write(&tmp, json).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;

        debug!(last_line = cursor.last_line, path = %self.path.display(), "saved ingest cursor");
        Ok(())
    }
}

/// Cursor held in memory, recording every save. Used by tests.
#[derive(Default)]
pub struct MemoryCursorStore {
    current: Mutex<IngestCursor>,
    history: Mutex<Vec<u64>>,
}

impl MemoryCursorStore {
    pub fn new(initial: IngestCursor) -> Self {
        Self {
            current: Mutex::new(initial),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Every `last_line` passed to `save`, in order.
    pub fn history(&self) -> Vec<u64> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self) -> Result<IngestCursor, CursorError> {
        Ok(self.current.lock().map(|c| *c).unwrap_or_default())
    }

    fn save(&self, cursor: IngestCursor) -> Result<(), CursorError> {
        if let Ok(mut current) = self.current.lock() {
            *current = cursor;
        }
        if let Ok(mut history) = self.history.lock() {
            history.push(cursor.last_line);
        }
        Ok(())
    }
}
