//! Error kinds for the retrieval pipeline.
//!
//! Each external boundary gets its own enum so callers can tell a
//! transient backend failure (fatal for the current operation, never
//! retried here) from a persistence problem. Malformed input is not an
//! error at all: the loader and the live-log reader record it as an
//! [`InputWarning`] and move on.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Failure of the embedding backend.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding provider is disabled; set [embedding] provider in config")]
    Disabled,

    #[error("embedding request timed out after {0}s")]
    Timeout(u64),

    #[error("embedding transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("embedding API error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid embedding response: {0}")]
    MalformedResponse(String),

    #[error("embedding count mismatch: sent {expected} texts, got {got} vectors")]
    CountMismatch { expected: usize, got: usize },

    #[error("embedding has {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl EmbedError {
    /// Network-level failures that a later run may not hit again.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbedError::Timeout(_) | EmbedError::Transport(_) => true,
            EmbedError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Failure of the vector index backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("index database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("index metadata could not be encoded: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("in-memory index lock poisoned")]
    Poisoned,

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the chat completion backend.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat request timed out after {0}s")]
    Timeout(u64),

    #[error("chat transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("chat API error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("unexpected chat response: {0}")]
    MalformedResponse(String),
}

/// Failure to read or persist the ingest cursor.
///
/// Always fatal: a cursor that cannot be trusted would either drop lines
/// or silently re-embed them.
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("failed to read ingest cursor {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ingest cursor {path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write ingest cursor {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ingest cursor cannot move backwards ({from} -> {to})")]
    Regression { from: u64, to: u64 },
}

/// Fatal error of an ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cursor(#[from] CursorError),

    #[error("failed to scan export {path}: {message}")]
    ExportScan { path: PathBuf, message: String },

    #[error("failed to read live log {path}: {source}")]
    LiveLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while retrieving context for a query.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of a retrieval-augmented chat turn.
#[derive(Debug, Error)]
pub enum AskError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Chat(#[from] ChatError),
}

/// A piece of input that was skipped because it could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputWarning {
    /// File path, or `path:line` for live-log lines.
    pub location: String,
    pub message: String,
}

impl std::fmt::Display for InputWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}
