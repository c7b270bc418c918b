//! Append-only JSONL log of chat interactions.
//!
//! Every answered prompt is appended as one [`LiveRecord`] line. The live
//! ingester later reads these lines back into the index. Writing is best
//! effort: a failure is logged and the chat turn still succeeds.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::models::LiveRecord;

pub struct InteractionLog {
    path: PathBuf,
}

impl InteractionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record`; returns whether the line was written.
    pub fn append(&self, record: &LiveRecord) -> bool {
        match self.try_append(record) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.path.display(), "failed to log interaction: {}", e);
                false
            }
        }
    }

    fn try_append(&self, record: &LiveRecord) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(record)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// Build a log record stamped with the current UTC time.
pub fn interaction_record(
    source: &str,
    model: &str,
    used_rag: bool,
    user_prompt: &str,
    sent_prompt: &str,
    rag_context: &str,
    assistant_reply: &str,
) -> LiveRecord {
    LiveRecord {
        timestamp: chrono::Utc::now().to_rfc3339(),
        source: source.to_string(),
        model: model.to_string(),
        used_rag,
        user_prompt: user_prompt.to_string(),
        sent_prompt: sent_prompt.to_string(),
        rag_context: rag_context.to_string(),
        assistant_reply: assistant_reply.to_string(),
    }
}
