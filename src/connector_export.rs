//! Bulk conversation export loader.
//!
//! Walks an export tree and yields one [`Record`] per non-empty message.
//! If `<root>/conversations.json` exists it is the only file read;
//! otherwise every `**/*.json` file under the root is tried, in path
//! order. Two shapes are understood:
//!
//! - a single conversation object with a `mapping` of node id → node;
//! - a list of such conversation objects.
//!
//! Files that cannot be read, are not JSON, or match neither shape are
//! skipped with an [`InputWarning`]. A missing root is an empty export.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::InputWarning;
use crate::models::{Record, Role};

const CANONICAL_FILE: &str = "conversations.json";

/// One exported conversation.
#[derive(Debug, Deserialize)]
struct Conversation {
    #[serde(default)]
    title: Option<String>,
    /// Node id → node, in file order.
    #[serde(default)]
    mapping: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Node {
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    author: Option<Author>,
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Author {
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Option<Vec<Value>>,
}

/// The two accepted top-level layouts of an export file.
#[derive(Debug)]
enum ExportShape {
    Single(Conversation),
    Batch(Vec<Conversation>),
}

impl ExportShape {
    fn classify(value: Value) -> std::result::Result<Self, String> {
        let is_single = matches!(&value, Value::Object(obj) if obj.contains_key("mapping"));
        if is_single {
            return serde_json::from_value(value)
                .map(ExportShape::Single)
                .map_err(|e| format!("invalid conversation: {}", e));
        }

        match value {
            Value::Array(items) => {
                let mut conversations = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let conv: Conversation = serde_json::from_value(item)
                        .map_err(|e| format!("invalid conversation at index {}: {}", i, e))?;
                    conversations.push(conv);
                }
                Ok(ExportShape::Batch(conversations))
            }
            _ => Err("unrecognized JSON shape".to_string()),
        }
    }

    fn into_conversations(self) -> Vec<Conversation> {
        match self {
            ExportShape::Single(c) => vec![c],
            ExportShape::Batch(cs) => cs,
        }
    }
}

/// Lazy iterator over the messages of an export tree.
///
/// Files are opened one at a time as the iterator advances. Warnings for
/// skipped files accumulate and can be read at any point.
pub struct ExportMessages {
    files: VecDeque<PathBuf>,
    pending: VecDeque<Record>,
    warnings: Vec<InputWarning>,
}

impl ExportMessages {
    /// Files that were skipped so far.
    pub fn warnings(&self) -> &[InputWarning] {
        &self.warnings
    }

    fn load_next_file(&mut self) -> bool {
        let Some(path) = self.files.pop_front() else {
            return false;
        };

        match parse_export_file(&path) {
            Ok(records) => {
                debug!(path = %path.display(), messages = records.len(), "loaded export file");
                self.pending.extend(records);
            }
            Err(message) => {
                warn!(path = %path.display(), "skipping export file: {}", message);
                self.warnings.push(InputWarning {
                    location: path.display().to_string(),
                    message,
                });
            }
        }
        true
    }
}

impl Iterator for ExportMessages {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(record);
            }
            if !self.load_next_file() {
                return None;
            }
        }
    }
}

/// Start iterating the messages under `export_root`.
///
/// Only directory traversal errors are reported here; per-file problems
/// become warnings on the returned iterator.
pub fn iter_messages(export_root: &Path) -> Result<ExportMessages> {
    let files = discover_files(export_root)?;
    Ok(ExportMessages {
        files: files.into(),
        pending: VecDeque::new(),
        warnings: Vec::new(),
    })
}

/// List the export files that [`iter_messages`] would read, in order.
pub fn discover_files(export_root: &Path) -> Result<Vec<PathBuf>> {
    if !export_root.exists() {
        debug!(root = %export_root.display(), "export root does not exist");
        return Ok(Vec::new());
    }

    let canonical = export_root.join(CANONICAL_FILE);
    if canonical.is_file() {
        return Ok(vec![canonical]);
    }

    let include = build_globset(&["**/*.json"])?;
    let mut files = Vec::new();

    for entry in WalkDir::new(export_root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(export_root).unwrap_or(path);
        if include.is_match(relative) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

fn parse_export_file(path: &Path) -> std::result::Result<Vec<Record>, String> {
    let content = std::fs::read_to_string(path).map_err(|e| format!("unreadable: {}", e))?;
    let value: Value =
        serde_json::from_str(&content).map_err(|e| format!("invalid JSON: {}", e))?;
    let shape = ExportShape::classify(value)?;

    let fallback_title = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut records = Vec::new();
    for conversation in shape.into_conversations() {
        collect_records(conversation, &fallback_title, &mut records);
    }
    Ok(records)
}

fn collect_records(conversation: Conversation, fallback_title: &str, out: &mut Vec<Record>) {
    let title = conversation
        .title
        .unwrap_or_else(|| fallback_title.to_string());

    for (_node_id, raw_node) in conversation.mapping {
        // A node we cannot interpret carries no message text.
        let Ok(node) = serde_json::from_value::<Node>(raw_node) else {
            continue;
        };
        let Some(message) = node.message else {
            continue;
        };

        let role = message
            .author
            .and_then(|a| a.role)
            .map(|r| Role::parse(&r))
            .unwrap_or(Role::Unknown);

        let text = message
            .content
            .and_then(|c| c.parts)
            .map(|parts| join_string_parts(&parts))
            .unwrap_or_default();

        if text.is_empty() {
            continue;
        }

        out.push(Record {
            conversation_title: title.clone(),
            role,
            text,
        });
    }
}

/// Keep only string parts, joined by a blank line and trimmed.
fn join_string_parts(parts: &[Value]) -> String {
    parts
        .iter()
        .filter_map(Value::as_str)
        .collect::<Vec<_>>()
        .join("\n\n")
        .trim()
        .to_string()
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
