//! Core data models used throughout Local Brain.
//!
//! These types represent the records, index entries, and query hits that
//! flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Deserializer, Serialize};

/// Author role of an exported message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Unknown,
}

impl Role {
    /// Parse an export `author.role`; anything unrecognized is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partition tag carried in every entry's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    BulkExport,
    Live,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::BulkExport => "bulk_export",
            Source::Live => "live",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message produced by the export loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub conversation_title: String,
    pub role: Role,
    pub text: String,
}

/// Metadata stored next to each indexed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_rag: Option<bool>,
}

impl EntryMetadata {
    /// Metadata for a chunk of an exported conversation.
    pub fn bulk_export(title: &str, role: Role) -> Self {
        Self {
            source: Source::BulkExport,
            conversation_title: Some(title.to_string()),
            role: Some(role),
            timestamp: None,
            model: None,
            used_rag: None,
        }
    }

    /// Metadata for one live-log turn.
    pub fn live(timestamp: &str, model: &str, used_rag: bool) -> Self {
        Self {
            source: Source::Live,
            conversation_title: None,
            role: None,
            timestamp: Some(timestamp.to_string()),
            model: Some(model.to_string()),
            used_rag: Some(used_rag),
        }
    }
}

/// A document ready to be handed to the index. Ownership moves to the
/// store on `add`.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub document: String,
    pub metadata: EntryMetadata,
    pub embedding: Vec<f32>,
}

/// A nearest-neighbor result, in the order the store returned it.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub document: String,
    pub metadata: EntryMetadata,
    pub score: f32,
}

/// One line of the live interaction log (JSONL).
///
/// Absent or `null` fields read as empty, so older log lines with fewer
/// fields still parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub used_rag: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_prompt: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sent_prompt: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rag_context: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub assistant_reply: String,
}

impl LiveRecord {
    /// True when both sides of the turn are blank.
    pub fn is_noise(&self) -> bool {
        self.user_prompt.trim().is_empty() && self.assistant_reply.trim().is_empty()
    }

    /// The labeled block stored as the entry's document.
    pub fn document(&self) -> String {
        format!(
            "[{}] (cli, model={}, used_rag={})\nUser:\n{}\n\nAssistant:\n{}\n",
            self.timestamp,
            self.model,
            self.used_rag,
            self.user_prompt.trim(),
            self.assistant_reply.trim()
        )
        .trim()
        .to_string()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_falls_back_to_unknown() {
        assert_eq!(Role::parse("user"), Role::User);
        assert_eq!(Role::parse("assistant"), Role::Assistant);
        assert_eq!(Role::parse("system"), Role::System);
        assert_eq!(Role::parse("tool"), Role::Unknown);
        assert_eq!(Role::parse(""), Role::Unknown);
    }

    #[test]
    fn metadata_serializes_partition_tag() {
        let meta = EntryMetadata::live("2025-01-01T00:00:00Z", "gpt-oss", true);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["source"], "live");
        assert_eq!(json["used_rag"], true);
        assert!(json.get("role").is_none());

        let meta = EntryMetadata::bulk_export("Trip", Role::Assistant);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["source"], "bulk_export");
        assert_eq!(json["role"], "assistant");
    }

    #[test]
    fn live_record_tolerates_missing_and_null_fields() {
        let rec: LiveRecord =
            serde_json::from_str(r#"{"user_prompt": "hi", "model": null}"#).unwrap();
        assert_eq!(rec.user_prompt, "hi");
        assert_eq!(rec.model, "");
        assert!(!rec.used_rag);
        assert!(!rec.is_noise());
    }

    #[test]
    fn live_record_document_layout() {
        let rec = LiveRecord {
            timestamp: "2025-03-01T12:00:00+00:00".to_string(),
            model: "gpt-oss".to_string(),
            used_rag: true,
            user_prompt: "  How do I list ports?\n".to_string(),
            assistant_reply: "Use ss -tlnp.".to_string(),
            ..Default::default()
        };
        assert_eq!(
            rec.document(),
            "[2025-03-01T12:00:00+00:00] (cli, model=gpt-oss, used_rag=true)\n\
             User:\nHow do I list ports?\n\nAssistant:\nUse ss -tlnp."
        );
    }

    #[test]
    fn blank_turn_is_noise() {
        let rec = LiveRecord {
            user_prompt: "  ".to_string(),
            assistant_reply: "\n".to_string(),
            ..Default::default()
        };
        assert!(rec.is_noise());
    }
}
