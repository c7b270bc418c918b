//! Retrieval-augmented chat turn.
//!
//! One [`Assistant::ask`] call retrieves context for the prompt, wraps the
//! prompt with it when anything was found, sends the result to the chat
//! backend, and appends the exchange to the interaction log so the next
//! live ingest can index it.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::chat::{ChatBackend, ChatOptions};
use crate::context::ContextAssembler;
use crate::error::AskError;
use crate::interaction_log::{interaction_record, InteractionLog};

/// Base instructions for CLI turns.
const CLI_SYSTEM_PARTS: [&str; 6] = [
    "You are my local AI assistant. Your goal is to help me solve problems efficiently.",
    "You have access to a retrieval index of my past ChatGPT conversations and personal technical notes.",
    "Use retrieved context when it is clearly relevant and improves precision, otherwise rely on general reasoning.",
    "Keep answers concise, technically accurate, and directly actionable.",
    "If the query depends on missing details, ask for the minimal clarification needed.",
    "Avoid hallucinating; if uncertain, state the uncertainty and suggest a safe next action.",
];

/// Base instructions for turns arriving over HTTP.
const API_SYSTEM_PROMPT: &str = "You are my local AI assistant, backed by a personal memory index (RAG).\n\
Use retrieved context when it clearly helps; otherwise answer normally.\n\
Be concise, technically accurate, and directly actionable.\n";

/// CLI system prompt, optionally extended with the contents of `extra_file`.
///
/// A missing or unreadable file is warned about and ignored.
pub fn cli_system_prompt(extra_file: Option<&Path>) -> String {
    let mut parts: Vec<String> = CLI_SYSTEM_PARTS.iter().map(|s| s.to_string()).collect();

    if let Some(path) = extra_file {
        match std::fs::read_to_string(path) {
            Ok(text) => parts.push(text),
            Err(e) => warn!(path = %path.display(), "system prompt file not used: {}", e),
        }
    }

    parts.join("\n\n")
}

/// HTTP system prompt with any client-supplied system messages appended.
pub fn api_system_prompt(client_system: &str) -> String {
    let client_system = client_system.trim();
    if client_system.is_empty() {
        API_SYSTEM_PROMPT.to_string()
    } else {
        format!(
            "{}\nAdditional UI/system instructions:\n{}",
            API_SYSTEM_PROMPT, client_system
        )
    }
}

/// Wrap `prompt` with retrieved `context`.
pub fn wrap_prompt(context: &str, prompt: &str) -> String {
    format!(
        "Use the following retrieved context to answer the question if it is relevant.\n\
         If it is not relevant, ignore it and answer normally.\n\n\
         ### Retrieved context\n{}\n\n\
         ### Question\n{}",
        context, prompt
    )
}

/// One chat turn to run.
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub use_rag: bool,
    pub model: Option<String>,
    /// Origin tag written to the interaction log (`cli`, `web`).
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct AskOutcome {
    pub reply: String,
    pub model: String,
    pub used_rag: bool,
    pub sent_prompt: String,
    pub context: String,
    pub logged: bool,
}

pub struct Assistant {
    assembler: ContextAssembler,
    chat: Arc<dyn ChatBackend>,
    log: InteractionLog,
}

impl Assistant {
    pub fn new(assembler: ContextAssembler, chat: Arc<dyn ChatBackend>, log: InteractionLog) -> Self {
        Self {
            assembler,
            chat,
            log,
        }
    }

    pub fn default_model(&self) -> &str {
        self.chat.default_model()
    }

    pub async fn ask(&self, request: &AskRequest) -> Result<AskOutcome, AskError> {
        let context = if request.use_rag {
            self.assembler.assemble(&request.prompt).await?
        } else {
            String::new()
        };

        let used_rag = !context.is_empty();
        let sent_prompt = if used_rag {
            wrap_prompt(&context, &request.prompt)
        } else {
            request.prompt.clone()
        };

        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.chat.default_model().to_string());
        let options = ChatOptions {
            model: Some(model.clone()),
            ..Default::default()
        };

        let reply = self
            .chat
            .complete(&request.system_prompt, &sent_prompt, &options)
            .await?;

        info!(model = %model, used_rag, source = %request.source, "answered prompt");

        let logged = self.log.append(&interaction_record(
            &request.source,
            &model,
            used_rag,
            &request.prompt,
            &sent_prompt,
            &context,
            &reply,
        ));

        Ok(AskOutcome {
            reply,
            model,
            used_rag,
            sent_prompt,
            context,
            logged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_prompt_layout() {
        let wrapped = wrap_prompt("CTX", "What is NFS?");
        assert_eq!(
            wrapped,
            "Use the following retrieved context to answer the question if it is relevant.\n\
             If it is not relevant, ignore it and answer normally.\n\n\
             ### Retrieved context\nCTX\n\n### Question\nWhat is NFS?"
        );
    }

    #[test]
    fn cli_system_prompt_parts_joined() {
        let prompt = cli_system_prompt(None);
        assert!(prompt.starts_with("You are my local AI assistant."));
        assert_eq!(prompt.matches("\n\n").count(), 5);
    }

    #[test]
    fn cli_system_prompt_appends_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("extra.txt");
        std::fs::write(&path, "Answer in French.").unwrap();
        assert!(cli_system_prompt(Some(&path)).ends_with("\n\nAnswer in French."));
        assert!(!cli_system_prompt(Some(&tmp.path().join("missing.txt"))).contains("French"));
    }

    #[test]
    fn api_system_prompt_extension() {
        assert_eq!(api_system_prompt("  "), API_SYSTEM_PROMPT);
        let extended = api_system_prompt("Be brief.");
        assert!(extended.ends_with("actionable.\n\nAdditional UI/system instructions:\nBe brief."));
        assert!(!extended.contains("\n\n\n"));
    }
}
