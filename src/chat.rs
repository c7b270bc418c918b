//! Chat completion backend.
//!
//! [`ChatBackend`] is the seam between the ask flow and the language
//! model. [`OpenAiCompatChat`] talks to any server exposing the OpenAI
//! `/chat/completions` API (LM Studio, llama.cpp, vLLM, OpenAI). One
//! request per call with the configured timeout; failures are returned,
//! never retried.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ChatConfig;
use crate::error::ChatError;

/// One chat message in OpenAI wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Per-call overrides; `None` falls back to the backend's configuration.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Model used when a call does not override it.
    fn default_model(&self) -> &str;

    /// Send `system` (omitted when empty) and `user`, returning the reply text.
    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &ChatOptions,
    ) -> Result<String, ChatError>;
}

pub struct OpenAiCompatChat {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
}

impl OpenAiCompatChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: std::env::var(&config.api_key_env).ok(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatChat {
    fn default_model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &ChatOptions,
    ) -> Result<String, ChatError> {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(user));

        let model = options.model.as_deref().unwrap_or(&self.model);
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": options.temperature.unwrap_or(self.temperature),
            "max_tokens": options.max_tokens.unwrap_or(self.max_tokens),
            "stream": false,
        });

        let mut request = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                ChatError::Timeout(self.timeout_secs)
            } else {
                ChatError::Transport(e)
            }
        };

        debug!(model, "sending chat completion");
        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response.json().await.map_err(classify)?;
        extract_reply(&json)
    }
}

/// Pull `choices[0].message.content` out of a completion response.
pub fn extract_reply(json: &serde_json::Value) -> Result<String, ChatError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            ChatError::MalformedResponse(format!("no choices[0].message.content in {}", json))
        })
}

/// Round-trip a fixed diagnostic prompt through the backend.
pub async fn ping(chat: &dyn ChatBackend) -> Result<String, ChatError> {
    let options = ChatOptions {
        model: None,
        temperature: Some(0.0),
        max_tokens: Some(16),
    };
    let reply = chat
        .complete(
            "You are a diagnostic helper.",
            "Reply with: LM STUDIO OK",
            &options,
        )
        .await?;
    Ok(reply.trim().to_string())
}
