#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use local_brain::chat::{ChatBackend, ChatOptions};
use local_brain::config::{parse_config, Config};
use local_brain::embedding::Embedder;
use local_brain::error::{ChatError, EmbedError, StoreError};
use local_brain::models::{IndexEntry, QueryHit, Source};
use local_brain::progress::{IngestProgressEvent, IngestProgressReporter};
use local_brain::store::memory::InMemoryStore;
use local_brain::store::IndexStore;

pub const DIMS: usize = 26;

/// Letter-frequency embedder: texts sharing letters land close together.
///
/// Fails every call from `fail_from_call` (0-based) onwards when set.
pub struct LetterEmbedder {
    calls: AtomicUsize,
    fail_from_call: Option<usize>,
    batch_sizes: Mutex<Vec<usize>>,
}

impl LetterEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_from_call: None,
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_from(call: usize) -> Self {
        Self {
            fail_from_call: Some(call),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }
}

pub fn letter_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for c in text.chars().flat_map(|c| c.to_lowercase()) {
        if c.is_ascii_lowercase() {
            v[(c as u8 - b'a') as usize] += 1.0;
        }
    }
    v
}

#[async_trait]
impl Embedder for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if matches!(self.fail_from_call, Some(n) if call >= n) {
            return Err(EmbedError::Timeout(30));
        }
        self.batch_sizes.lock().unwrap().push(texts.len());
        Ok(texts.iter().map(|t| letter_vector(t)).collect())
    }
}

/// Chat backend that echoes the prompt it was sent.
pub struct EchoChat {
    pub last_system: Mutex<String>,
    pub last_user: Mutex<String>,
}

impl EchoChat {
    pub fn new() -> Self {
        Self {
            last_system: Mutex::new(String::new()),
            last_user: Mutex::new(String::new()),
        }
    }
}

#[async_trait]
impl ChatBackend for EchoChat {
    fn default_model(&self) -> &str {
        "echo-model"
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        _options: &ChatOptions,
    ) -> Result<String, ChatError> {
        *self.last_system.lock().unwrap() = system.to_string();
        *self.last_user.lock().unwrap() = user.to_string();
        Ok(format!("echo: {}", user.lines().last().unwrap_or_default()))
    }
}

/// In-memory store whose `delete` can be made to fail, and whose `add`
/// fails from call `fail_add_from` (0-based) onwards.
pub struct FlakyStore {
    pub inner: InMemoryStore,
    fail_delete: bool,
    fail_add_from: Option<usize>,
    adds: AtomicUsize,
}

impl FlakyStore {
    pub fn new(fail_delete: bool, fail_add_from: Option<usize>) -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_delete,
            fail_add_from,
            adds: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl IndexStore for FlakyStore {
    async fn add(&self, entries: Vec<IndexEntry>) -> Result<(), StoreError> {
        let call = self.adds.fetch_add(1, Ordering::SeqCst);
        if matches!(self.fail_add_from, Some(n) if call >= n) {
            return Err(StoreError::Poisoned);
        }
        self.inner.add(entries).await
    }

    async fn query(&self, vector: &[f32], n: usize) -> Result<Vec<QueryHit>, StoreError> {
        self.inner.query(vector, n).await
    }

    async fn delete(&self, source: Source) -> Result<u64, StoreError> {
        if self.fail_delete {
            return Err(StoreError::Poisoned);
        }
        self.inner.delete(source).await
    }

    async fn count(&self, source: Option<Source>) -> Result<u64, StoreError> {
        self.inner.count(source).await
    }
}

/// Progress reporter that keeps every event for later inspection.
#[derive(Clone, Default)]
pub struct RecordingProgress {
    pub events: Arc<Mutex<Vec<IngestProgressEvent>>>,
}

impl IngestProgressReporter for RecordingProgress {
    fn report(&self, event: IngestProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Config rooted at `root` with small batch sizes.
pub fn test_config(root: &Path, export_batch: usize, live_batch: usize) -> Config {
    parse_config(&format!(
        r#"
[paths]
base_dir = "{}"
export_dir = "chat_export"
live_log = "data/conversations.jsonl"
cursor = "data/conversations_ingest_state.json"

[chunking]
max_chars = 40

[ingest]
export_batch_size = {}
live_batch_size = {}

[retrieval]
top_k = 8
max_context_chars = 8000
"#,
        root.display(),
        export_batch,
        live_batch
    ))
    .unwrap()
}

pub fn conversation(title: &str, turns: &[(&str, &str)]) -> serde_json::Value {
    let mut mapping = serde_json::Map::new();
    mapping.insert("root".to_string(), serde_json::json!({ "message": null }));
    for (i, (role, text)) in turns.iter().enumerate() {
        mapping.insert(
            format!("n{}", i),
            serde_json::json!({
                "message": {
                    "author": { "role": role },
                    "content": { "parts": [text] }
                }
            }),
        );
    }
    serde_json::json!({ "title": title, "mapping": mapping })
}

pub fn write_export(config: &Config, conversations: &[serde_json::Value]) {
    std::fs::create_dir_all(&config.paths.export_dir).unwrap();
    std::fs::write(
        config.paths.export_dir.join("conversations.json"),
        serde_json::Value::Array(conversations.to_vec()).to_string(),
    )
    .unwrap();
}

pub fn live_line(prompt: &str, reply: &str) -> String {
    serde_json::json!({
        "timestamp": "2025-05-01T09:00:00+00:00",
        "source": "cli",
        "model": "gpt-oss",
        "used_rag": false,
        "user_prompt": prompt,
        "sent_prompt": prompt,
        "rag_context": "",
        "assistant_reply": reply,
    })
    .to_string()
}

pub fn write_live_log(config: &Config, lines: &[String]) {
    if let Some(parent) = config.paths.live_log.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(&config.paths.live_log, content).unwrap();
}
