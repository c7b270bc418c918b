//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`DisabledEmbedder`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAiEmbedder`]**: calls an OpenAI-compatible `/embeddings` endpoint
//!   (OpenAI itself, LM Studio, llama.cpp server, ...).
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//!
//! Also provides vector utilities for the SQLite index:
//! - [`cosine_similarity`]: compute similarity between two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`]: decode a SQLite BLOB back into a `Vec<f32>`
//!
//! # Failure policy
//!
//! Every request carries the configured timeout. A failed or timed-out
//! request is returned to the caller as an [`EmbedError`]; nothing here
//! retries, so an ingestion batch either embeds completely or not at all.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// A batch embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed `texts` in one call, returning one vector per text in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Embed a batch and check the result shape.
///
/// An empty batch returns immediately without calling the backend.
pub async fn embed_batch(
    embedder: &dyn Embedder,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, EmbedError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let vectors = embedder.embed(texts).await?;

    if vectors.len() != texts.len() {
        return Err(EmbedError::CountMismatch {
            expected: texts.len(),
            got: vectors.len(),
        });
    }

    let dims = embedder.dims();
    if dims > 0 {
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(EmbedError::DimensionMismatch {
                expected: dims,
                got: bad.len(),
            });
        }
    }

    Ok(vectors)
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, EmbedError> {
    let results = embed_batch(embedder, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| EmbedError::MalformedResponse("empty embedding response".to_string()))
}

// ============ Disabled Provider ============

/// A no-op embedder that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Disabled)
    }
}

// ============ OpenAI-compatible Provider ============

/// Embedder for any server speaking the OpenAI embeddings API.
///
/// Sends `POST {url}/embeddings`. The `OPENAI_API_KEY` environment
/// variable is sent as a bearer token when set; local servers usually
/// do not need one.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for openai provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for openai provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            model,
            dims,
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let json = send_json(request, self.timeout_secs).await?;
        parse_openai_response(&json)
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays, ordered by `data[].index`
/// when the server supplies it.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbedError::MalformedResponse("missing data array".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| EmbedError::MalformedResponse("missing embedding".to_string()))?;
        indexed.push((index, parse_vector(embedding)?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedder backed by a local Ollama instance (`POST {url}/api/embed`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    timeout_secs: u64,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            model,
            dims,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let request = self
            .client
            .post(format!("{}/api/embed", self.url))
            .header("Content-Type", "application/json")
            .json(&body);

        let json = send_json(request, self.timeout_secs).await?;
        parse_ollama_response(&json)
    }
}

/// Parse Ollama's `{"embeddings": [[...], ...]}` response.
fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbedError::MalformedResponse("missing embeddings array".to_string()))?
        .iter()
        .map(parse_vector)
        .collect()
}

fn parse_vector(value: &serde_json::Value) -> Result<Vec<f32>, EmbedError> {
    value
        .as_array()
        .ok_or_else(|| EmbedError::MalformedResponse("embedding is not an array".to_string()))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EmbedError::MalformedResponse("non-numeric component".to_string()))
        })
        .collect()
}

async fn send_json(
    request: reqwest::RequestBuilder,
    timeout_secs: u64,
) -> Result<serde_json::Value, EmbedError> {
    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            EmbedError::Timeout(timeout_secs)
        } else {
            EmbedError::Transport(e)
        }
    };

    let response = request.send().await.map_err(classify)?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EmbedError::Http {
            status: status.as_u16(),
            body,
        });
    }

    response.json().await.map_err(classify)
}

/// Create the appropriate [`Embedder`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use local_brain::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-magnitude operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder {
        dims: usize,
        vectors: Vec<Vec<f32>>,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(self.vectors.clone())
        }
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_parse_openai_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_openai_missing_data() {
        let err = parse_openai_response(&serde_json::json!({"error": "x"})).unwrap_err();
        assert!(matches!(err, EmbedError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_ollama() {
        let json = serde_json::json!({ "embeddings": [[0.5, 0.25]] });
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![vec![0.5, 0.25]]);
    }

    #[tokio::test]
    async fn test_embed_batch_checks_count() {
        let embedder = FixedEmbedder {
            dims: 2,
            vectors: vec![vec![1.0, 0.0]],
        };
        let texts = vec!["a".to_string(), "b".to_string()];
        let err = embed_batch(&embedder, &texts).await.unwrap_err();
        assert!(matches!(
            err,
            EmbedError::CountMismatch {
                expected: 2,
                got: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_embed_batch_checks_dims() {
        let embedder = FixedEmbedder {
            dims: 3,
            vectors: vec![vec![1.0, 0.0]],
        };
        let err = embed_batch(&embedder, &["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbedError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_embed_batch_empty_skips_backend() {
        let vectors = embed_batch(&DisabledEmbedder, &[]).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_errors() {
        let err = embed_query(&DisabledEmbedder, "hello").await.unwrap_err();
        assert!(matches!(err, EmbedError::Disabled));
    }
}
