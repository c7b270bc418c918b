//! Context-window assembly.
//!
//! Turns a query into a block of prior conversation snippets for the
//! chat model: embed the query, take the store's `k` nearest entries in
//! the order the store returns them, and pack formatted pieces until the
//! next one would overflow the character budget. Packing stops at the
//! first piece that does not fit; later, shorter pieces are not tried.

use std::sync::Arc;

use tracing::debug;

use crate::config::RetrievalConfig;
use crate::embedding::{embed_query, Embedder};
use crate::error::RetrievalError;
use crate::models::QueryHit;
use crate::store::IndexStore;

/// Prepended to every non-empty context block.
pub const CONTEXT_HEADER: &str = "The following context is retrieved from my past ChatGPT conversations. \
Use it to ground your answer, but do NOT repeat it verbatim unless necessary.\n\n";

const PIECE_SEPARATOR: &str = "\n\n";

/// Retrieve and pack context for `query`.
///
/// Returns `""` for a blank query (without touching the store) or when
/// nothing fits the budget.
pub async fn assemble_context(
    store: &dyn IndexStore,
    embedder: &dyn Embedder,
    query: &str,
    k: usize,
    max_chars: usize,
) -> Result<String, RetrievalError> {
    if query.trim().is_empty() {
        return Ok(String::new());
    }

    let vector = embed_query(embedder, query).await?;
    let hits = store.query(&vector, k).await?;
    debug!(hits = hits.len(), k, "retrieved context candidates");

    Ok(pack_context(&hits, max_chars))
}

/// Pack hits, in order, into a context block of at most `max_chars`
/// characters of piece text (header and separators excluded).
pub fn pack_context(hits: &[QueryHit], max_chars: usize) -> String {
    let mut pieces = Vec::new();
    let mut total = 0usize;

    for hit in hits {
        let piece = format_piece(hit);
        let len = piece.chars().count();
        if total + len > max_chars {
            break;
        }
        total += len;
        pieces.push(piece);
    }

    if pieces.is_empty() {
        return String::new();
    }

    format!("{}{}", CONTEXT_HEADER, pieces.join(PIECE_SEPARATOR))
}

/// `"[<title>] (<role>):\n<document>\n"`, with `unknown` for missing fields.
pub fn format_piece(hit: &QueryHit) -> String {
    let title = hit
        .metadata
        .conversation_title
        .as_deref()
        .unwrap_or("unknown");
    let role = hit.metadata.role.map(|r| r.as_str()).unwrap_or("unknown");
    format!("[{}] ({}):\n{}\n", title, role, hit.document)
}

/// Retrieval settings bound to a store and embedder.
#[derive(Clone)]
pub struct ContextAssembler {
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    max_chars: usize,
}

impl ContextAssembler {
    pub fn new(
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn Embedder>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            top_k: retrieval.top_k,
            max_chars: retrieval.max_context_chars,
        }
    }

    pub async fn assemble(&self, query: &str) -> Result<String, RetrievalError> {
        assemble_context(
            self.store.as_ref(),
            self.embedder.as_ref(),
            query,
            self.top_k,
            self.max_chars,
        )
        .await
    }
}
