//! In-memory [`IndexStore`] implementation for tests.
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`, kept in insertion
//! order. Queries are brute-force cosine similarity over every entry.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::StoreError;
use crate::models::{IndexEntry, QueryHit, Source};

use super::{rank_hits, IndexStore};

#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<Vec<IndexEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids currently stored, in insertion order.
    pub fn ids(&self) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.iter().map(|e| e.id.clone()).collect())
    }

    pub fn get(&self, id: &str) -> Result<Option<IndexEntry>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.iter().find(|e| e.id == id).cloned())
    }
}

#[async_trait]
impl IndexStore for InMemoryStore {
    async fn add(&self, new_entries: Vec<IndexEntry>) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        for entry in new_entries {
            match entries.iter_mut().find(|e| e.id == entry.id) {
                Some(existing) => *existing = entry,
                None => entries.push(entry),
            }
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], n: usize) -> Result<Vec<QueryHit>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        let hits = entries
            .iter()
            .map(|e| QueryHit {
                id: e.id.clone(),
                document: e.document.clone(),
                metadata: e.metadata.clone(),
                score: cosine_similarity(vector, &e.embedding),
            })
            .collect();
        Ok(rank_hits(hits, n))
    }

    async fn delete(&self, source: Source) -> Result<u64, StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        let before = entries.len();
        entries.retain(|e| e.metadata.source != source);
        Ok((before - entries.len()) as u64)
    }

    async fn count(&self, source: Option<Source>) -> Result<u64, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        let n = match source {
            Some(s) => entries.iter().filter(|e| e.metadata.source == s).count(),
            None => entries.len(),
        };
        Ok(n as u64)
    }
}
