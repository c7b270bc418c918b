//! Vector index abstraction.
//!
//! The [`IndexStore`] trait is the only way the pipeline touches the
//! vector store. Two backends implement it:
//!
//! - [`SqliteStore`](sqlite::SqliteStore): the persistent index used by
//!   the CLI and server.
//! - [`InMemoryStore`](memory::InMemoryStore): same semantics without a
//!   database, used by tests.
//!
//! Entries are partitioned by [`Source`]; a full rebuild deletes only the
//! `bulk_export` partition and never touches `live` entries.

pub mod memory;
pub mod sqlite;

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{IndexEntry, QueryHit, Source};

/// Abstract vector index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](IndexStore::add) | Insert entries, replacing any with the same id |
/// | [`query`](IndexStore::query) | Nearest neighbors, most relevant first |
/// | [`delete`](IndexStore::delete) | Drop one source partition |
/// | [`count`](IndexStore::count) | Count entries, optionally per partition |
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Add entries. An entry whose id already exists replaces the old one.
    async fn add(&self, entries: Vec<IndexEntry>) -> Result<(), StoreError>;

    /// Return up to `n` hits ordered by descending similarity to `vector`.
    async fn query(&self, vector: &[f32], n: usize) -> Result<Vec<QueryHit>, StoreError>;

    /// Delete every entry of `source`, returning how many were removed.
    async fn delete(&self, source: Source) -> Result<u64, StoreError>;

    async fn count(&self, source: Option<Source>) -> Result<u64, StoreError>;
}

/// Sort scored hits by descending score and keep the first `n`.
///
/// The sort is stable, so equal scores keep insertion order.
pub(crate) fn rank_hits(mut hits: Vec<QueryHit>, n: usize) -> Vec<QueryHit> {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    hits.truncate(n);
    hits
}
