//! SQLite-backed [`IndexStore`].
//!
//! Every entry is one row of the `entries` table (see
//! [`migrate`](crate::migrate)), scoped to the configured collection.
//! Vectors are stored as little-endian `f32` BLOBs and scored in Rust
//! with cosine similarity, which is plenty for a personal index of a
//! few hundred thousand chunks.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::StoreError;
use crate::models::{EntryMetadata, IndexEntry, QueryHit, Source};

use super::{rank_hits, IndexStore};

pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    /// Ensure the schema exists, then connect to the configured index.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        crate::migrate::run_migrations(config).await?;
        let pool = crate::db::connect(config).await?;
        Ok(Self::new(pool, config.index.collection.clone()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl IndexStore for SqliteStore {
    async fn add(&self, entries: Vec<IndexEntry>) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            let metadata_json = serde_json::to_string(&entry.metadata)?;
            let blob = vec_to_blob(&entry.embedding);

            sqlx::query(
                r#"
                INSERT INTO entries (id, collection, source, document, metadata_json,
                                     embedding, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    source = excluded.source,
                    document = excluded.document,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    dims = excluded.dims
                "#,
            )
            .bind(&entry.id)
            .bind(&self.collection)
            .bind(entry.metadata.source.as_str())
            .bind(&entry.document)
            .bind(&metadata_json)
            .bind(&blob)
            .bind(entry.embedding.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], n: usize) -> Result<Vec<QueryHit>, StoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, document, metadata_json, embedding FROM entries \
             WHERE collection = ? ORDER BY rowid",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata_json: String = row.get("metadata_json");
            let metadata: EntryMetadata = serde_json::from_str(&metadata_json)?;
            let blob: Vec<u8> = row.get("embedding");

            hits.push(QueryHit {
                id: row.get("id"),
                document: row.get("document"),
                metadata,
                score: cosine_similarity(vector, &blob_to_vec(&blob)),
            });
        }

        Ok(rank_hits(hits, n))
    }

    async fn delete(&self, source: Source) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM entries WHERE collection = ? AND source = ?")
            .bind(&self.collection)
            .bind(source.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self, source: Option<Source>) -> Result<u64, StoreError> {
        let count: i64 = match source {
            Some(s) => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM entries WHERE collection = ? AND source = ?",
                )
                .bind(&self.collection)
                .bind(s.as_str())
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE collection = ?")
                    .bind(&self.collection)
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count as u64)
    }
}
