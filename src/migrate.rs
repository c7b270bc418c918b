use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::db;

/// Create the index schema. Safe to run repeatedly.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            id TEXT NOT NULL,
            collection TEXT NOT NULL,
            source TEXT NOT NULL,
            document TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_entries_collection_source ON entries(collection, source)",
    )
    .execute(&pool)
    .await?;

    info!(path = %config.paths.index_db().display(), "index schema ready");

    pool.close().await;
    Ok(())
}
