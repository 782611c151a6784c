use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run repeatedly.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Create taxpayers table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS taxpayers (
            tax_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            check_digit TEXT NOT NULL,
            prior_tax_id TEXT,
            status TEXT NOT NULL DEFAULT 'UNKNOWN',
            source_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create source_syncs table (latest outcome per source partition)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_syncs (
            source_id TEXT PRIMARY KEY,
            archive_url TEXT NOT NULL,
            archive_sha256 TEXT NOT NULL,
            processed INTEGER NOT NULL,
            errors INTEGER NOT NULL,
            synced_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_taxpayers_source_id ON taxpayers(source_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_taxpayers_prior_tax_id ON taxpayers(prior_tax_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
