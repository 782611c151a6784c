//! SQLite-backed [`RecordStore`] implementation.
//!
//! Each `upsert_batch` call runs inside a single `pool.begin()` transaction
//! using `INSERT ... ON CONFLICT(tax_id) DO UPDATE`, so a batch is either
//! fully visible or not at all. Readers on other pool connections see
//! committed batches only (WAL mode).

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::models::{SourceSync, TaxpayerRecord};
use crate::{db, migrate};

use super::RecordStore;

const RECORD_COLUMNS: &str = "tax_id, name, check_digit, prior_tax_id, status, source_id";

/// SQLite implementation of the [`RecordStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database, creating the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_record(row: &SqliteRow) -> TaxpayerRecord {
    TaxpayerRecord {
        tax_id: row.get("tax_id"),
        name: row.get("name"),
        check_digit: row.get("check_digit"),
        prior_tax_id: row.get("prior_tax_id"),
        status: row.get("status"),
        source_id: row.get("source_id"),
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn upsert_batch(&self, records: &[TaxpayerRecord]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO taxpayers (tax_id, name, check_digit, prior_tax_id, status,
                                       source_id, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(tax_id) DO UPDATE SET
                    name = excluded.name,
                    check_digit = excluded.check_digit,
                    prior_tax_id = excluded.prior_tax_id,
                    status = excluded.status,
                    source_id = excluded.source_id,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&record.tax_id)
            .bind(&record.name)
            .bind(&record.check_digit)
            .bind(&record.prior_tax_id)
            .bind(&record.status)
            .bind(&record.source_id)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("upsert of tax id {} failed", record.tax_id))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> Result<Vec<TaxpayerRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM taxpayers ORDER BY tax_id LIMIT ? OFFSET ?",
            RECORD_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn find_by_key(&self, tax_id: &str) -> Result<Option<TaxpayerRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM taxpayers WHERE tax_id = ?",
            RECORD_COLUMNS
        ))
        .bind(tax_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_record))
    }

    async fn find_by_key_prefix(&self, prefix: &str) -> Result<Option<TaxpayerRecord>> {
        // Smallest key >= prefix is the first prefixed key, if any exists.
        let row = sqlx::query(&format!(
            "SELECT {} FROM taxpayers WHERE tax_id >= ? ORDER BY tax_id LIMIT 1",
            RECORD_COLUMNS
        ))
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .as_ref()
            .map(row_to_record)
            .filter(|r| r.tax_id.starts_with(prefix)))
    }

    async fn has_any_records(&self) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM taxpayers)")
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn count_by_source(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT source_id, COUNT(*) AS n FROM taxpayers GROUP BY source_id ORDER BY source_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("source_id"), row.get("n")))
            .collect())
    }

    async fn record_sync(&self, sync: &SourceSync) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO source_syncs (source_id, archive_url, archive_sha256, processed, errors, synced_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_id) DO UPDATE SET
                archive_url = excluded.archive_url,
                archive_sha256 = excluded.archive_sha256,
                processed = excluded.processed,
                errors = excluded.errors,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(&sync.source_id)
        .bind(&sync.archive_url)
        .bind(&sync.archive_sha256)
        .bind(sync.processed as i64)
        .bind(sync.errors as i64)
        .bind(sync.synced_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_syncs(&self) -> Result<Vec<SourceSync>> {
        let rows = sqlx::query(
            "SELECT source_id, archive_url, archive_sha256, processed, errors, synced_at \
             FROM source_syncs ORDER BY source_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SourceSync {
                source_id: row.get("source_id"),
                archive_url: row.get("archive_url"),
                archive_sha256: row.get("archive_sha256"),
                processed: row.get::<i64, _>("processed") as u64,
                errors: row.get::<i64, _>("errors") as u64,
                synced_at: row.get("synced_at"),
            })
            .collect())
    }
}
