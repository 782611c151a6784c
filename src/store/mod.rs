//! Storage abstraction for taxpayer records.
//!
//! The [`RecordStore`] trait is the only boundary between the ingestion
//! pipeline and a storage engine. Writes arrive exclusively through
//! [`upsert_batch`](RecordStore::upsert_batch), which must be atomic per
//! call; everything else is a read primitive for the query API.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{SourceSync, TaxpayerRecord};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Abstract storage backend for taxpayer records.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_batch`](RecordStore::upsert_batch) | Atomically insert or update many records |
/// | [`find_all`](RecordStore::find_all) | Page through records ordered by tax id |
/// | [`find_by_key`](RecordStore::find_by_key) | Exact tax id lookup |
/// | [`find_by_key_prefix`](RecordStore::find_by_key_prefix) | First record whose tax id starts with a prefix |
/// | [`has_any_records`](RecordStore::has_any_records) | Whether any data has been loaded |
/// | [`count_by_source`](RecordStore::count_by_source) | Record totals per source partition |
/// | [`record_sync`](RecordStore::record_sync) | Remember the latest ingestion outcome of a source |
/// | [`list_syncs`](RecordStore::list_syncs) | All remembered ingestion outcomes |
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or update every record, keyed by `tax_id`, in one transaction.
    ///
    /// Existing rows have all non-key fields overwritten. On error nothing
    /// from this call is visible; earlier calls are unaffected.
    async fn upsert_batch(&self, records: &[TaxpayerRecord]) -> Result<()>;

    async fn find_all(&self, limit: i64, offset: i64) -> Result<Vec<TaxpayerRecord>>;

    async fn find_by_key(&self, tax_id: &str) -> Result<Option<TaxpayerRecord>>;

    /// Identity documents are tax ids without the check-digit suffix, so a
    /// prefix lookup resolves a document number to its taxpayer.
    async fn find_by_key_prefix(&self, prefix: &str) -> Result<Option<TaxpayerRecord>>;

    async fn has_any_records(&self) -> Result<bool>;

    /// `(source_id, count)` pairs ordered by source id.
    async fn count_by_source(&self) -> Result<Vec<(String, i64)>>;

    async fn record_sync(&self, sync: &SourceSync) -> Result<()>;

    async fn list_syncs(&self) -> Result<Vec<SourceSync>>;
}
