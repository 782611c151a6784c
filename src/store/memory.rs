//! In-memory [`RecordStore`] implementation for tests and dry runs.
//!
//! Uses a `BTreeMap` behind `std::sync::RwLock` so iteration order matches
//! the SQLite store's `ORDER BY tax_id`. Every `upsert_batch` call is logged,
//! which lets tests observe flush boundaries.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{SourceSync, TaxpayerRecord};

use super::RecordStore;

/// In-memory store for testing.
pub struct InMemoryStore {
    records: RwLock<BTreeMap<String, TaxpayerRecord>>,
    syncs: RwLock<BTreeMap<String, SourceSync>>,
    batches: RwLock<Vec<usize>>,
    fail_writes: AtomicBool,
    /// Source id whose batches start failing once the allowance runs out.
    fail_source: Mutex<Option<(String, usize)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            syncs: RwLock::new(BTreeMap::new()),
            batches: RwLock::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
            fail_source: Mutex::new(None),
        }
    }

    /// Sizes of every successful `upsert_batch` call, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make subsequent `upsert_batch` calls fail, simulating a broken database.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Let `batches` more batches for `source_id` succeed, then fail every
    /// later one for that source. Other sources are unaffected.
    pub fn fail_source_after(&self, source_id: &str, batches: usize) {
        *self.fail_source.lock().unwrap() = Some((source_id.to_string(), batches));
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn upsert_batch(&self, records: &[TaxpayerRecord]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("simulated write failure");
        }
        if let Some((source, allowance)) = self.fail_source.lock().unwrap().as_mut() {
            if records.iter().any(|r| r.source_id == *source) {
                if *allowance == 0 {
                    bail!("simulated write failure for source {}", source);
                }
                *allowance -= 1;
            }
        }
        let mut map = self.records.write().unwrap();
        for record in records {
            map.insert(record.tax_id.clone(), record.clone());
        }
        self.batches.write().unwrap().push(records.len());
        Ok(())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> Result<Vec<TaxpayerRecord>> {
        let map = self.records.read().unwrap();
        Ok(map
            .values()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn find_by_key(&self, tax_id: &str) -> Result<Option<TaxpayerRecord>> {
        Ok(self.records.read().unwrap().get(tax_id).cloned())
    }

    async fn find_by_key_prefix(&self, prefix: &str) -> Result<Option<TaxpayerRecord>> {
        let map = self.records.read().unwrap();
        Ok(map
            .range(prefix.to_string()..)
            .next()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(_, v)| v.clone()))
    }

    async fn has_any_records(&self) -> Result<bool> {
        Ok(!self.records.read().unwrap().is_empty())
    }

    async fn count_by_source(&self) -> Result<Vec<(String, i64)>> {
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for record in self.records.read().unwrap().values() {
            *counts.entry(record.source_id.clone()).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn record_sync(&self, sync: &SourceSync) -> Result<()> {
        self.syncs
            .write()
            .unwrap()
            .insert(sync.source_id.clone(), sync.clone());
        Ok(())
    }

    async fn list_syncs(&self) -> Result<Vec<SourceSync>> {
        Ok(self.syncs.read().unwrap().values().cloned().collect())
    }
}
