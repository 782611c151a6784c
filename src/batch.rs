//! Buffered, transactional record writes.

use anyhow::Result;

use crate::models::TaxpayerRecord;
use crate::store::RecordStore;

/// Buffers records and hands them to [`RecordStore::upsert_batch`] in
/// groups of `batch_size`.
///
/// Callers must invoke [`flush`](BatchWriter::flush) once input ends; a
/// writer dropped with buffered records loses them.
pub struct BatchWriter<'a> {
    store: &'a dyn RecordStore,
    batch_size: usize,
    buffer: Vec<TaxpayerRecord>,
    flushes: usize,
    written: u64,
}

impl<'a> BatchWriter<'a> {
    pub fn new(store: &'a dyn RecordStore, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            flushes: 0,
            written: 0,
        }
    }

    /// Buffer one record, flushing when the buffer reaches `batch_size`.
    pub async fn add(&mut self, record: TaxpayerRecord) -> Result<()> {
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Write any buffered records as one transaction. No-op when empty.
    ///
    /// On failure the buffer is discarded so a retrying caller cannot
    /// double-apply a partially examined batch.
    pub async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        self.store.upsert_batch(&batch).await?;
        self.flushes += 1;
        self.written += batch.len() as u64;
        tracing::debug!(records = batch.len(), flushes = self.flushes, "batch committed");
        self.buffer = batch;
        self.buffer.clear();
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Number of committed transactions so far.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Number of records committed so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}
