//! Daily position snapshots and their persistence.
//!
//! A snapshot row is immutable once written. Idempotence comes from
//! delete-then-insert on the (fund, date) slice rather than upserts, so
//! re-running a day can never leave stale rows behind. Inserts go in
//! size-bounded chunks; a failed chunk is retried once at half size, and
//! every write is verified by re-counting the day. Verification failures
//! land on a bounded in-memory retry queue consumed by a repair pass.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{error, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::constants::{RETRY_QUEUE_CAPACITY, SNAPSHOT_CHUNK_SIZE};
use crate::errors::{Error, Result};

/// One valued position on one day.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub fund: String,
    pub ticker: String,
    pub date: NaiveDate,
    pub shares: Decimal,
    /// Closing price in the position's trading currency.
    pub price: Decimal,
    pub cost_basis: Decimal,
    pub pnl: Decimal,
    /// Trading currency of `price`, `cost_basis`, and `pnl`.
    pub currency: String,
    /// Fund base currency of the `_base` figures.
    pub base_currency: String,
    pub value_base: Decimal,
    pub cost_basis_base: Decimal,
    pub pnl_base: Decimal,
    /// Rate applied converting trading currency to base currency.
    pub fx_rate: Decimal,
}

/// Persistence for snapshot rows.
#[async_trait]
pub trait SnapshotRepositoryTrait: Send + Sync {
    /// Delete every row for (fund, date).
    async fn delete_day(&self, fund: &str, date: NaiveDate) -> Result<()>;

    /// Insert one chunk of rows. All rows share (fund, date).
    async fn insert_chunk(&self, rows: &[PositionSnapshot]) -> Result<()>;

    /// Count stored rows for (fund, date).
    async fn count_day(&self, fund: &str, date: NaiveDate) -> Result<usize>;
}

/// A (fund, date) slice awaiting a repair pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRetry {
    pub fund: String,
    pub date: NaiveDate,
    pub reason: String,
}

/// Bounded FIFO of failed writes. Overflow drops the oldest entry with an
/// error log; losing track of a retry is preferable to unbounded growth
/// inside a long backfill.
#[derive(Debug)]
pub struct RetryQueue {
    entries: Mutex<VecDeque<PendingRetry>>,
    capacity: usize,
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::with_capacity(RETRY_QUEUE_CAPACITY)
    }
}

impl RetryQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub async fn push(&self, entry: PendingRetry) {
        let mut entries = self.entries.lock().await;
        if entries.len() == self.capacity {
            if let Some(dropped) = entries.pop_front() {
                error!(
                    "Retry queue full; dropping oldest entry {} {}",
                    dropped.fund, dropped.date
                );
            }
        }
        entries.push_back(entry);
    }

    /// Drain every pending entry, oldest first.
    pub async fn drain(&self) -> Vec<PendingRetry> {
        let mut entries = self.entries.lock().await;
        entries.drain(..).collect()
    }

    pub async fn snapshot(&self) -> Vec<PendingRetry> {
        self.entries.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

/// Writes one fund-day of snapshot rows idempotently.
pub struct SnapshotWriter {
    repository: Arc<dyn SnapshotRepositoryTrait>,
    retry_queue: Arc<RetryQueue>,
    chunk_size: usize,
}

impl SnapshotWriter {
    pub fn new(repository: Arc<dyn SnapshotRepositoryTrait>, retry_queue: Arc<RetryQueue>) -> Self {
        Self {
            repository,
            retry_queue,
            chunk_size: SNAPSHOT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Replace the (fund, date) slice with `rows`.
    ///
    /// On any insert or verification failure the slice is queued for
    /// retry and the error returned; rows for other days are unaffected.
    pub async fn replace_day(
        &self,
        fund: &str,
        date: NaiveDate,
        rows: &[PositionSnapshot],
    ) -> Result<()> {
        debug_assert!(rows.iter().all(|r| r.fund == fund && r.date == date));

        self.repository.delete_day(fund, date).await?;

        for chunk in rows.chunks(self.chunk_size) {
            if let Err(first) = self.repository.insert_chunk(chunk).await {
                warn!(
                    "Chunk insert failed for {} {} ({} rows): {}; retrying at half size",
                    fund,
                    date,
                    chunk.len(),
                    first
                );
                if let Err(second) = self.insert_halved(chunk).await {
                    self.queue_retry(fund, date, &second.to_string()).await;
                    return Err(second);
                }
            }
        }

        let stored = self.repository.count_day(fund, date).await?;
        if stored != rows.len() {
            let mismatch = Error::PersistenceMismatch {
                fund: fund.to_string(),
                date,
                expected: rows.len(),
                actual: stored,
            };
            self.queue_retry(fund, date, &mismatch.to_string()).await;
            return Err(mismatch);
        }

        info!("Wrote {} snapshot rows for {} {}", rows.len(), fund, date);
        Ok(())
    }

    /// Consume the retry queue, re-running each slice through the writer.
    /// Slices that fail again go back on the queue.
    pub async fn repair<F>(&self, mut rows_for: F) -> usize
    where
        F: FnMut(&str, NaiveDate) -> Vec<PositionSnapshot>,
    {
        let pending = self.retry_queue.drain().await;
        let mut repaired = 0;
        for entry in pending {
            let rows = rows_for(&entry.fund, entry.date);
            match self.replace_day(&entry.fund, entry.date, &rows).await {
                Ok(()) => repaired += 1,
                Err(e) => warn!(
                    "Repair pass failed again for {} {}: {}",
                    entry.fund, entry.date, e
                ),
            }
        }
        repaired
    }

    async fn insert_halved(&self, chunk: &[PositionSnapshot]) -> Result<()> {
        let half = (chunk.len() / 2).max(1);
        for sub in chunk.chunks(half) {
            self.repository.insert_chunk(sub).await?;
        }
        Ok(())
    }

    async fn queue_retry(&self, fund: &str, date: NaiveDate, reason: &str) {
        self.retry_queue
            .push(PendingRetry {
                fund: fund.to_string(),
                date,
                reason: reason.to_string(),
            })
            .await;
    }
}
