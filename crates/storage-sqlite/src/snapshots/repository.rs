//! Snapshot persistence over the `position_snapshots` table.
//!
//! The writer in `fundsnap-core` owns idempotence (delete-then-insert)
//! and chunking; this layer only executes the three primitives it needs.

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::params;

use fundsnap_core::errors::Result;
use fundsnap_core::snapshot::{PositionSnapshot, SnapshotRepositoryTrait};

use crate::db::WriteHandle;
use crate::errors::StorageError;

pub struct SqliteSnapshotRepository {
    handle: WriteHandle,
}

impl SqliteSnapshotRepository {
    pub fn new(handle: WriteHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl SnapshotRepositoryTrait for SqliteSnapshotRepository {
    async fn delete_day(&self, fund: &str, date: NaiveDate) -> Result<()> {
        let fund = fund.to_string();
        self.handle
            .exec(move |conn| {
                conn.execute(
                    "DELETE FROM position_snapshots WHERE fund = ?1 AND snapshot_date = ?2",
                    params![fund, date],
                )
                .map_err(StorageError::QueryFailed)?;
                Ok(())
            })
            .await
    }

    async fn insert_chunk(&self, rows: &[PositionSnapshot]) -> Result<()> {
        let rows = rows.to_vec();
        self.handle
            .exec(move |conn| {
                let mut stmt = conn
                    .prepare_cached(
                        "INSERT INTO position_snapshots \
                         (fund, ticker, snapshot_date, shares, price, cost_basis, pnl, \
                          currency, base_currency, value_base, cost_basis_base, pnl_base, fx_rate) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    )
                    .map_err(StorageError::QueryFailed)?;
                for row in &rows {
                    stmt.execute(params![
                        row.fund,
                        row.ticker,
                        row.date,
                        row.shares.to_string(),
                        row.price.to_string(),
                        row.cost_basis.to_string(),
                        row.pnl.to_string(),
                        row.currency,
                        row.base_currency,
                        row.value_base.to_string(),
                        row.cost_basis_base.to_string(),
                        row.pnl_base.to_string(),
                        row.fx_rate.to_string(),
                    ])
                    .map_err(StorageError::QueryFailed)?;
                }
                Ok(())
            })
            .await
    }

    async fn count_day(&self, fund: &str, date: NaiveDate) -> Result<usize> {
        let fund = fund.to_string();
        self.handle
            .exec(move |conn| {
                let count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM position_snapshots \
                         WHERE fund = ?1 AND snapshot_date = ?2",
                        params![fund, date],
                        |r| r.get(0),
                    )
                    .map_err(StorageError::QueryFailed)?;
                Ok(count as usize)
            })
            .await
    }
}
