//! Stored exchange rates over the `fx_rates` table.

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use fundsnap_core::errors::Result;
use fundsnap_core::fx::{FxRate, FxRepositoryTrait};

use crate::db::WriteHandle;
use crate::errors::StorageError;
use crate::utils::decimal_column;

pub struct SqliteFxRepository {
    handle: WriteHandle,
}

impl SqliteFxRepository {
    pub fn new(handle: WriteHandle) -> Self {
        Self { handle }
    }

    /// Store one dated rate. Re-saving the same (pair, date) replaces it.
    pub async fn save_rate(&self, rate: FxRate) -> Result<()> {
        self.handle
            .exec(move |conn| {
                conn.execute(
                    "INSERT INTO fx_rates (from_currency, to_currency, rate_date, rate) \
                     VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT(from_currency, to_currency, rate_date) \
                     DO UPDATE SET rate = excluded.rate",
                    params![rate.from, rate.to, rate.date, rate.rate.to_string()],
                )
                .map_err(StorageError::QueryFailed)?;
                Ok(())
            })
            .await
    }
}

fn rate_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FxRate> {
    Ok(FxRate {
        from: row.get(0)?,
        to: row.get(1)?,
        date: row.get(2)?,
        rate: decimal_column(row, 3)?,
    })
}

#[async_trait]
impl FxRepositoryTrait for SqliteFxRepository {
    async fn rate_on(&self, from: &str, to: &str, date: NaiveDate) -> Result<Option<FxRate>> {
        let from = from.to_string();
        let to = to.to_string();
        self.handle
            .exec(move |conn| {
                conn.query_row(
                    "SELECT from_currency, to_currency, rate_date, rate FROM fx_rates \
                     WHERE from_currency = ?1 AND to_currency = ?2 AND rate_date = ?3",
                    params![from, to, date],
                    rate_row,
                )
                .optional()
                .map_err(StorageError::QueryFailed)
                .map_err(Into::into)
            })
            .await
    }

    async fn latest_before(
        &self,
        from: &str,
        to: &str,
        date: NaiveDate,
    ) -> Result<Option<FxRate>> {
        let from = from.to_string();
        let to = to.to_string();
        self.handle
            .exec(move |conn| {
                conn.query_row(
                    "SELECT from_currency, to_currency, rate_date, rate FROM fx_rates \
                     WHERE from_currency = ?1 AND to_currency = ?2 AND rate_date < ?3 \
                     ORDER BY rate_date DESC LIMIT 1",
                    params![from, to, date],
                    rate_row,
                )
                .optional()
                .map_err(StorageError::QueryFailed)
                .map_err(Into::into)
            })
            .await
    }
}
