//! Read-only trade ledger over the `trades` table.

use async_trait::async_trait;
use rusqlite::types::Type;

use fundsnap_core::errors::Result;
use fundsnap_core::ledger::{TradeAction, TradeLedgerRepositoryTrait, TradeRecord};

use crate::db::WriteHandle;
use crate::errors::StorageError;
use crate::utils::decimal_column;

pub struct SqliteTradeLedgerRepository {
    handle: WriteHandle,
}

impl SqliteTradeLedgerRepository {
    pub fn new(handle: WriteHandle) -> Self {
        Self { handle }
    }
}

fn action_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<TradeAction> {
    let text: String = row.get(idx)?;
    match text.as_str() {
        "BUY" => Ok(TradeAction::Buy),
        "SELL" => Ok(TradeAction::Sell),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown trade action '{other}'").into(),
        )),
    }
}

#[async_trait]
impl TradeLedgerRepositoryTrait for SqliteTradeLedgerRepository {
    async fn all_trades(&self) -> Result<Vec<TradeRecord>> {
        self.handle
            .exec(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT fund, ticker, trade_date, shares, price, currency, action \
                         FROM trades ORDER BY trade_date, id",
                    )
                    .map_err(StorageError::QueryFailed)?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(TradeRecord {
                            fund: row.get(0)?,
                            ticker: row.get(1)?,
                            date: row.get(2)?,
                            shares: decimal_column(row, 3)?,
                            price: decimal_column(row, 4)?,
                            currency: row.get(5)?,
                            action: action_column(row, 6)?,
                        })
                    })
                    .map_err(StorageError::QueryFailed)?;

                let mut trades = Vec::new();
                for row in rows {
                    trades.push(row.map_err(StorageError::QueryFailed)?);
                }
                Ok(trades)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rust_decimal_macros::dec;

    async fn seed_trade(handle: &WriteHandle, fund: &str, ticker: &str, date: &str) {
        let fund = fund.to_string();
        let ticker = ticker.to_string();
        let date = date.to_string();
        handle
            .exec(move |conn| {
                conn.execute(
                    "INSERT INTO trades (fund, ticker, trade_date, shares, price, currency, action) \
                     VALUES (?1, ?2, ?3, '10', '100.5', 'USD', 'BUY')",
                    rusqlite::params![fund, ticker, date],
                )
                .map_err(StorageError::QueryFailed)?;
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_all_trades_ordered_by_date() {
        let handle = db::init_in_memory().unwrap();
        let repo = SqliteTradeLedgerRepository::new(handle.clone());

        seed_trade(&handle, "alpha", "MSFT", "2025-03-01").await;
        seed_trade(&handle, "alpha", "AAPL", "2025-01-15").await;

        let trades = repo.all_trades().await.unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].ticker, "AAPL");
        assert_eq!(trades[0].shares, dec!(10));
        assert_eq!(trades[0].price, dec!(100.5));
        assert_eq!(trades[0].action, TradeAction::Buy);
        assert_eq!(trades[1].ticker, "MSFT");
    }

    #[tokio::test]
    async fn test_empty_ledger_is_empty_vec() {
        let handle = db::init_in_memory().unwrap();
        let repo = SqliteTradeLedgerRepository::new(handle);
        assert!(repo.all_trades().await.unwrap().is_empty());
    }
}
