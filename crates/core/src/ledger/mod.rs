//! Trade ledger model and holdings replay.
//!
//! The ledger is append-only and read-only from this crate's point of
//! view. Valuation never mutates trades; it folds them into holdings.

mod replay;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

pub use replay::{replay, replay_as_of, Holding};

/// Direction of a trade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

/// One row of the append-only trade ledger.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Fund the trade belongs to.
    pub fund: String,
    /// Ticker as entered, possibly carrying a Canadian exchange suffix.
    pub ticker: String,
    pub date: NaiveDate,
    pub shares: Decimal,
    /// Per-share execution price in `currency`.
    pub price: Decimal,
    /// Currency the trade settled in. Doubles as the market hint for
    /// symbol resolution.
    pub currency: String,
    pub action: TradeAction,
}

/// Read access to the trade ledger.
#[async_trait]
pub trait TradeLedgerRepositoryTrait: Send + Sync {
    /// Every trade, ordered by non-decreasing date.
    async fn all_trades(&self) -> Result<Vec<TradeRecord>>;
}
