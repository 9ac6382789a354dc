//! Quote source implementations.

pub mod alpha_vantage;
pub mod yahoo;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::MarketDataError;
use crate::models::{PricePoint, SecurityProfile};

/// Relative lookback window for sources that cannot take exact dates, or
/// as a coarser retry when an exact-range request comes back empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookbackWindow {
    /// Roughly the last quarter of daily bars.
    Quarter,
    /// The last handful of sessions. The cheapest possible request.
    Week,
}

/// A provider of daily price history.
///
/// Implementations are stateless facades over one upstream API. Errors are
/// classified through [`MarketDataError`] so the fetcher can tell a missing
/// symbol from a throttled provider.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Stable identifier recorded as the `source` of returned prices.
    fn id(&self) -> &'static str;

    /// Daily bars covering `[start, end]` inclusive.
    async fn daily_range(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, MarketDataError>;

    /// Daily bars for a relative lookback window ending today.
    async fn daily_window(
        &self,
        symbol: &str,
        window: LookbackWindow,
    ) -> Result<Vec<PricePoint>, MarketDataError>;

    /// Descriptive metadata for a symbol.
    async fn profile(&self, symbol: &str) -> Result<SecurityProfile, MarketDataError>;
}
