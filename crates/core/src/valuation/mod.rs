//! Per-day position valuation.
//!
//! Prices surviving holdings out of a [`PriceBook`] and converts the
//! results into the fund's base currency. A holding with no price for
//! the day is skipped and recorded as a gap, never valued at zero.

use chrono::NaiveDate;
use log::warn;
use rust_decimal::Decimal;

use crate::constants::VALUATION_PRECISION;
use crate::errors::Result;
use crate::fx::FxService;
use crate::ledger::Holding;
use crate::pricing::PriceBook;
use crate::snapshot::PositionSnapshot;

/// A (ticker, day) the book could not price.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValuationGap {
    pub fund: String,
    pub ticker: String,
    pub date: NaiveDate,
}

/// Value `holdings` for `fund` as of `date`.
///
/// Returns the snapshot rows and the gaps. `value = shares * price`,
/// `pnl = value - cost_basis`; base-currency figures are converted with
/// the FX service's dated rate (1 when currencies match).
pub async fn value_holdings(
    fund: &str,
    date: NaiveDate,
    holdings: &[Holding],
    book: &PriceBook,
    fx: &FxService,
    base_currency: &str,
) -> Result<(Vec<PositionSnapshot>, Vec<ValuationGap>)> {
    let mut rows = Vec::with_capacity(holdings.len());
    let mut gaps = Vec::new();

    for holding in holdings {
        let Some(point) = book.price_on(&holding.ticker, date) else {
            warn!(
                "No price for {} on {} (fund '{}'); recording gap",
                holding.ticker, date, fund
            );
            gaps.push(ValuationGap {
                fund: fund.to_string(),
                ticker: holding.ticker.clone(),
                date,
            });
            continue;
        };

        let value = holding.shares * point.close;
        let pnl = value - holding.cost_basis;

        let fx_rate = fx
            .rate_for_date(&point.currency, base_currency, date)
            .await?;

        rows.push(PositionSnapshot {
            fund: fund.to_string(),
            ticker: holding.ticker.clone(),
            date,
            shares: holding.shares,
            price: point.close,
            cost_basis: round(holding.cost_basis),
            pnl: round(pnl),
            currency: point.currency.clone(),
            base_currency: base_currency.to_string(),
            value_base: round(value * fx_rate),
            cost_basis_base: round(holding.cost_basis * fx_rate),
            pnl_base: round(pnl * fx_rate),
            fx_rate,
        });
    }

    Ok((rows, gaps))
}

fn round(value: Decimal) -> Decimal {
    value.round_dp(VALUATION_PRECISION)
}
