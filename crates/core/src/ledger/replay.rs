//! Deterministic holdings replay.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::warn;
use rust_decimal::Decimal;

use super::{TradeAction, TradeRecord};

/// A position surviving ledger replay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Holding {
    pub ticker: String,
    pub shares: Decimal,
    /// Total cost of the open shares under the average-cost method.
    pub cost_basis: Decimal,
    /// Currency the position was traded in.
    pub currency: String,
}

impl Holding {
    /// Average cost per open share. Zero when the position is empty.
    pub fn average_cost(&self) -> Decimal {
        if self.shares.is_zero() {
            Decimal::ZERO
        } else {
            self.cost_basis / self.shares
        }
    }
}

/// Fold trades into holdings under the average-cost method.
///
/// Pure function of its input: same trades, same holdings, in ticker
/// order. Trades are processed in non-decreasing date order regardless of
/// input order. A sell reduces shares and cost basis proportionally at
/// the position's average cost; selling more than is held absorbs the
/// position to zero rather than going negative. Closed positions are not
/// returned.
pub fn replay(trades: &[TradeRecord]) -> Vec<Holding> {
    let mut ordered: Vec<&TradeRecord> = trades.iter().collect();
    ordered.sort_by_key(|t| t.date);

    let mut positions: BTreeMap<String, Holding> = BTreeMap::new();

    for trade in ordered {
        // Tickers are case-normalized so holdings line up with resolved
        // price series whatever case the ledger used.
        let ticker = trade.ticker.to_uppercase();
        let position = positions
            .entry(ticker.clone())
            .or_insert_with(|| Holding {
                ticker,
                shares: Decimal::ZERO,
                cost_basis: Decimal::ZERO,
                currency: trade.currency.clone(),
            });
        position.currency = trade.currency.clone();

        match trade.action {
            TradeAction::Buy => {
                position.shares += trade.shares;
                position.cost_basis += trade.shares * trade.price;
            }
            TradeAction::Sell => {
                if trade.shares >= position.shares {
                    if trade.shares > position.shares {
                        warn!(
                            "Over-sell of {} on {}: {} sold, {} held; clamping to zero",
                            trade.ticker, trade.date, trade.shares, position.shares
                        );
                    }
                    position.shares = Decimal::ZERO;
                    position.cost_basis = Decimal::ZERO;
                } else {
                    let sold_cost = trade.shares * position.average_cost();
                    position.shares -= trade.shares;
                    position.cost_basis -= sold_cost;
                }
            }
        }
    }

    positions
        .into_values()
        .filter(|h| h.shares > Decimal::ZERO)
        .collect()
}

/// Replay restricted to trades on or before `cutoff`. Backfill calls this
/// once per requested day.
pub fn replay_as_of(trades: &[TradeRecord], cutoff: NaiveDate) -> Vec<Holding> {
    let filtered: Vec<TradeRecord> = trades
        .iter()
        .filter(|t| t.date <= cutoff)
        .cloned()
        .collect();
    replay(&filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn trade(
        ticker: &str,
        day: NaiveDate,
        shares: Decimal,
        price: Decimal,
        action: TradeAction,
    ) -> TradeRecord {
        TradeRecord {
            fund: "alpha".to_string(),
            ticker: ticker.to_string(),
            date: day,
            shares,
            price,
            currency: "USD".to_string(),
            action,
        }
    }

    #[test]
    fn test_buys_accumulate_cost() {
        let trades = vec![
            trade("AAPL", date(2025, 1, 2), dec!(10), dec!(100), TradeAction::Buy),
            trade("AAPL", date(2025, 1, 3), dec!(10), dec!(120), TradeAction::Buy),
        ];
        let holdings = replay(&trades);
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].shares, dec!(20));
        assert_eq!(holdings[0].cost_basis, dec!(2200));
        assert_eq!(holdings[0].average_cost(), dec!(110));
    }

    #[test]
    fn test_sell_reduces_at_average_cost() {
        let trades = vec![
            trade("AAPL", date(2025, 1, 2), dec!(10), dec!(100), TradeAction::Buy),
            trade("AAPL", date(2025, 1, 3), dec!(10), dec!(120), TradeAction::Buy),
            // Sell half at some market price; cost basis drops by half the
            // average, not by the sale proceeds.
            trade("AAPL", date(2025, 1, 6), dec!(10), dec!(150), TradeAction::Sell),
        ];
        let holdings = replay(&trades);
        assert_eq!(holdings[0].shares, dec!(10));
        assert_eq!(holdings[0].cost_basis, dec!(1100));
    }

    #[test]
    fn test_oversell_clamps_to_zero() {
        let trades = vec![
            trade("XYZ", date(2025, 1, 2), dec!(5), dec!(10), TradeAction::Buy),
            trade("XYZ", date(2025, 1, 3), dec!(8), dec!(12), TradeAction::Sell),
            // Position must be flat, not negative, and buying again starts
            // a fresh basis.
            trade("XYZ", date(2025, 1, 6), dec!(3), dec!(11), TradeAction::Buy),
        ];
        let holdings = replay(&trades);
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].shares, dec!(3));
        assert_eq!(holdings[0].cost_basis, dec!(33));
    }

    #[test]
    fn test_closed_positions_dropped() {
        let trades = vec![
            trade("AAPL", date(2025, 1, 2), dec!(10), dec!(100), TradeAction::Buy),
            trade("AAPL", date(2025, 1, 3), dec!(10), dec!(110), TradeAction::Sell),
        ];
        assert!(replay(&trades).is_empty());
    }

    #[test]
    fn test_replay_is_order_independent() {
        let early = trade("AAPL", date(2025, 1, 2), dec!(10), dec!(100), TradeAction::Buy);
        let late = trade("AAPL", date(2025, 1, 6), dec!(4), dec!(100), TradeAction::Sell);

        let forward = replay(&[early.clone(), late.clone()]);
        let backward = replay(&[late, early]);
        assert_eq!(forward, backward);
        assert_eq!(forward[0].shares, dec!(6));
    }

    #[test]
    fn test_replay_as_of_respects_cutoff() {
        let trades = vec![
            trade("AAPL", date(2025, 1, 2), dec!(10), dec!(100), TradeAction::Buy),
            trade("AAPL", date(2025, 1, 10), dec!(10), dec!(100), TradeAction::Sell),
        ];
        let mid = replay_as_of(&trades, date(2025, 1, 5));
        assert_eq!(mid[0].shares, dec!(10));
        let end = replay_as_of(&trades, date(2025, 1, 10));
        assert!(end.is_empty());
    }
}
