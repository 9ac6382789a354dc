use chrono::NaiveDate;
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Normalized daily OHLCV row.
///
/// Created by the fetcher, immutable once produced. `source` records which
/// provider/strategy satisfied the fetch; proxy substitutions are tagged
/// `proxy:<symbol>` and carried-forward rows are tagged by the batch engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PricePoint {
    /// Canonical symbol (the symbol the caller asked for, not the
    /// provider-side variant that satisfied it).
    pub symbol: String,

    /// Trading day.
    pub date: NaiveDate,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,

    /// Closing price. Always positive; zero or non-finite closes are
    /// dropped at the provider boundary.
    pub close: Decimal,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,

    /// Quote currency (native to the market that satisfied the fetch,
    /// post currency-correction).
    pub currency: String,

    /// Provider/strategy that produced this row.
    pub source: String,
}

impl PricePoint {
    /// True when the close is a usable price.
    ///
    /// A zero price is indistinguishable from missing data and must never
    /// be persisted as a valid close.
    pub fn has_valid_close(&self) -> bool {
        self.close > Decimal::ZERO
    }
}

/// Parse a provider float into a Decimal, treating non-finite and
/// non-positive values as absent.
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    Decimal::from_f64(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decimal_from_f64_rejects_non_finite_and_zero() {
        assert_eq!(decimal_from_f64(f64::NAN), None);
        assert_eq!(decimal_from_f64(f64::INFINITY), None);
        assert_eq!(decimal_from_f64(0.0), None);
        assert_eq!(decimal_from_f64(-12.5), None);
        assert_eq!(decimal_from_f64(150.25), Some(dec!(150.25)));
    }

    #[test]
    fn test_valid_close() {
        let point = PricePoint {
            symbol: "AAPL".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            open: None,
            high: None,
            low: None,
            close: dec!(242.70),
            volume: None,
            currency: "USD".to_string(),
            source: "YAHOO".to_string(),
        };
        assert!(point.has_valid_close());
    }
}
