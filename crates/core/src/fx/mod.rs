//! Exchange-rate lookup.
//!
//! Rates come from the FX store when available. The lookup ladder for
//! `rate_for_date`, in order: exact date, most recent prior date, the
//! inverse pair (exact then prior, inverted), and finally a hardcoded
//! default table. The default exists so a missing rate degrades a
//! valuation instead of zeroing it; every use is logged as a warning.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use fundsnap_market_data::FxSnapshot;

use crate::constants::DEFAULT_USD_CAD_RATE;
use crate::errors::Result;

/// One stored exchange rate: units of `to` per one `from` on `date`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FxRate {
    pub date: NaiveDate,
    pub from: String,
    pub to: String,
    pub rate: Decimal,
}

/// Read access to stored exchange rates.
#[async_trait]
pub trait FxRepositoryTrait: Send + Sync {
    /// The rate for the pair on exactly `date`.
    async fn rate_on(&self, from: &str, to: &str, date: NaiveDate) -> Result<Option<FxRate>>;

    /// The most recent rate for the pair strictly before `date`.
    async fn latest_before(&self, from: &str, to: &str, date: NaiveDate)
        -> Result<Option<FxRate>>;
}

/// Dated exchange-rate lookup over a rate store.
#[derive(Clone)]
pub struct FxService {
    repository: Arc<dyn FxRepositoryTrait>,
}

impl FxService {
    pub fn new(repository: Arc<dyn FxRepositoryTrait>) -> Self {
        Self { repository }
    }

    /// The conversion rate from `from` to `to` as of `date`.
    ///
    /// Never returns zero: when neither direction of the pair is stored,
    /// the hardcoded default table answers and a warning is logged.
    pub async fn rate_for_date(&self, from: &str, to: &str, date: NaiveDate) -> Result<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }

        if let Some(rate) = self.stored_rate(from, to, date).await? {
            return Ok(rate);
        }

        if let Some(inverse) = self.stored_rate(to, from, date).await? {
            if !inverse.is_zero() {
                return Ok(Decimal::ONE / inverse);
            }
        }

        let fallback = default_rate(from, to).unwrap_or(Decimal::ONE);
        warn!(
            "No stored FX rate for {}/{} on {}; falling back to default {}",
            from, to, date, fallback
        );
        Ok(fallback)
    }

    async fn stored_rate(&self, from: &str, to: &str, date: NaiveDate) -> Result<Option<Decimal>> {
        if let Some(rate) = self.repository.rate_on(from, to, date).await? {
            return Ok(Some(rate.rate));
        }
        Ok(self
            .repository
            .latest_before(from, to, date)
            .await?
            .map(|r| r.rate))
    }

    /// Capture the current USD/CAD rate as a snapshot for the fetcher's
    /// currency correction.
    pub async fn snapshot(&self, as_of: NaiveDate) -> Result<FxSnapshot> {
        let usd_to_cad = self.rate_for_date("USD", "CAD", as_of).await?;
        Ok(FxSnapshot::new(usd_to_cad, as_of))
    }
}

/// Hardcoded last-resort rates.
fn default_rate(from: &str, to: &str) -> Option<Decimal> {
    match (from, to) {
        ("USD", "CAD") => Some(DEFAULT_USD_CAD_RATE),
        ("CAD", "USD") => Some(Decimal::ONE / DEFAULT_USD_CAD_RATE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Store scripted with a fixed set of dated rates.
    struct MockFxRepository {
        rates: Vec<FxRate>,
    }

    impl MockFxRepository {
        fn new(rates: Vec<(NaiveDate, &str, &str, Decimal)>) -> Self {
            Self {
                rates: rates
                    .into_iter()
                    .map(|(date, from, to, rate)| FxRate {
                        date,
                        from: from.to_string(),
                        to: to.to_string(),
                        rate,
                    })
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl FxRepositoryTrait for MockFxRepository {
        async fn rate_on(&self, from: &str, to: &str, date: NaiveDate) -> Result<Option<FxRate>> {
            Ok(self
                .rates
                .iter()
                .find(|r| r.from == from && r.to == to && r.date == date)
                .cloned())
        }

        async fn latest_before(
            &self,
            from: &str,
            to: &str,
            date: NaiveDate,
        ) -> Result<Option<FxRate>> {
            Ok(self
                .rates
                .iter()
                .filter(|r| r.from == from && r.to == to && r.date < date)
                .max_by_key(|r| r.date)
                .cloned())
        }
    }

    #[tokio::test]
    async fn test_same_currency_is_one() {
        let service = FxService::new(Arc::new(MockFxRepository::new(vec![])));
        let rate = service
            .rate_for_date("USD", "USD", date(2025, 1, 2))
            .await
            .unwrap();
        assert_eq!(rate, Decimal::ONE);
    }

    #[tokio::test]
    async fn test_exact_date_preferred_over_prior() {
        let service = FxService::new(Arc::new(MockFxRepository::new(vec![
            (date(2025, 1, 1), "USD", "CAD", dec!(1.40)),
            (date(2025, 1, 2), "USD", "CAD", dec!(1.42)),
        ])));
        let rate = service
            .rate_for_date("USD", "CAD", date(2025, 1, 2))
            .await
            .unwrap();
        assert_eq!(rate, dec!(1.42));
    }

    #[tokio::test]
    async fn test_prior_rate_used_when_date_missing() {
        let service = FxService::new(Arc::new(MockFxRepository::new(vec![(
            date(2025, 1, 1),
            "USD",
            "CAD",
            dec!(1.40),
        )])));
        let rate = service
            .rate_for_date("USD", "CAD", date(2025, 1, 15))
            .await
            .unwrap();
        assert_eq!(rate, dec!(1.40));
    }

    #[tokio::test]
    async fn test_inverse_rate_fallback() {
        let service = FxService::new(Arc::new(MockFxRepository::new(vec![(
            date(2025, 1, 2),
            "CAD",
            "USD",
            dec!(0.8),
        )])));
        let rate = service
            .rate_for_date("USD", "CAD", date(2025, 1, 2))
            .await
            .unwrap();
        assert_eq!(rate, dec!(1.25));
    }

    #[tokio::test]
    async fn test_default_table_when_store_empty() {
        let service = FxService::new(Arc::new(MockFxRepository::new(vec![])));
        let rate = service
            .rate_for_date("USD", "CAD", date(2025, 1, 2))
            .await
            .unwrap();
        assert_eq!(rate, DEFAULT_USD_CAD_RATE);
        // Never zero, in either direction.
        let inverse = service
            .rate_for_date("CAD", "USD", date(2025, 1, 2))
            .await
            .unwrap();
        assert!(inverse > Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_snapshot_carries_current_rate() {
        let service = FxService::new(Arc::new(MockFxRepository::new(vec![(
            date(2025, 1, 2),
            "USD",
            "CAD",
            dec!(1.38),
        )])));
        let snapshot = service.snapshot(date(2025, 1, 2)).await.unwrap();
        assert_eq!(snapshot.usd_to_cad, dec!(1.38));
    }
}
