//! Cascading multi-source price fetch.
//!
//! One fetch request walks an ordered chain of strategies across the
//! configured sources, short-circuiting on the first non-empty result:
//!
//! 1. Primary (Yahoo), explicit date range
//! 2. Secondary (Alpha Vantage), native JSON endpoint
//! 3. Secondary, raw CSV endpoint
//! 4. Primary, coarse "3mo" relative range
//! 5. Primary, minimal "5d" window
//! 6. Index-proxy substitution for known index symbols
//!
//! The coarse relative ranges exist because chart APIs sometimes return
//! spurious empty responses for an exact range near delistings and
//! timezone edges while happily serving the same bars for "3mo".
//!
//! Strategy errors are classified, never propagated mid-chain. The
//! terminal failure carries the most meaningful class seen: a rate limit
//! anywhere in the chain outranks everything else, otherwise the last
//! non-`NoData` error, otherwise `NoData`.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::errors::{FailureClass, FetchFailure, MarketDataError};
use crate::models::{Market, PricePoint, SecurityProfile};
use crate::provider::{LookbackWindow, QuoteSource};
use crate::resolver::{canadian_suffix, ResolvedSymbol};

/// Index symbols that chart APIs frequently refuse, mapped to a liquid
/// ETF tracking the same index. Substituted results are tagged
/// `proxy:<etf>` so consumers can tell them apart from direct quotes.
const INDEX_PROXIES: [(&str, &str); 4] = [
    ("^GSPC", "SPY"),
    ("^DJI", "DIA"),
    ("^IXIC", "QQQ"),
    ("^GSPTSE", "XIU.TO"),
];

fn proxy_for(symbol: &str) -> Option<&'static str> {
    INDEX_PROXIES
        .iter()
        .find(|(index, _)| *index == symbol)
        .map(|(_, etf)| *etf)
}

/// Point-in-time FX rates used to correct a price fetched in the wrong
/// currency. Captured once per run by the caller.
#[derive(Clone, Copy, Debug)]
pub struct FxSnapshot {
    /// Units of CAD per one USD.
    pub usd_to_cad: Decimal,
    pub as_of: NaiveDate,
}

impl FxSnapshot {
    pub fn new(usd_to_cad: Decimal, as_of: NaiveDate) -> Self {
        Self { usd_to_cad, as_of }
    }

    /// Convert `amount` between USD and CAD. Returns `None` for pairs the
    /// snapshot does not cover.
    pub fn convert(&self, amount: Decimal, from: &str, to: &str) -> Option<Decimal> {
        match (from, to) {
            (f, t) if f == t => Some(amount),
            ("USD", "CAD") => Some(amount * self.usd_to_cad),
            ("CAD", "USD") if !self.usd_to_cad.is_zero() => Some(amount / self.usd_to_cad),
            _ => None,
        }
    }
}

/// A successful fetch: the normalized series plus the provider-side
/// symbol that actually satisfied it (which may differ from the canonical
/// symbol when a Canadian listing or index proxy was used).
#[derive(Clone, Debug)]
pub struct FetchOutcome {
    pub points: Vec<PricePoint>,
    pub provider_symbol: String,
}

/// Walks the fetch chain for one resolved symbol.
pub struct PriceFetcher {
    primary: Arc<dyn QuoteSource>,
    secondary: Option<Arc<dyn QuoteSource>>,
}

impl PriceFetcher {
    pub fn new(primary: Arc<dyn QuoteSource>, secondary: Option<Arc<dyn QuoteSource>>) -> Self {
        Self { primary, secondary }
    }

    /// Fetch daily prices for `symbol` over `[start, end]`.
    ///
    /// Every candidate of `resolved` is tried through the full chain
    /// before moving to the next candidate. `fx` is consulted only when a
    /// Canadian-market symbol ends up satisfied by a bare US listing.
    pub async fn fetch(
        &self,
        symbol: &str,
        resolved: &ResolvedSymbol,
        start: NaiveDate,
        end: NaiveDate,
        fx: Option<&FxSnapshot>,
    ) -> Result<FetchOutcome, FetchFailure> {
        let mut worst = FailureTracker::default();

        for candidate in &resolved.candidates {
            match self.fetch_candidate(candidate, start, end).await {
                Ok((points, provider_symbol, source_tag)) => {
                    let points = normalize(
                        symbol,
                        resolved.market,
                        &provider_symbol,
                        source_tag,
                        points,
                        fx,
                    );
                    if points.is_empty() {
                        worst.record(&MarketDataError::NoDataForRange);
                        continue;
                    }
                    info!(
                        "Fetched {} bars for {} via {}",
                        points.len(),
                        symbol,
                        provider_symbol
                    );
                    return Ok(FetchOutcome {
                        points,
                        provider_symbol,
                    });
                }
                Err(errors) => {
                    for error in &errors {
                        worst.record(error);
                    }
                }
            }
        }

        let (class, message) = worst.finish();
        warn!("All strategies exhausted for {}: {}", symbol, message);
        Err(FetchFailure {
            symbol: symbol.to_string(),
            class,
            message,
        })
    }

    /// Company profile for `symbol`, primary source first with a
    /// best-effort fallback to the secondary.
    pub async fn profile(&self, symbol: &str) -> Result<SecurityProfile, MarketDataError> {
        match self.primary.profile(symbol).await {
            Ok(profile) => Ok(profile),
            Err(error) => {
                let Some(secondary) = &self.secondary else {
                    return Err(error);
                };
                debug!(
                    "Profile lookup for {} failed on {} ({}); trying {}",
                    symbol,
                    self.primary.id(),
                    error,
                    secondary.id()
                );
                secondary.profile(symbol).await
            }
        }
    }

    /// Run the strategy chain for one provider symbol. On success returns
    /// the raw points, the symbol that satisfied them, and an optional
    /// source override (set for proxy substitution).
    async fn fetch_candidate(
        &self,
        candidate: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(Vec<PricePoint>, String, Option<String>), Vec<MarketDataError>> {
        let mut errors = Vec::new();

        macro_rules! attempt {
            ($label:expr, $fut:expr) => {
                match $fut.await {
                    Ok(points) => {
                        let points = clip(points, start, end);
                        if points.is_empty() {
                            debug!("{} returned nothing usable for {}", $label, candidate);
                            errors.push(MarketDataError::NoDataForRange);
                        } else {
                            return Ok((points, candidate.to_string(), None));
                        }
                    }
                    Err(e) => {
                        debug!("{} failed for {}: {}", $label, candidate, e);
                        errors.push(e);
                    }
                }
            };
        }

        attempt!("primary range", self.primary.daily_range(candidate, start, end));

        if let Some(secondary) = &self.secondary {
            attempt!("secondary json", secondary.daily_range(candidate, start, end));
            attempt!(
                "secondary csv",
                secondary.daily_window(candidate, LookbackWindow::Week)
            );
        }

        attempt!(
            "primary quarter window",
            self.primary.daily_window(candidate, LookbackWindow::Quarter)
        );
        attempt!(
            "primary week window",
            self.primary.daily_window(candidate, LookbackWindow::Week)
        );

        if let Some(proxy) = proxy_for(candidate) {
            match self.primary.daily_range(proxy, start, end).await {
                Ok(points) => {
                    let points = clip(points, start, end);
                    if !points.is_empty() {
                        return Ok((points, proxy.to_string(), Some(format!("proxy:{proxy}"))));
                    }
                    errors.push(MarketDataError::NoDataForRange);
                }
                Err(e) => {
                    debug!("proxy fetch via {} failed for {}: {}", proxy, candidate, e);
                    errors.push(e);
                }
            }
        }

        Err(errors)
    }
}

/// Restrict a series to the requested date range.
fn clip(points: Vec<PricePoint>, start: NaiveDate, end: NaiveDate) -> Vec<PricePoint> {
    points
        .into_iter()
        .filter(|p| p.date >= start && p.date <= end)
        .collect()
}

/// Rewrite provider output into canonical form: the caller's symbol, a
/// stable source tag, and the currency the caller's market expects.
///
/// A Canadian-market symbol satisfied by a bare US listing comes back in
/// USD; its closes are converted with the FX snapshot. Suffixed symbols
/// are already native CAD and are never converted.
fn normalize(
    symbol: &str,
    market: Market,
    provider_symbol: &str,
    source_tag: Option<String>,
    points: Vec<PricePoint>,
    fx: Option<&FxSnapshot>,
) -> Vec<PricePoint> {
    let needs_conversion =
        market == Market::Ca && canadian_suffix(provider_symbol).is_none() && proxy_for(symbol).is_none();

    points
        .into_iter()
        .filter_map(|mut point| {
            point.symbol = symbol.to_string();
            if let Some(tag) = &source_tag {
                point.source = tag.clone();
            }

            if needs_conversion && point.currency != "CAD" {
                let fx = fx?;
                point.close = fx.convert(point.close, &point.currency, "CAD")?;
                point.open = point.open.and_then(|v| fx.convert(v, &point.currency, "CAD"));
                point.high = point.high.and_then(|v| fx.convert(v, &point.currency, "CAD"));
                point.low = point.low.and_then(|v| fx.convert(v, &point.currency, "CAD"));
                point.currency = "CAD".to_string();
            }

            point.has_valid_close().then_some(point)
        })
        .collect()
}

/// Accumulates the most meaningful failure class across the chain.
#[derive(Default)]
struct FailureTracker {
    rate_limited: Option<String>,
    last_other: Option<String>,
    last_no_data: Option<String>,
}

impl FailureTracker {
    fn record(&mut self, error: &MarketDataError) {
        let message = error.to_string();
        match error.failure_class() {
            FailureClass::RateLimited => self.rate_limited = Some(message),
            FailureClass::Other => self.last_other = Some(message),
            FailureClass::NoData => self.last_no_data = Some(message),
        }
    }

    fn finish(self) -> (FailureClass, String) {
        if let Some(message) = self.rate_limited {
            (FailureClass::RateLimited, message)
        } else if let Some(message) = self.last_other {
            (FailureClass::Other, message)
        } else {
            (
                FailureClass::NoData,
                self.last_no_data
                    .unwrap_or_else(|| "no data returned by any source".to_string()),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SecurityProfile;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn point(symbol: &str, day: NaiveDate, close: Decimal, currency: &str) -> PricePoint {
        PricePoint {
            symbol: symbol.to_string(),
            date: day,
            open: None,
            high: None,
            low: None,
            close,
            volume: None,
            currency: currency.to_string(),
            source: "MOCK".to_string(),
        }
    }

    /// Source whose per-symbol behavior is scripted by the test.
    struct MockSource {
        range_results: HashMap<String, Result<Vec<PricePoint>, MarketDataError>>,
        window_results: HashMap<String, Result<Vec<PricePoint>, MarketDataError>>,
        calls: AtomicUsize,
    }

    impl MockSource {
        fn new() -> Self {
            Self {
                range_results: HashMap::new(),
                window_results: HashMap::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn with_range(mut self, symbol: &str, result: Result<Vec<PricePoint>, MarketDataError>) -> Self {
            self.range_results.insert(symbol.to_string(), result);
            self
        }

        fn with_window(
            mut self,
            symbol: &str,
            result: Result<Vec<PricePoint>, MarketDataError>,
        ) -> Self {
            self.window_results.insert(symbol.to_string(), result);
            self
        }
    }

    fn clone_result(
        result: Option<&Result<Vec<PricePoint>, MarketDataError>>,
    ) -> Result<Vec<PricePoint>, MarketDataError> {
        match result {
            Some(Ok(points)) => Ok(points.clone()),
            Some(Err(MarketDataError::RateLimited { provider })) => Err(MarketDataError::RateLimited {
                provider: provider.clone(),
            }),
            Some(Err(MarketDataError::SymbolNotFound(s))) => {
                Err(MarketDataError::SymbolNotFound(s.clone()))
            }
            Some(Err(e)) => Err(MarketDataError::ProviderError {
                provider: "MOCK".to_string(),
                message: e.to_string(),
            }),
            None => Err(MarketDataError::SymbolNotFound("unscripted".to_string())),
        }
    }

    #[async_trait]
    impl QuoteSource for MockSource {
        fn id(&self) -> &'static str {
            "MOCK"
        }

        async fn daily_range(
            &self,
            symbol: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<PricePoint>, MarketDataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            clone_result(self.range_results.get(symbol))
        }

        async fn daily_window(
            &self,
            symbol: &str,
            _window: LookbackWindow,
        ) -> Result<Vec<PricePoint>, MarketDataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            clone_result(self.window_results.get(symbol))
        }

        async fn profile(&self, symbol: &str) -> Result<SecurityProfile, MarketDataError> {
            Err(MarketDataError::SymbolNotFound(symbol.to_string()))
        }
    }

    fn us_resolved(symbol: &str) -> ResolvedSymbol {
        ResolvedSymbol {
            market: Market::Us,
            candidates: vec![symbol.to_string()],
        }
    }

    #[tokio::test]
    async fn test_primary_range_short_circuits() {
        let day = date(2025, 1, 2);
        let primary = MockSource::new().with_range(
            "AAPL",
            Ok(vec![point("AAPL", day, dec!(242.70), "USD")]),
        );
        let secondary = MockSource::new();
        let fetcher = PriceFetcher::new(Arc::new(primary), Some(Arc::new(secondary)));

        let outcome = fetcher
            .fetch("AAPL", &us_resolved("AAPL"), day, day, None)
            .await
            .unwrap();
        assert_eq!(outcome.points.len(), 1);
        assert_eq!(outcome.provider_symbol, "AAPL");
        assert_eq!(outcome.points[0].close, dec!(242.70));
    }

    #[tokio::test]
    async fn test_falls_through_to_secondary() {
        let day = date(2025, 1, 2);
        let primary = MockSource::new()
            .with_range("XYZ", Err(MarketDataError::NoDataForRange))
            .with_window("XYZ", Err(MarketDataError::NoDataForRange));
        let secondary = MockSource::new()
            .with_range("XYZ", Ok(vec![point("XYZ", day, dec!(10), "USD")]));
        let fetcher = PriceFetcher::new(Arc::new(primary), Some(Arc::new(secondary)));

        let outcome = fetcher
            .fetch("XYZ", &us_resolved("XYZ"), day, day, None)
            .await
            .unwrap();
        assert_eq!(outcome.points[0].close, dec!(10));
    }

    #[tokio::test]
    async fn test_rate_limit_outranks_no_data() {
        let day = date(2025, 1, 2);
        let primary = MockSource::new()
            .with_range("XYZ", Err(MarketDataError::NoDataForRange))
            .with_window("XYZ", Err(MarketDataError::NoDataForRange));
        let secondary = MockSource::new()
            .with_range(
                "XYZ",
                Err(MarketDataError::RateLimited {
                    provider: "ALPHA_VANTAGE".to_string(),
                }),
            )
            .with_window("XYZ", Err(MarketDataError::NoDataForRange));
        let fetcher = PriceFetcher::new(Arc::new(primary), Some(Arc::new(secondary)));

        let failure = fetcher
            .fetch("XYZ", &us_resolved("XYZ"), day, day, None)
            .await
            .unwrap_err();
        assert_eq!(failure.class, FailureClass::RateLimited);
    }

    #[tokio::test]
    async fn test_second_candidate_tried_after_first_exhausts() {
        let day = date(2025, 1, 2);
        let primary = MockSource::new()
            .with_range("ENB.TO", Ok(vec![point("ENB.TO", day, dec!(55.45), "CAD")]));
        let fetcher = PriceFetcher::new(Arc::new(primary), None);

        let resolved = ResolvedSymbol {
            market: Market::Ca,
            candidates: vec!["ENB.V".to_string(), "ENB.TO".to_string()],
        };
        let outcome = fetcher.fetch("ENB", &resolved, day, day, None).await.unwrap();
        assert_eq!(outcome.provider_symbol, "ENB.TO");
        // Canonical symbol preserved on every point.
        assert_eq!(outcome.points[0].symbol, "ENB");
        assert_eq!(outcome.points[0].currency, "CAD");
    }

    #[tokio::test]
    async fn test_index_proxy_substitution() {
        let day = date(2025, 1, 2);
        let primary = MockSource::new()
            .with_range("^GSPC", Err(MarketDataError::SymbolNotFound("^GSPC".to_string())))
            .with_window("^GSPC", Err(MarketDataError::NoDataForRange))
            .with_range("SPY", Ok(vec![point("SPY", day, dec!(589.49), "USD")]));
        let fetcher = PriceFetcher::new(Arc::new(primary), None);

        let outcome = fetcher
            .fetch("^GSPC", &us_resolved("^GSPC"), day, day, None)
            .await
            .unwrap();
        assert_eq!(outcome.provider_symbol, "SPY");
        assert_eq!(outcome.points[0].symbol, "^GSPC");
        assert_eq!(outcome.points[0].source, "proxy:SPY");
    }

    #[tokio::test]
    async fn test_cad_symbol_satisfied_in_usd_is_converted() {
        let day = date(2025, 1, 2);
        // CAD-hinted cross-listed symbol where only the bare US listing
        // returns data.
        let primary = MockSource::new()
            .with_range("BAM.TO", Err(MarketDataError::SymbolNotFound("BAM.TO".to_string())))
            .with_window("BAM.TO", Err(MarketDataError::NoDataForRange))
            .with_range("BAM.V", Err(MarketDataError::SymbolNotFound("BAM.V".to_string())))
            .with_window("BAM.V", Err(MarketDataError::NoDataForRange))
            .with_range("BAM", Ok(vec![point("BAM", day, dec!(100), "USD")]));
        let fetcher = PriceFetcher::new(Arc::new(primary), None);

        let resolved = ResolvedSymbol {
            market: Market::Ca,
            candidates: vec!["BAM.TO".to_string(), "BAM.V".to_string(), "BAM".to_string()],
        };
        let fx = FxSnapshot::new(dec!(1.35), day);
        let outcome = fetcher
            .fetch("BAM", &resolved, day, day, Some(&fx))
            .await
            .unwrap();
        assert_eq!(outcome.points[0].currency, "CAD");
        assert_eq!(outcome.points[0].close, dec!(135.00));
    }

    #[tokio::test]
    async fn test_suffixed_symbol_never_converted() {
        let day = date(2025, 1, 2);
        let primary = MockSource::new()
            .with_range("SHOP.TO", Ok(vec![point("SHOP.TO", day, dec!(150), "CAD")]));
        let fetcher = PriceFetcher::new(Arc::new(primary), None);

        let resolved = ResolvedSymbol {
            market: Market::Ca,
            candidates: vec!["SHOP.TO".to_string()],
        };
        let fx = FxSnapshot::new(dec!(1.35), day);
        let outcome = fetcher
            .fetch("SHOP.TO", &resolved, day, day, Some(&fx))
            .await
            .unwrap();
        assert_eq!(outcome.points[0].close, dec!(150));
        assert_eq!(outcome.points[0].currency, "CAD");
    }

    #[test]
    fn test_fx_snapshot_round_trip() {
        let fx = FxSnapshot::new(dec!(1.25), date(2025, 1, 2));
        assert_eq!(fx.convert(dec!(100), "USD", "CAD"), Some(dec!(125.00)));
        assert_eq!(fx.convert(dec!(125), "CAD", "USD"), Some(dec!(100.0)));
        assert_eq!(fx.convert(dec!(7), "USD", "USD"), Some(dec!(7)));
        assert_eq!(fx.convert(dec!(7), "EUR", "CAD"), None);
    }

    #[test]
    fn test_clip_restricts_to_range() {
        let points = vec![
            point("AAPL", date(2025, 1, 2), dec!(1), "USD"),
            point("AAPL", date(2025, 1, 10), dec!(2), "USD"),
            point("AAPL", date(2025, 2, 1), dec!(3), "USD"),
        ];
        let clipped = clip(points, date(2025, 1, 5), date(2025, 1, 31));
        assert_eq!(clipped.len(), 1);
        assert_eq!(clipped[0].close, dec!(2));
    }
}
