//! Batch price resolution.
//!
//! One fetch per symbol covering the whole requested range is the
//! throughput lever: a 30-day backfill of 50 symbols is 50 fetches, not
//! 1500. Fetches run concurrently under a small worker bound. Afterwards
//! closed-market days are forward-filled from the most recent prior
//! close, and symbols that exhausted every strategy land in the failure
//! list, never silently dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};

use fundsnap_market_data::{
    FailureClass, FetchFailure, FxSnapshot, Market, MarketCalendar, PriceFetcher, PricePoint,
    TickerResolver,
};
use fundsnap_market_data::resolver::CurrencyLookup;

use crate::constants::FETCH_WORKER_BOUND;
use crate::ledger::TradeRecord;
use crate::securities::{Security, SecurityRepositoryTrait};

/// Source tag for forward-filled rows.
pub const CARRY_SOURCE: &str = "carry";

/// Run-scoped currency hints, seeded once from the ledger and the
/// securities store. Replaces any notion of a global mutable cache; a new
/// run builds a new one.
#[derive(Debug, Default)]
pub struct CurrencyCache {
    map: DashMap<String, String>,
}

impl CurrencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from ledger trades and stored securities. Trade currencies
    /// win over stored hints: the ledger reflects what actually settled.
    pub fn seed(&self, trades: &[TradeRecord], securities: &[Security]) {
        for security in securities {
            if let Some(currency) = &security.currency {
                self.map
                    .insert(security.symbol.to_uppercase(), currency.to_uppercase());
            }
        }
        for trade in trades {
            self.map
                .insert(trade.ticker.to_uppercase(), trade.currency.to_uppercase());
        }
    }

}

impl CurrencyLookup for CurrencyCache {
    fn currency_of(&self, symbol: &str) -> Option<String> {
        self.map.get(&symbol.to_uppercase()).map(|c| c.clone())
    }
}

/// Per-symbol chronological price series plus the run's failure list.
#[derive(Debug, Default)]
pub struct PriceBook {
    series: HashMap<String, BTreeMap<NaiveDate, PricePoint>>,
    pub failures: Vec<FetchFailure>,
}

impl PriceBook {
    /// The price for `symbol` on exactly `date` (fetched or carried).
    pub fn price_on(&self, symbol: &str, date: NaiveDate) -> Option<&PricePoint> {
        self.series.get(symbol)?.get(&date)
    }

    /// The most recent price for `symbol` on or before `date`.
    pub fn price_on_or_before(&self, symbol: &str, date: NaiveDate) -> Option<&PricePoint> {
        self.series
            .get(symbol)?
            .range(..=date)
            .next_back()
            .map(|(_, point)| point)
    }

    pub fn has_series(&self, symbol: &str) -> bool {
        self.series.get(symbol).is_some_and(|s| !s.is_empty())
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub(crate) fn insert_series(&mut self, symbol: String, points: Vec<PricePoint>) {
        let series = self.series.entry(symbol).or_default();
        for point in points {
            series.insert(point.date, point);
        }
    }
}

/// Resolves prices for a set of symbols over a date range.
pub struct BatchPricer {
    calendar: MarketCalendar,
    resolver: Arc<TickerResolver>,
    fetcher: Arc<PriceFetcher>,
    securities: Arc<dyn SecurityRepositoryTrait>,
    worker_bound: usize,
}

impl BatchPricer {
    pub fn new(
        resolver: Arc<TickerResolver>,
        fetcher: Arc<PriceFetcher>,
        securities: Arc<dyn SecurityRepositoryTrait>,
    ) -> Self {
        Self {
            calendar: MarketCalendar::new(),
            resolver,
            fetcher,
            securities,
            worker_bound: FETCH_WORKER_BOUND,
        }
    }

    pub fn with_worker_bound(mut self, bound: usize) -> Self {
        self.worker_bound = bound.max(1);
        self
    }

    /// Fetch and assemble prices for every symbol over `[start, end]`.
    pub async fn resolve_all(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        fx: Option<&FxSnapshot>,
    ) -> PriceBook {
        info!(
            "Resolving prices for {} symbols over {} to {}",
            symbols.len(),
            start,
            end
        );

        let outcomes: Vec<(String, Market, Result<Vec<PricePoint>, FetchFailure>)> =
            stream::iter(symbols.iter().cloned())
                .map(|symbol| async move {
                    let resolved = self.resolver.resolve(&symbol);
                    let market = resolved.market;

                    if !self.has_open_day(market, start, end) {
                        debug!(
                            "{} has no open {} sessions in range; skipping fetch",
                            symbol, market
                        );
                        return (symbol, market, Ok(Vec::new()));
                    }

                    let result = self
                        .fetcher
                        .fetch(&symbol, &resolved, start, end, fx)
                        .await;

                    match result {
                        Ok(outcome) => {
                            self.record_discovery(&symbol, &outcome.provider_symbol).await;
                            (symbol, market, Ok(outcome.points))
                        }
                        Err(failure) => (symbol, market, Err(failure)),
                    }
                })
                .buffer_unordered(self.worker_bound)
                .collect()
                .await;

        let mut book = PriceBook::default();
        for (symbol, market, result) in outcomes {
            match result {
                Ok(points) => {
                    book.insert_series(symbol.clone(), points);
                    self.forward_fill(&mut book, &symbol, market, start, end);
                }
                Err(failure) => {
                    match failure.class {
                        FailureClass::RateLimited => {
                            warn!("Rate limited while fetching {}: {}", symbol, failure.message)
                        }
                        _ => warn!("Fetch failed for {}: {}", symbol, failure.message),
                    }
                    book.failures.push(failure);
                }
            }
        }

        info!(
            "Price resolution finished: {} series, {} failures",
            book.series.len(),
            book.failures.len()
        );
        book
    }

    fn has_open_day(&self, market: Market, start: NaiveDate, end: NaiveDate) -> bool {
        let mut day = start;
        while day <= end {
            if self.calendar.is_open(market, day) {
                return true;
            }
            day += Duration::days(1);
        }
        false
    }

    /// Carry the most recent prior close onto closed-market days.
    ///
    /// Open-day misses are left as gaps: an absent price on a day the
    /// market traded is a data problem, not a calendar artifact, and must
    /// stay visible.
    fn forward_fill(
        &self,
        book: &mut PriceBook,
        symbol: &str,
        market: Market,
        start: NaiveDate,
        end: NaiveDate,
    ) {
        let mut carried: Vec<PricePoint> = Vec::new();
        let mut day = start;
        while day <= end {
            if !self.calendar.is_open(market, day) && book.price_on(symbol, day).is_none() {
                if let Some(prior) = book.price_on_or_before(symbol, day) {
                    let mut carry = prior.clone();
                    carry.date = day;
                    carry.source = CARRY_SOURCE.to_string();
                    carried.push(carry);
                }
            }
            day += Duration::days(1);
        }
        if !carried.is_empty() {
            debug!("Forward-filled {} closed days for {}", carried.len(), symbol);
            book.insert_series(symbol.to_string(), carried);
        }
    }

    /// Best-effort write-back of a discovered provider symbol.
    async fn record_discovery(&self, symbol: &str, provider_symbol: &str) {
        if symbol == provider_symbol {
            return;
        }
        self.resolver.remember(provider_symbol);
        if let Err(e) = self
            .securities
            .save_canonical_symbol(symbol, provider_symbol)
            .await
        {
            error!(
                "Failed to persist canonical symbol {} -> {}: {}",
                symbol, provider_symbol, e
            );
        }
    }
}
