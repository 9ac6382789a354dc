//! Run orchestration: update-latest and backfill.
//!
//! One run owns the whole pipeline: take the run lock, seed the currency
//! cache, capture an FX snapshot, resolve prices once for the union of
//! tickers, then replay/value/persist each fund day by day. Per-fund
//! failures are logged with the fund name and never abort other funds.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, LazyLock, Mutex};

use chrono::{Duration, NaiveDate};
use log::{debug, error, info, warn};

use fundsnap_market_data::{
    FailureClass, MarketCalendar, PriceFetcher, TickerResolver,
};

use crate::constants::{FETCH_LOOKBACK_DAYS, FETCH_WORKER_BOUND};
use crate::errors::{Error, Result};
use crate::fx::FxService;
use crate::ledger::{replay_as_of, TradeLedgerRepositoryTrait, TradeRecord};
use crate::pricing::{BatchPricer, CurrencyCache, PriceBook};
use crate::securities::{Security, SecurityRepositoryTrait};
use crate::snapshot::{PendingRetry, PositionSnapshot, RetryQueue, SnapshotWriter};
use crate::valuation::value_holdings;

static RUN_LOCKS: LazyLock<Mutex<HashSet<String>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// RAII guard serializing valuation runs per scope. A second run started
/// while the scope is held is skipped, not queued.
struct RunLockGuard {
    scope: String,
}

impl RunLockGuard {
    fn try_acquire(scope: &str) -> Option<Self> {
        let mut locks = RUN_LOCKS.lock().unwrap_or_else(|e| e.into_inner());
        if locks.contains(scope) {
            return None;
        }
        locks.insert(scope.to_string());
        Some(Self {
            scope: scope.to_string(),
        })
    }
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        let mut locks = RUN_LOCKS.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(&self.scope);
    }
}

/// Aggregate result of one run.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub tickers_fetched: usize,
    pub tickers_failed: usize,
    /// Subset of `tickers_failed` that hit a provider rate limit.
    pub tickers_rate_limited: usize,
    pub funds_updated: usize,
    /// Funds written with at least one price gap or failed day.
    pub funds_partial: usize,
    /// Funds where every requested day failed to persist.
    pub funds_skipped: usize,
    pub gap_count: usize,
    /// Fund-day slices still awaiting a successful write.
    pub pending_retries: Vec<PendingRetry>,
    /// True only if every fund's rows for every requested day passed
    /// write verification.
    pub complete: bool,
}

impl RunSummary {
    pub fn summary_line(&self) -> String {
        format!(
            "{} | tickers {}/{} fetched ({} rate-limited), funds {} updated / {} partial / {} skipped, {} gaps, {} pending retries",
            if self.complete { "complete" } else { "incomplete" },
            self.tickers_fetched,
            self.tickers_fetched + self.tickers_failed,
            self.tickers_rate_limited,
            self.funds_updated,
            self.funds_partial,
            self.funds_skipped,
            self.gap_count,
            self.pending_retries.len(),
        )
    }
}

/// What a run invocation amounted to.
#[derive(Clone, Debug)]
pub enum JobOutcome {
    Completed(RunSummary),
    /// Another run held the lock; nothing was done.
    Skipped,
}

/// The valuation pipeline, wired once and invoked per run.
pub struct ValuationJob {
    ledger: Arc<dyn TradeLedgerRepositoryTrait>,
    securities: Arc<dyn SecurityRepositoryTrait>,
    fx: FxService,
    fetcher: Arc<PriceFetcher>,
    writer: SnapshotWriter,
    retry_queue: Arc<RetryQueue>,
    calendar: MarketCalendar,
    base_currency: String,
    lock_scope: String,
    worker_bound: usize,
}

impl ValuationJob {
    pub fn new(
        ledger: Arc<dyn TradeLedgerRepositoryTrait>,
        securities: Arc<dyn SecurityRepositoryTrait>,
        fx: FxService,
        fetcher: Arc<PriceFetcher>,
        snapshots: Arc<dyn crate::snapshot::SnapshotRepositoryTrait>,
    ) -> Self {
        let retry_queue = Arc::new(RetryQueue::default());
        Self {
            ledger,
            securities,
            fx,
            fetcher,
            writer: SnapshotWriter::new(snapshots, retry_queue.clone()),
            retry_queue,
            calendar: MarketCalendar::new(),
            base_currency: "CAD".to_string(),
            lock_scope: "valuation".to_string(),
            worker_bound: FETCH_WORKER_BOUND,
        }
    }

    pub fn with_base_currency(mut self, currency: &str) -> Self {
        self.base_currency = currency.to_uppercase();
        self
    }

    /// Scope of the run lock. Jobs sharing a scope never overlap; jobs
    /// over different databases should use distinct scopes.
    pub fn with_lock_scope(mut self, scope: &str) -> Self {
        self.lock_scope = scope.to_string();
        self
    }

    pub fn with_worker_bound(mut self, bound: usize) -> Self {
        self.worker_bound = bound.max(1);
        self
    }

    /// Value every fund as of the most recent day either market traded.
    pub async fn update_latest(&self, today: NaiveDate) -> Result<JobOutcome> {
        let anchor = self.calendar.last_any_trading_day(today);
        info!("Update-latest anchored to {}", anchor);
        self.run(vec![anchor]).await
    }

    /// Rebuild snapshots for every day in `[start, end]`. Re-running the
    /// same range replaces the rows rather than duplicating them.
    pub async fn backfill(&self, start: NaiveDate, end: NaiveDate) -> Result<JobOutcome> {
        if start > end {
            return Err(Error::Validation(format!(
                "backfill start {} is after end {}",
                start, end
            )));
        }
        let mut days = Vec::new();
        let mut day = start;
        while day <= end {
            days.push(day);
            day += Duration::days(1);
        }
        info!("Backfilling {} days, {} to {}", days.len(), start, end);
        self.run(days).await
    }

    async fn run(&self, days: Vec<NaiveDate>) -> Result<JobOutcome> {
        let Some(_guard) = RunLockGuard::try_acquire(&self.lock_scope) else {
            info!("A valuation run is already in progress; skipping");
            return Ok(JobOutcome::Skipped);
        };

        let trades = self.ledger.all_trades().await?;
        if trades.is_empty() {
            info!("Ledger is empty; nothing to value");
            return Ok(JobOutcome::Completed(RunSummary {
                complete: true,
                ..RunSummary::default()
            }));
        }
        let securities = self.securities.all_securities().await?;

        let cache = Arc::new(CurrencyCache::new());
        cache.seed(&trades, &securities);
        let resolver = Arc::new(TickerResolver::new(cache));
        let pricer = BatchPricer::new(resolver, self.fetcher.clone(), self.securities.clone())
            .with_worker_bound(self.worker_bound);

        let first_day = days[0];
        let last_day = days[days.len() - 1];
        let fx_snapshot = self.fx.snapshot(last_day).await?;

        let by_fund = group_by_fund(trades);
        let symbols: Vec<String> = by_fund
            .values()
            .flatten()
            .map(|t| t.ticker.to_uppercase())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let fetch_start = first_day - Duration::days(FETCH_LOOKBACK_DAYS);
        let book = pricer
            .resolve_all(&symbols, fetch_start, last_day, Some(&fx_snapshot))
            .await;

        let rate_limited = book
            .failures
            .iter()
            .filter(|f| f.class == FailureClass::RateLimited)
            .count();
        let mut summary = RunSummary {
            tickers_fetched: fetched_count(&symbols, &book),
            tickers_failed: book.failures.len(),
            tickers_rate_limited: rate_limited,
            ..RunSummary::default()
        };

        self.refresh_profiles(&symbols, &securities).await;

        // Rows are cached per fund-day so the repair pass can rewrite a
        // failed slice without recomputing the valuation.
        let mut rows_cache: HashMap<(String, NaiveDate), Vec<PositionSnapshot>> = HashMap::new();
        let mut failed_days = 0usize;

        for (fund, fund_trades) in &by_fund {
            let mut fund_gaps = 0usize;
            let mut fund_failed_days = 0usize;

            for day in &days {
                let holdings = replay_as_of(fund_trades, *day);
                let valued = value_holdings(
                    fund,
                    *day,
                    &holdings,
                    &book,
                    &self.fx,
                    &self.base_currency,
                )
                .await;
                let (rows, gaps) = match valued {
                    Ok(valued) => valued,
                    Err(e) => {
                        error!("Failed to value fund '{}' for {}: {}", fund, day, e);
                        fund_failed_days += 1;
                        continue;
                    }
                };
                fund_gaps += gaps.len();

                rows_cache.insert((fund.clone(), *day), rows.clone());
                if let Err(e) = self.writer.replace_day(fund, *day, &rows).await {
                    error!("Failed to persist fund '{}' for {}: {}", fund, day, e);
                    fund_failed_days += 1;
                }
            }

            summary.gap_count += fund_gaps;
            failed_days += fund_failed_days;
            if fund_failed_days == days.len() {
                warn!("Fund '{}' skipped: every requested day failed", fund);
                summary.funds_skipped += 1;
            } else if fund_failed_days > 0 || fund_gaps > 0 {
                summary.funds_partial += 1;
            } else {
                summary.funds_updated += 1;
            }
        }

        let repaired = self
            .writer
            .repair(|fund, date| {
                rows_cache
                    .get(&(fund.to_string(), date))
                    .cloned()
                    .unwrap_or_default()
            })
            .await;
        if repaired > 0 {
            info!("Repair pass rewrote {} fund-day slices", repaired);
        }

        summary.pending_retries = self.retry_queue.snapshot().await;
        summary.complete = failed_days == repaired && summary.pending_retries.is_empty();

        info!("Run finished: {}", summary.summary_line());
        Ok(JobOutcome::Completed(summary))
    }

    /// Best-effort fundamentals refresh for run tickers with no stored
    /// name. Failures are logged and ignored.
    async fn refresh_profiles(&self, symbols: &[String], securities: &[Security]) {
        let named: HashSet<&str> = securities
            .iter()
            .filter(|s| s.name.is_some())
            .map(|s| s.symbol.as_str())
            .collect();

        for symbol in symbols {
            if named.contains(symbol.as_str()) {
                continue;
            }
            match self.fetcher.profile(symbol).await {
                Ok(profile) => {
                    if let Err(e) = self.securities.save_profile(symbol, &profile).await {
                        warn!("Failed to store profile for {}: {}", symbol, e);
                    }
                }
                Err(e) => debug!("No profile for {}: {}", symbol, e),
            }
        }
    }
}

/// Symbols that ended the fetch with at least one price bar.
///
/// A symbol can finish with neither a series nor a recorded failure
/// (no open sessions in the fetch range), so counting from the failure
/// list alone overstates what was fetched.
fn fetched_count(symbols: &[String], book: &PriceBook) -> usize {
    symbols
        .iter()
        .filter(|symbol| book.has_series(symbol))
        .count()
}

fn group_by_fund(trades: Vec<TradeRecord>) -> BTreeMap<String, Vec<TradeRecord>> {
    let mut by_fund: BTreeMap<String, Vec<TradeRecord>> = BTreeMap::new();
    for trade in trades {
        by_fund.entry(trade.fund.clone()).or_default().push(trade);
    }
    by_fund
}

#[cfg(test)]
mod tests {
    use super::*;

    use fundsnap_market_data::PricePoint;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fetched_count_skips_symbols_without_bars() {
        let mut book = PriceBook::default();
        book.insert_series(
            "AAPL".to_string(),
            vec![PricePoint {
                symbol: "AAPL".to_string(),
                date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
                open: None,
                high: None,
                low: None,
                close: dec!(234.93),
                volume: None,
                currency: "USD".to_string(),
                source: "MOCK".to_string(),
            }],
        );
        // A symbol with no open sessions in range ends with an empty
        // series and no recorded failure; it was not fetched.
        book.insert_series("SHOP.TO".to_string(), Vec::new());

        let symbols = vec![
            "AAPL".to_string(),
            "SHOP.TO".to_string(),
            "DG".to_string(),
        ];
        assert_eq!(fetched_count(&symbols, &book), 1);
    }

    #[test]
    fn test_run_lock_is_exclusive_per_scope() {
        let first = RunLockGuard::try_acquire("lock-test");
        assert!(first.is_some());
        assert!(RunLockGuard::try_acquire("lock-test").is_none());
        drop(first);
        assert!(RunLockGuard::try_acquire("lock-test").is_some());
    }

    #[test]
    fn test_summary_line_reports_counts() {
        let summary = RunSummary {
            tickers_fetched: 4,
            tickers_failed: 1,
            tickers_rate_limited: 1,
            funds_updated: 2,
            complete: false,
            ..RunSummary::default()
        };
        let line = summary.summary_line();
        assert!(line.starts_with("incomplete"));
        assert!(line.contains("4/5 fetched"));
        assert!(line.contains("1 rate-limited"));
    }

    #[test]
    fn test_group_by_fund_preserves_trade_order() {
        use crate::ledger::TradeAction;
        use rust_decimal_macros::dec;

        let date = |d: u32| NaiveDate::from_ymd_opt(2025, 1, d).unwrap();
        let trade = |fund: &str, ticker: &str, d: u32| TradeRecord {
            fund: fund.to_string(),
            ticker: ticker.to_string(),
            date: date(d),
            shares: dec!(1),
            price: dec!(10),
            currency: "USD".to_string(),
            action: TradeAction::Buy,
        };

        let grouped = group_by_fund(vec![
            trade("beta", "MSFT", 3),
            trade("alpha", "AAPL", 1),
            trade("alpha", "SHOP.TO", 2),
        ]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["alpha"].len(), 2);
        assert_eq!(grouped["alpha"][0].ticker, "AAPL");
    }
}
