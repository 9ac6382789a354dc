//! Ticker-to-market resolution.
//!
//! Decides which market a ticker trades on and which provider symbols to
//! try, before any network call is made. The rules, in priority order:
//!
//! 1. An explicit Canadian suffix (`.TO`, `.V`, `.CN`, `.NE`) wins: the
//!    symbol is Canadian and is queried exactly as written.
//! 2. A previously discovered suffix for the base symbol is reused.
//! 3. A currency hint from the holdings ledger decides: `CAD` tickers get
//!    Canadian candidates, `USD` tickers get the bare symbol only. A USD
//!    ticker never grows a Canadian suffix — `DG` held in USD must not be
//!    confused with `DG.TO`, a different company.
//! 4. With no hint at all, the bare US symbol is tried first, then the
//!    Canadian listings.

mod suffixes;

use std::sync::Arc;

use dashmap::DashMap;

pub use suffixes::{canadian_suffix, canonical_split, CANADIAN_SUFFIXES};

use crate::models::Market;

/// Source of per-ticker currency hints, typically backed by the holdings
/// ledger ("what currency was this security bought in").
pub trait CurrencyLookup: Send + Sync {
    fn currency_of(&self, symbol: &str) -> Option<String>;
}

/// A lookup with no hints, for callers that resolve purely on syntax.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCurrencyHints;

impl CurrencyLookup for NoCurrencyHints {
    fn currency_of(&self, _symbol: &str) -> Option<String> {
        None
    }
}

/// Outcome of resolving one ticker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedSymbol {
    /// Best guess at the home market. Candidates may still span both.
    pub market: Market,
    /// Provider symbols to try, in order. Never empty.
    pub candidates: Vec<String>,
}

impl ResolvedSymbol {
    /// The first (preferred) candidate.
    pub fn primary(&self) -> &str {
        &self.candidates[0]
    }
}

/// Resolves tickers to markets and candidate provider symbols, caching
/// suffixes discovered from successful fetches.
pub struct TickerResolver {
    currencies: Arc<dyn CurrencyLookup>,
    /// Base symbol -> Canadian suffix that actually returned data.
    discovered: DashMap<String, &'static str>,
}

impl TickerResolver {
    pub fn new(currencies: Arc<dyn CurrencyLookup>) -> Self {
        Self {
            currencies,
            discovered: DashMap::new(),
        }
    }

    /// Resolution on syntax alone, with no currency hints.
    pub fn without_hints() -> Self {
        Self::new(Arc::new(NoCurrencyHints))
    }

    pub fn resolve(&self, symbol: &str) -> ResolvedSymbol {
        let symbol = symbol.trim().to_uppercase();

        // Rule 1: explicit suffix is authoritative.
        if canadian_suffix(&symbol).is_some() {
            return ResolvedSymbol {
                market: Market::Ca,
                candidates: vec![symbol],
            };
        }

        // Rule 2: a suffix that worked before is tried first.
        if let Some(suffix) = self.discovered.get(&symbol) {
            return ResolvedSymbol {
                market: Market::Ca,
                candidates: vec![format!("{symbol}{}", *suffix)],
            };
        }

        // Rule 3: ledger currency decides.
        match self
            .currencies
            .currency_of(&symbol)
            .as_deref()
            .map(str::to_uppercase)
            .as_deref()
        {
            Some("CAD") => ResolvedSymbol {
                market: Market::Ca,
                candidates: vec![format!("{symbol}.TO"), format!("{symbol}.V")],
            },
            Some("USD") => ResolvedSymbol {
                market: Market::Us,
                candidates: vec![symbol],
            },
            // Rule 4: unknown currency, US first then Canadian listings.
            _ => ResolvedSymbol {
                market: Market::Us,
                candidates: vec![
                    symbol.clone(),
                    format!("{symbol}.TO"),
                    format!("{symbol}.V"),
                ],
            },
        }
    }

    /// Records that `provider_symbol` (a suffixed Canadian listing) returned
    /// data, so future resolutions of the base symbol skip the probe.
    pub fn remember(&self, provider_symbol: &str) {
        if let Some((base, suffix)) = canonical_split(provider_symbol) {
            self.discovered.insert(base.to_uppercase(), suffix);
        }
    }
}
