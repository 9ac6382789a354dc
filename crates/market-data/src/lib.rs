//! Fundsnap Market Data Crate
//!
//! Provider-agnostic market data fetching for the fundsnap valuation
//! pipeline.
//!
//! # Overview
//!
//! This crate covers the unreliable half of the pipeline:
//! - Per-market trading-day calendar (US and Canada, independent)
//! - Resolution of bare ticker symbols to the correct national market
//! - A cascading multi-source fetch chain over Yahoo Finance and
//!   Alpha Vantage, with failure classification
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |   Bare symbol    | --> |  TickerResolver  |  (market + candidates)
//! +------------------+     +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |   PriceFetcher   |  (ordered strategy chain)
//!                          +------------------+
//!                             |            |
//!                             v            v
//!                      +-----------+ +--------------+
//!                      |   Yahoo   | | AlphaVantage |
//!                      +-----------+ +--------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |    PricePoint    |  (normalized OHLCV)
//!                          +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`Market`] - National market (US or Canada)
//! - [`ResolvedSymbol`] - Symbol with inferred market and fetch candidates
//! - [`PricePoint`] - Normalized daily OHLCV row with its source
//! - [`FailureClass`] - Terminal failure classification for a symbol

pub mod calendar;
pub mod errors;
pub mod fetcher;
pub mod models;
pub mod provider;
pub mod resolver;

pub use calendar::MarketCalendar;
pub use errors::{FailureClass, FetchFailure, MarketDataError};
pub use models::{Market, PricePoint, SecurityProfile};
pub use resolver::{canadian_suffix, CurrencyLookup, ResolvedSymbol, TickerResolver};

pub use fetcher::{FetchOutcome, FxSnapshot, PriceFetcher};
pub use provider::alpha_vantage::AlphaVantageProvider;
pub use provider::yahoo::YahooProvider;
pub use provider::{LookbackWindow, QuoteSource};
