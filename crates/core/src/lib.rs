//! Fundsnap Core
//!
//! Database-agnostic valuation pipeline for multi-fund securities
//! portfolios. Given an append-only trade ledger and the market-data
//! crate's fetch chain, this crate replays holdings, prices them, and
//! persists one immutable snapshot row per (fund, ticker, day).
//!
//! # Modules
//!
//! - [`ledger`] - Trade records and deterministic holdings replay
//! - [`fx`] - Exchange-rate lookup with dated and fallback rates
//! - [`pricing`] - Batch price resolution with forward-fill
//! - [`securities`] - Reference data store (currency hints, profiles)
//! - [`valuation`] - Per-day position valuation and base conversion
//! - [`snapshot`] - Snapshot model, chunked idempotent writes, retry queue
//! - [`job`] - Update/backfill orchestration and the run summary
//!
//! Store access goes through async traits so the storage backend stays
//! swappable; `storage-sqlite` provides the production implementations.

pub mod constants;
pub mod errors;
pub mod fx;
pub mod job;
pub mod ledger;
pub mod pricing;
pub mod securities;
pub mod snapshot;
pub mod valuation;

pub use errors::{Error, Result};
pub use fx::{FxRate, FxRepositoryTrait, FxService};
pub use job::{JobOutcome, RunSummary, ValuationJob};
pub use ledger::{Holding, TradeAction, TradeLedgerRepositoryTrait, TradeRecord};
pub use pricing::{BatchPricer, PriceBook};
pub use securities::{Security, SecurityRepositoryTrait};
pub use snapshot::{PositionSnapshot, SnapshotRepositoryTrait, SnapshotWriter};
pub use valuation::{value_holdings, ValuationGap};
