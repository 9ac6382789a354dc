//! SQLite storage implementation for fundsnap.
//!
//! Implements the repository traits defined in `fundsnap-core` over a
//! single rusqlite connection owned by a writer-actor task. This crate
//! is the only place database specifics exist; everything above it works
//! with traits.
//!
//! ```text
//! core (domain)      market-data (providers)
//!       │                      │
//!       └──────────┬───────────┘
//!                  │
//!                  ▼
//!          storage-sqlite (this crate)
//!                  │
//!                  ▼
//!              SQLite DB
//! ```

pub mod db;
pub mod errors;
mod utils;

pub mod fx;
pub mod ledger;
pub mod securities;
pub mod snapshots;

pub use db::{init, init_in_memory, spawn_writer, WriteHandle};
pub use errors::StorageError;
pub use fx::SqliteFxRepository;
pub use ledger::SqliteTradeLedgerRepository;
pub use securities::SqliteSecurityRepository;
pub use snapshots::SqliteSnapshotRepository;

// Re-export from fundsnap-core for convenience
pub use fundsnap_core::errors::{DatabaseError, Error, Result};
