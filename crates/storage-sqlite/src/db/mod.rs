//! Connection bootstrap and schema.

mod write_actor;

use std::path::Path;

use log::info;
use rusqlite::Connection;

use crate::errors::StorageError;
use fundsnap_core::errors::Result;

pub use write_actor::{spawn_writer, WriteHandle};

/// Idempotent schema. Decimals are stored as TEXT to survive SQLite's
/// float affinity; dates as ISO-8601 TEXT so lexicographic order is
/// chronological order.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS trades (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fund TEXT NOT NULL,
    ticker TEXT NOT NULL,
    trade_date TEXT NOT NULL,
    shares TEXT NOT NULL,
    price TEXT NOT NULL,
    currency TEXT NOT NULL,
    action TEXT NOT NULL CHECK (action IN ('BUY', 'SELL'))
);
CREATE INDEX IF NOT EXISTS idx_trades_fund_date ON trades (fund, trade_date);

CREATE TABLE IF NOT EXISTS securities (
    symbol TEXT PRIMARY KEY,
    currency TEXT,
    canonical_symbol TEXT,
    name TEXT,
    sector TEXT,
    industry TEXT,
    market_cap REAL,
    week_52_high REAL,
    week_52_low REAL,
    profile_source TEXT
);

CREATE TABLE IF NOT EXISTS fx_rates (
    from_currency TEXT NOT NULL,
    to_currency TEXT NOT NULL,
    rate_date TEXT NOT NULL,
    rate TEXT NOT NULL,
    PRIMARY KEY (from_currency, to_currency, rate_date)
);

CREATE TABLE IF NOT EXISTS position_snapshots (
    fund TEXT NOT NULL,
    ticker TEXT NOT NULL,
    snapshot_date TEXT NOT NULL,
    shares TEXT NOT NULL,
    price TEXT NOT NULL,
    cost_basis TEXT NOT NULL,
    pnl TEXT NOT NULL,
    currency TEXT NOT NULL,
    base_currency TEXT NOT NULL,
    value_base TEXT NOT NULL,
    cost_basis_base TEXT NOT NULL,
    pnl_base TEXT NOT NULL,
    fx_rate TEXT NOT NULL,
    PRIMARY KEY (fund, ticker, snapshot_date)
);
CREATE INDEX IF NOT EXISTS idx_snapshots_fund_date
    ON position_snapshots (fund, snapshot_date);
";

/// Open the database file, apply pragmas and the schema, and spawn the
/// writer actor.
pub fn init(path: &Path) -> Result<WriteHandle> {
    let conn = open(path)?;
    run_schema(&conn)?;
    info!("SQLite store ready at {}", path.display());
    Ok(spawn_writer(conn))
}

/// In-memory variant, used by tests and dry runs.
pub fn init_in_memory() -> Result<WriteHandle> {
    let conn =
        Connection::open_in_memory().map_err(|e| StorageError::OpenFailed(e.to_string()))?;
    run_schema(&conn)?;
    Ok(spawn_writer(conn))
}

fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(|e| StorageError::OpenFailed(e.to_string()))?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(StorageError::QueryFailed)?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(StorageError::QueryFailed)?;
    conn.pragma_update(None, "busy_timeout", 5000)
        .map_err(StorageError::QueryFailed)?;
    Ok(conn)
}

fn run_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .map_err(StorageError::QueryFailed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_schema(&conn).unwrap();
        run_schema(&conn).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
                 ('trades', 'securities', 'fx_rates', 'position_snapshots')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 4);
    }

    #[test]
    fn test_init_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fundsnap.db");
        // init spawns onto the runtime, so only exercise open + schema.
        let conn = open(&path).unwrap();
        run_schema(&conn).unwrap();
        assert!(path.exists());
    }
}
