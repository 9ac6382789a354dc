//! Pipeline-wide constants.

use rust_decimal::Decimal;

/// Maximum snapshot rows per insert statement.
pub const SNAPSHOT_CHUNK_SIZE: usize = 100;

/// Concurrent symbol fetches during batch resolution.
pub const FETCH_WORKER_BOUND: usize = 4;

/// Calendar days fetched before the first valued day so forward-fill
/// always has a prior close to carry over holiday weekends.
pub const FETCH_LOOKBACK_DAYS: i64 = 10;

/// Maximum entries held in the snapshot retry queue.
pub const RETRY_QUEUE_CAPACITY: usize = 256;

/// Last-resort USD/CAD rate when no stored rate exists in either
/// direction. Logged loudly whenever used.
pub const DEFAULT_USD_CAD_RATE: Decimal = Decimal::from_parts(135, 0, 0, false, 2);

/// Decimal places kept on computed valuation figures.
pub const VALUATION_PRECISION: u32 = 6;
