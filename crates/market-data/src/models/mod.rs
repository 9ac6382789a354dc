//! Core data model for market data.

mod price;
mod profile;
mod types;

pub use price::{decimal_from_f64, PricePoint};
pub use profile::SecurityProfile;
pub use types::Market;
