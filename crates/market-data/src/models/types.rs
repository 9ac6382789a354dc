use serde::{Deserialize, Serialize};

/// National market an instrument trades on.
///
/// Only the two markets that share ticker symbol conventions are modeled;
/// the whole suffix-disambiguation design exists because a bare root ticker
/// can name different companies on each side of the border.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    /// NYSE / Nasdaq, trades in USD.
    Us,
    /// TSX / TSXV / CSE / NEO, trades in CAD.
    Ca,
}

impl Market {
    /// The currency instruments quote in on this market.
    pub fn native_currency(&self) -> &'static str {
        match self {
            Market::Us => "USD",
            Market::Ca => "CAD",
        }
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Market::Us => write!(f, "US"),
            Market::Ca => write!(f, "CA"),
        }
    }
}
