//! Securities reference store.
//!
//! Supplies currency and market hints for symbol resolution, and accepts
//! best-effort write-back of discovered provider symbols and fetched
//! fundamentals. Nothing here is required for snapshot correctness; a
//! failed write-back is logged and forgotten.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fundsnap_market_data::SecurityProfile;

use crate::errors::Result;

/// Reference data for one security.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Security {
    /// Ticker as it appears in the ledger.
    pub symbol: String,
    /// Trading currency, when known. Feeds the currency cache.
    pub currency: Option<String>,
    /// Provider-side symbol discovered by a past successful fetch
    /// (e.g. `ENB` -> `ENB.TO`).
    pub canonical_symbol: Option<String>,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub week_52_high: Option<f64>,
    pub week_52_low: Option<f64>,
}

/// Access to the securities reference store.
#[async_trait]
pub trait SecurityRepositoryTrait: Send + Sync {
    async fn all_securities(&self) -> Result<Vec<Security>>;

    /// Record the provider symbol that satisfied a fetch for `symbol`.
    async fn save_canonical_symbol(&self, symbol: &str, canonical: &str) -> Result<()>;

    /// Merge fetched fundamentals into the stored record for `symbol`.
    async fn save_profile(&self, symbol: &str, profile: &SecurityProfile) -> Result<()>;
}
