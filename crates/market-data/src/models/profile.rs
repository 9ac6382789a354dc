use serde::{Deserialize, Serialize};

/// Provider-sourced reference data for a security.
///
/// Best-effort side channel; never required for valuation correctness.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SecurityProfile {
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub week_52_high: Option<f64>,
    pub week_52_low: Option<f64>,
    /// Provider that supplied the profile.
    pub source: Option<String>,
}
