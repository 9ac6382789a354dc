//! Environment-driven configuration.

use std::path::PathBuf;

pub struct Config {
    pub db_path: PathBuf,
    pub alpha_vantage_api_key: Option<String>,
    pub base_currency: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("FUNDSNAP_DB_PATH")
                .unwrap_or_else(|_| "fundsnap.db".to_string())
                .into(),
            alpha_vantage_api_key: std::env::var("ALPHAVANTAGE_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            base_currency: std::env::var("FUNDSNAP_BASE_CURRENCY")
                .unwrap_or_else(|_| "CAD".to_string()),
        }
    }
}
