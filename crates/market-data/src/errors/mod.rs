//! Error types and failure classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all provider operations
//! - [`FailureClass`]: Terminal classification used by the batch engine
//! - [`FetchFailure`]: The terminal "all strategies failed" result for a symbol

use thiserror::Error;

/// Errors that can occur while talking to a market data provider.
///
/// Strategy-level errors never escape the fetch chain; they are folded into
/// a [`FetchFailure`] tagged with the last meaningful [`FailureClass`].
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The requested symbol was not found by the provider.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// The provider responded but had no quotes for the requested range.
    /// May be legitimate for a new listing.
    #[error("No data for date range")]
    NoDataForRange,

    /// The provider rate limited the request (HTTP 429 / throttle note).
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// A provider-specific error occurred (network, 5xx, malformed payload).
    #[error("Provider error: {provider} - {message}")]
    ProviderError {
        /// The provider that returned the error
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The market for a symbol could not be determined with confidence.
    #[error("Ambiguous symbol: {0}")]
    AmbiguousSymbol(String),

    /// The provider returned data that failed validation checks
    /// (non-finite, zero, or negative close). Treated as missing data.
    #[error("Validation failed: {message}")]
    ValidationFailed {
        /// Description of the validation failure
        message: String,
    },

    /// A network error occurred while communicating with a provider.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Terminal failure classification for a symbol whose every strategy failed.
///
/// `RateLimited` failures are surfaced distinctly in logs and run summaries
/// because they indicate the batch concurrency bound needs tuning, not that
/// the symbol is bad.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// At least one provider throttled the request.
    RateLimited,
    /// Every provider responded, but none had data.
    NoData,
    /// Network, 5xx, or payload errors.
    Other,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureClass::RateLimited => write!(f, "rate_limited"),
            FailureClass::NoData => write!(f, "no_data"),
            FailureClass::Other => write!(f, "other"),
        }
    }
}

impl MarketDataError {
    /// Classify this error for batch-level accounting.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::RateLimited { .. } => FailureClass::RateLimited,
            Self::SymbolNotFound(_) | Self::NoDataForRange | Self::ValidationFailed { .. } => {
                FailureClass::NoData
            }
            Self::Timeout { .. }
            | Self::ProviderError { .. }
            | Self::AmbiguousSymbol(_)
            | Self::Network(_) => FailureClass::Other,
        }
    }
}

/// Terminal result for a symbol after the whole strategy chain failed.
///
/// Returned instead of the underlying errors so callers can apply
/// position-level fallback policy rather than aborting a batch.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    /// The canonical symbol that failed.
    pub symbol: String,
    /// Last meaningful failure class across the chain.
    pub class: FailureClass,
    /// Human-readable detail from the last strategy attempted.
    pub message: String,
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.symbol, self.class, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_class() {
        let error = MarketDataError::RateLimited {
            provider: "YAHOO".to_string(),
        };
        assert_eq!(error.failure_class(), FailureClass::RateLimited);
    }

    #[test]
    fn test_empty_responses_classify_as_no_data() {
        assert_eq!(
            MarketDataError::NoDataForRange.failure_class(),
            FailureClass::NoData
        );
        assert_eq!(
            MarketDataError::SymbolNotFound("INVALID".to_string()).failure_class(),
            FailureClass::NoData
        );
        assert_eq!(
            MarketDataError::ValidationFailed {
                message: "close is zero".to_string(),
            }
            .failure_class(),
            FailureClass::NoData
        );
    }

    #[test]
    fn test_transport_errors_classify_as_other() {
        let error = MarketDataError::ProviderError {
            provider: "ALPHA_VANTAGE".to_string(),
            message: "HTTP 500".to_string(),
        };
        assert_eq!(error.failure_class(), FailureClass::Other);

        let error = MarketDataError::Timeout {
            provider: "YAHOO".to_string(),
        };
        assert_eq!(error.failure_class(), FailureClass::Other);
    }

    #[test]
    fn test_error_display() {
        let error = MarketDataError::SymbolNotFound("INVALID".to_string());
        assert_eq!(format!("{}", error), "Symbol not found: INVALID");

        let error = MarketDataError::RateLimited {
            provider: "YAHOO".to_string(),
        };
        assert_eq!(format!("{}", error), "Rate limited: YAHOO");
    }

    #[test]
    fn test_fetch_failure_display() {
        let failure = FetchFailure {
            symbol: "SHOP.TO".to_string(),
            class: FailureClass::NoData,
            message: "No data for date range".to_string(),
        };
        assert_eq!(
            failure.to_string(),
            "SHOP.TO [no_data]: No data for date range"
        );
    }
}
