//! Alpha Vantage quote source.
//!
//! Secondary price source behind Yahoo. Two call shapes: the
//! TIME_SERIES_DAILY JSON endpoint, and the same endpoint in CSV form,
//! which occasionally succeeds when the JSON variant is being throttled.
//!
//! The free tier allows about 5 calls per minute; rate-limit replies come
//! back as HTTP 200 with a "Note" or "Information" body, so those are
//! sniffed and classified explicitly.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::MarketDataError;
use crate::models::{PricePoint, SecurityProfile};
use crate::provider::{LookbackWindow, QuoteSource};
use crate::resolver::canadian_suffix;

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER_ID: &str = "ALPHA_VANTAGE";

/// Alpha Vantage quote source.
pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
}

// ============================================================================
// Response structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<HashMap<String, DailyQuote>>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailyQuote {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

/// OVERVIEW response, reduced to the fields that map onto
/// [`SecurityProfile`].
#[derive(Debug, Deserialize)]
struct CompanyOverviewResponse {
    #[serde(rename = "Symbol")]
    symbol: Option<String>,
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Sector")]
    sector: Option<String>,
    #[serde(rename = "Industry")]
    industry: Option<String>,
    #[serde(rename = "MarketCapitalization")]
    market_capitalization: Option<String>,
    #[serde(rename = "52WeekHigh")]
    week_52_high: Option<String>,
    #[serde(rename = "52WeekLow")]
    week_52_low: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

impl CompanyOverviewResponse {
    /// Parse a numeric field, treating "None" and "-" placeholders as absent.
    fn parse_f64(s: &Option<String>) -> Option<f64> {
        s.as_ref()
            .filter(|v| !v.is_empty() && *v != "None" && *v != "-" && *v != "0")
            .and_then(|v| v.parse::<f64>().ok())
    }

    fn to_profile(&self) -> SecurityProfile {
        SecurityProfile {
            name: self.name.clone(),
            sector: self.sector.clone(),
            industry: self.industry.clone(),
            market_cap: Self::parse_f64(&self.market_capitalization),
            week_52_high: Self::parse_f64(&self.week_52_high),
            week_52_low: Self::parse_f64(&self.week_52_low),
            source: Some(PROVIDER_ID.to_string()),
        }
    }
}

// ============================================================================
// AlphaVantageProvider implementation
// ============================================================================

impl AlphaVantageProvider {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, api_key }
    }

    async fn fetch(&self, params: &[(&str, &str)]) -> Result<String, MarketDataError> {
        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("apikey", &self.api_key));

        let url = reqwest::Url::parse_with_params(BASE_URL, &all_params).map_err(|e| {
            MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("Failed to build URL: {}", e),
            }
        })?;

        debug!(
            "Alpha Vantage request: {}",
            url.as_str().replace(&self.api_key, "***")
        );

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                MarketDataError::Timeout {
                    provider: PROVIDER_ID.to_string(),
                }
            } else {
                MarketDataError::ProviderError {
                    provider: PROVIDER_ID.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited {
                provider: PROVIDER_ID.to_string(),
            });
        }

        if !status.is_success() {
            return Err(MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        response
            .text()
            .await
            .map_err(|e| MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: e.to_string(),
            })
    }

    /// Classify API-level errors reported inside a 200 body.
    fn check_api_error(
        error_message: &Option<String>,
        note: &Option<String>,
        information: &Option<String>,
    ) -> Result<(), MarketDataError> {
        if let Some(msg) = error_message {
            if msg.contains("Invalid API call") || msg.contains("not found") {
                return Err(MarketDataError::SymbolNotFound(msg.clone()));
            }
            return Err(MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: msg.clone(),
            });
        }

        // "Note" and "Information" usually mean throttling.
        for msg in [note, information].into_iter().flatten() {
            if msg.contains("API call frequency")
                || msg.contains("rate limit")
                || msg.contains("call volume")
            {
                return Err(MarketDataError::RateLimited {
                    provider: PROVIDER_ID.to_string(),
                });
            }
            warn!("Alpha Vantage notice: {}", msg);
        }

        Ok(())
    }

    fn parse_date(date_str: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()
    }

    fn parse_decimal(s: &str) -> Option<Decimal> {
        Decimal::from_str(s.trim()).ok().filter(|d| !d.is_sign_negative())
    }

    fn currency_for(symbol: &str) -> &'static str {
        if canadian_suffix(symbol).is_some() {
            "CAD"
        } else {
            "USD"
        }
    }

    /// Fetch daily bars as JSON.
    async fn fetch_daily_json(&self, symbol: &str) -> Result<Vec<PricePoint>, MarketDataError> {
        let params = [
            ("function", "TIME_SERIES_DAILY"),
            ("symbol", symbol),
            ("outputsize", "compact"),
        ];

        let text = self.fetch(&params).await?;
        let response: TimeSeriesResponse =
            serde_json::from_str(&text).map_err(|e| MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("Failed to parse response: {}", e),
            })?;

        Self::check_api_error(
            &response.error_message,
            &response.note,
            &response.information,
        )?;

        let time_series = response
            .time_series
            .ok_or_else(|| MarketDataError::SymbolNotFound(symbol.to_string()))?;

        let currency = Self::currency_for(symbol);
        let mut points: Vec<PricePoint> = time_series
            .into_iter()
            .filter_map(|(date_str, daily)| {
                let date = Self::parse_date(&date_str)?;
                let close = Self::parse_decimal(&daily.close).filter(|c| *c > Decimal::ZERO)?;
                Some(PricePoint {
                    symbol: symbol.to_string(),
                    date,
                    open: Self::parse_decimal(&daily.open),
                    high: Self::parse_decimal(&daily.high),
                    low: Self::parse_decimal(&daily.low),
                    close,
                    volume: Self::parse_decimal(&daily.volume),
                    currency: currency.to_string(),
                    source: PROVIDER_ID.to_string(),
                })
            })
            .collect();

        points.sort_by_key(|p| p.date);

        debug!(
            "Alpha Vantage: fetched {} daily bars for {}",
            points.len(),
            symbol
        );

        Ok(points)
    }

    /// Fetch daily bars in CSV form.
    ///
    /// The CSV endpoint renders rate-limit notices as plain text rather
    /// than a header row, so a malformed header is treated as throttling.
    async fn fetch_daily_csv(&self, symbol: &str) -> Result<Vec<PricePoint>, MarketDataError> {
        let params = [
            ("function", "TIME_SERIES_DAILY"),
            ("symbol", symbol),
            ("outputsize", "compact"),
            ("datatype", "csv"),
        ];

        let text = self.fetch(&params).await?;
        let points = Self::parse_csv(symbol, &text)?;

        debug!(
            "Alpha Vantage: fetched {} CSV bars for {}",
            points.len(),
            symbol
        );

        Ok(points)
    }

    fn parse_csv(symbol: &str, body: &str) -> Result<Vec<PricePoint>, MarketDataError> {
        let mut lines = body.lines();
        let header = lines.next().unwrap_or_default();
        if !header.starts_with("timestamp,") {
            // Not CSV at all: an error or throttle notice in disguise.
            if body.contains("rate limit") || body.contains("call frequency") {
                return Err(MarketDataError::RateLimited {
                    provider: PROVIDER_ID.to_string(),
                });
            }
            return Err(MarketDataError::SymbolNotFound(symbol.to_string()));
        }

        let currency = Self::currency_for(symbol);
        let mut points: Vec<PricePoint> = lines
            .filter_map(|line| {
                let fields: Vec<&str> = line.split(',').collect();
                if fields.len() < 6 {
                    return None;
                }
                let date = Self::parse_date(fields[0])?;
                let close = Self::parse_decimal(fields[4]).filter(|c| *c > Decimal::ZERO)?;
                Some(PricePoint {
                    symbol: symbol.to_string(),
                    date,
                    open: Self::parse_decimal(fields[1]),
                    high: Self::parse_decimal(fields[2]),
                    low: Self::parse_decimal(fields[3]),
                    close,
                    volume: Self::parse_decimal(fields[5]),
                    currency: currency.to_string(),
                    source: PROVIDER_ID.to_string(),
                })
            })
            .collect();

        if points.is_empty() {
            return Err(MarketDataError::NoDataForRange);
        }

        points.sort_by_key(|p| p.date);
        Ok(points)
    }
}

#[async_trait]
impl QuoteSource for AlphaVantageProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn daily_range(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, MarketDataError> {
        let points = self.fetch_daily_json(symbol).await?;

        let filtered: Vec<PricePoint> = points
            .into_iter()
            .filter(|p| p.date >= start && p.date <= end)
            .collect();

        if filtered.is_empty() {
            return Err(MarketDataError::NoDataForRange);
        }

        Ok(filtered)
    }

    async fn daily_window(
        &self,
        symbol: &str,
        _window: LookbackWindow,
    ) -> Result<Vec<PricePoint>, MarketDataError> {
        // The compact CSV is already a short lookback (about 100 sessions).
        self.fetch_daily_csv(symbol).await
    }

    async fn profile(&self, symbol: &str) -> Result<SecurityProfile, MarketDataError> {
        let params = [("function", "OVERVIEW"), ("symbol", symbol)];

        let text = self.fetch(&params).await?;
        let response: CompanyOverviewResponse =
            serde_json::from_str(&text).map_err(|e| MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("Failed to parse overview response: {}", e),
            })?;

        Self::check_api_error(
            &response.error_message,
            &response.note,
            &response.information,
        )?;

        if response.symbol.is_none() {
            return Err(MarketDataError::SymbolNotFound(symbol.to_string()));
        }

        Ok(response.to_profile())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            AlphaVantageProvider::parse_date("2024-01-15"),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert!(AlphaVantageProvider::parse_date("01-15-2024").is_none());
    }

    #[test]
    fn test_parse_decimal_rejects_negative() {
        assert_eq!(
            AlphaVantageProvider::parse_decimal("150.25"),
            Some(dec!(150.25))
        );
        assert_eq!(AlphaVantageProvider::parse_decimal("-1.5"), None);
        assert_eq!(AlphaVantageProvider::parse_decimal("garbage"), None);
    }

    #[test]
    fn test_check_api_error_classifies_rate_limit() {
        let result = AlphaVantageProvider::check_api_error(
            &None,
            &Some("Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute".to_string()),
            &None,
        );
        assert!(matches!(result, Err(MarketDataError::RateLimited { .. })));
    }

    #[test]
    fn test_check_api_error_classifies_invalid_call() {
        let result = AlphaVantageProvider::check_api_error(
            &Some("Invalid API call. Please retry or visit the documentation".to_string()),
            &None,
            &None,
        );
        assert!(matches!(result, Err(MarketDataError::SymbolNotFound(_))));
    }

    #[test]
    fn test_parse_csv_bars() {
        let body = "timestamp,open,high,low,close,volume\n\
                    2025-01-03,244.00,245.50,242.10,243.36,40244100\n\
                    2025-01-02,248.90,249.10,241.80,243.85,55740700\n";
        let points = AlphaVantageProvider::parse_csv("AAPL", body).unwrap();
        assert_eq!(points.len(), 2);
        // Sorted ascending by date.
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        assert_eq!(points[1].close, dec!(243.36));
        assert_eq!(points[0].currency, "USD");
        assert_eq!(points[0].source, "ALPHA_VANTAGE");
    }

    #[test]
    fn test_parse_csv_throttle_notice() {
        let body = "{\"Information\": \"You have hit your rate limit for the day\"}";
        let result = AlphaVantageProvider::parse_csv("AAPL", body);
        assert!(matches!(result, Err(MarketDataError::RateLimited { .. })));
    }

    #[test]
    fn test_parse_csv_suffix_currency() {
        let body = "timestamp,open,high,low,close,volume\n\
                    2025-01-02,55.10,55.90,54.80,55.45,1200300\n";
        let points = AlphaVantageProvider::parse_csv("ENB.TO", body).unwrap();
        assert_eq!(points[0].currency, "CAD");
    }

    #[test]
    fn test_overview_parsing_with_placeholder_values() {
        let json = r#"{
            "Symbol": "IBM",
            "Name": "International Business Machines",
            "Sector": "TECHNOLOGY",
            "Industry": "COMPUTER & OFFICE EQUIPMENT",
            "MarketCapitalization": "191234567890",
            "52WeekHigh": "199.18",
            "52WeekLow": "None"
        }"#;
        let response: CompanyOverviewResponse = serde_json::from_str(json).unwrap();
        let profile = response.to_profile();
        assert_eq!(profile.name.as_deref(), Some("International Business Machines"));
        assert_eq!(profile.market_cap, Some(191234567890.0));
        assert_eq!(profile.week_52_high, Some(199.18));
        assert_eq!(profile.week_52_low, None);
        assert_eq!(profile.source.as_deref(), Some("ALPHA_VANTAGE"));
    }
}
