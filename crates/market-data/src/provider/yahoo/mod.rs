//! Yahoo Finance quote source.
//!
//! Primary price source. Three call shapes around the same chart API:
//! an exact date range, a coarse "3mo" relative range, and a minimal "5d"
//! range, plus the authenticated quoteSummary endpoint for profiles.

mod models;

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use lazy_static::lazy_static;
use num_traits::FromPrimitive;
use reqwest::header;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{debug, warn};
use urlencoding::encode;
use yahoo_finance_api as yahoo;

use crate::errors::MarketDataError;
use crate::models::{decimal_from_f64, PricePoint, SecurityProfile};
use crate::provider::{LookbackWindow, QuoteSource};
use crate::resolver::canadian_suffix;

use models::YahooQuoteSummaryResponse;

const PROVIDER_ID: &str = "YAHOO";

/// Cached Yahoo authentication data for the quoteSummary endpoint.
#[derive(Debug, Clone)]
struct CrumbData {
    cookie: String,
    crumb: String,
}

lazy_static! {
    static ref YAHOO_CRUMB: RwLock<Option<CrumbData>> = RwLock::default();
}

/// Yahoo Finance quote source.
pub struct YahooProvider {
    connector: yahoo::YahooConnector,
}

impl YahooProvider {
    pub fn new() -> Result<Self, MarketDataError> {
        let connector = yahoo::YahooConnector::new().map_err(|e| MarketDataError::ProviderError {
            provider: PROVIDER_ID.to_string(),
            message: format!("Failed to initialize Yahoo connector: {}", e),
        })?;
        Ok(Self { connector })
    }

    /// Native currency of the market the provider symbol trades on.
    fn currency_for(symbol: &str) -> &'static str {
        if canadian_suffix(symbol).is_some() {
            "CAD"
        } else {
            "USD"
        }
    }

    fn map_error(symbol: &str, error: yahoo::YahooError) -> MarketDataError {
        if matches!(
            error,
            yahoo::YahooError::NoQuotes | yahoo::YahooError::NoResult
        ) {
            MarketDataError::SymbolNotFound(symbol.to_string())
        } else {
            MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: error.to_string(),
            }
        }
    }

    /// Convert one Yahoo bar into a [`PricePoint`].
    fn quote_to_point(
        symbol: &str,
        quote: yahoo::Quote,
        currency: &str,
    ) -> Result<PricePoint, MarketDataError> {
        let timestamp = Utc
            .timestamp_opt(quote.timestamp as i64, 0)
            .single()
            .ok_or_else(|| MarketDataError::ValidationFailed {
                message: format!("Invalid timestamp: {}", quote.timestamp),
            })?;

        let close =
            decimal_from_f64(quote.close).ok_or_else(|| MarketDataError::ValidationFailed {
                message: format!("Unusable close price {} for {}", quote.close, symbol),
            })?;

        Ok(PricePoint {
            symbol: symbol.to_string(),
            date: timestamp.date_naive(),
            open: decimal_from_f64(quote.open),
            high: decimal_from_f64(quote.high),
            low: decimal_from_f64(quote.low),
            close,
            volume: Decimal::from_u64(quote.volume),
            currency: currency.to_string(),
            source: PROVIDER_ID.to_string(),
        })
    }

    fn collect_points(
        symbol: &str,
        response: yahoo::YResponse,
    ) -> Result<Vec<PricePoint>, MarketDataError> {
        let currency = Self::currency_for(symbol);

        let quotes = response.quotes().map_err(|e| Self::map_error(symbol, e))?;
        let mut points: Vec<PricePoint> = quotes
            .into_iter()
            .filter_map(|q| match Self::quote_to_point(symbol, q, currency) {
                Ok(point) => Some(point),
                Err(e) => {
                    warn!("Skipping bar for {}: {}", symbol, e);
                    None
                }
            })
            .collect();

        if points.is_empty() {
            return Err(MarketDataError::NoDataForRange);
        }

        points.sort_by_key(|p| p.date);
        points.dedup_by_key(|p| p.date);
        Ok(points)
    }

    fn date_to_offset(date: NaiveDate, end_of_day: bool) -> OffsetDateTime {
        let (h, m, s) = if end_of_day { (23, 59, 59) } else { (0, 0, 0) };
        let timestamp = date
            .and_hms_opt(h, m, s)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default();
        OffsetDateTime::from_unix_timestamp(timestamp).unwrap_or_else(|_| OffsetDateTime::now_utc())
    }

    // ========================================================================
    // Crumb/Cookie Authentication
    // ========================================================================

    async fn ensure_crumb(&self) -> Result<CrumbData, MarketDataError> {
        {
            let guard = YAHOO_CRUMB.read().unwrap();
            if let Some(crumb) = guard.as_ref() {
                return Ok(crumb.clone());
            }
        }

        self.fetch_crumb().await
    }

    async fn fetch_crumb(&self) -> Result<CrumbData, MarketDataError> {
        let client = reqwest::Client::new();

        let response = client.get("https://fc.yahoo.com").send().await.map_err(|e| {
            MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("Failed to get cookie: {}", e),
            }
        })?;

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split_once(';').map(|(v, _)| v.to_string()))
            .ok_or_else(|| MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: "Failed to parse Yahoo cookie".to_string(),
            })?;

        let crumb = client
            .get("https://query1.finance.yahoo.com/v1/test/getcrumb")
            .header(
                header::USER_AGENT,
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
            )
            .header(header::COOKIE, &cookie)
            .send()
            .await
            .map_err(|e| MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("Failed to get crumb: {}", e),
            })?
            .text()
            .await
            .map_err(|e| MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("Failed to read crumb: {}", e),
            })?;

        let crumb_data = CrumbData { cookie, crumb };

        let mut guard = YAHOO_CRUMB.write().unwrap();
        *guard = Some(crumb_data.clone());

        Ok(crumb_data)
    }

    fn clear_crumb(&self) {
        let mut guard = YAHOO_CRUMB.write().unwrap();
        *guard = None;
    }
}

#[async_trait]
impl QuoteSource for YahooProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn daily_range(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, MarketDataError> {
        debug!("Yahoo range fetch for {} ({} to {})", symbol, start, end);

        let response = self
            .connector
            .get_quote_history(
                symbol,
                Self::date_to_offset(start, false),
                Self::date_to_offset(end, true),
            )
            .await
            .map_err(|e| Self::map_error(symbol, e))?;

        Self::collect_points(symbol, response)
    }

    async fn daily_window(
        &self,
        symbol: &str,
        window: LookbackWindow,
    ) -> Result<Vec<PricePoint>, MarketDataError> {
        let range = match window {
            LookbackWindow::Quarter => "3mo",
            LookbackWindow::Week => "5d",
        };
        debug!("Yahoo window fetch for {} ({})", symbol, range);

        let response = self
            .connector
            .get_quote_range(symbol, "1d", range)
            .await
            .map_err(|e| Self::map_error(symbol, e))?;

        Self::collect_points(symbol, response)
    }

    async fn profile(&self, symbol: &str) -> Result<SecurityProfile, MarketDataError> {
        let crumb = self.ensure_crumb().await?;

        let url = format!(
            "https://query1.finance.yahoo.com/v10/finance/quoteSummary/{}?modules=price,summaryProfile,summaryDetail&crumb={}",
            encode(symbol),
            encode(&crumb.crumb)
        );

        let client = reqwest::Client::new();
        let response = client
            .get(&url)
            .header(
                header::USER_AGENT,
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
            )
            .header(header::COOKIE, &crumb.cookie)
            .send()
            .await
            .map_err(|e| MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("Profile request failed: {}", e),
            })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            self.clear_crumb();
            return Err(MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: "Yahoo authentication expired".to_string(),
            });
        }

        let data: YahooQuoteSummaryResponse =
            response
                .json()
                .await
                .map_err(|e| MarketDataError::ProviderError {
                    provider: PROVIDER_ID.to_string(),
                    message: format!("Failed to parse profile response: {}", e),
                })?;

        let result = data
            .quote_summary
            .result
            .into_iter()
            .next()
            .ok_or_else(|| MarketDataError::SymbolNotFound(symbol.to_string()))?;

        let price = result.price.as_ref();
        let summary = result.summary_profile.as_ref();
        let detail = result.summary_detail.as_ref();

        Ok(SecurityProfile {
            name: price.and_then(|p| p.long_name.clone().or_else(|| p.short_name.clone())),
            sector: summary.and_then(|s| s.sector.clone()),
            industry: summary.and_then(|s| s.industry.clone()),
            market_cap: detail.and_then(|d| d.market_cap.as_ref()).and_then(|v| v.raw),
            week_52_high: detail
                .and_then(|d| d.fifty_two_week_high.as_ref())
                .and_then(|v| v.raw),
            week_52_low: detail
                .and_then(|d| d.fifty_two_week_low.as_ref())
                .and_then(|v| v.raw),
            source: Some(PROVIDER_ID.to_string()),
        })
    }
}
