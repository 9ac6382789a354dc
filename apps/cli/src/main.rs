mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use config::Config;
use fundsnap_core::fx::FxService;
use fundsnap_core::job::{JobOutcome, RunSummary, ValuationJob};
use fundsnap_market_data::{AlphaVantageProvider, PriceFetcher, QuoteSource, YahooProvider};
use fundsnap_storage_sqlite::{
    SqliteFxRepository, SqliteSecurityRepository, SqliteSnapshotRepository,
    SqliteTradeLedgerRepository,
};

#[derive(Parser)]
#[command(author, version, about = "Fund snapshot valuation pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Value every fund as of the most recent trading day
    Update,
    /// Rebuild snapshots for every day in a date range (inclusive)
    Backfill {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env();
    let job = build_job(&config)?;

    let outcome = match cli.command {
        Command::Update => job.update_latest(Utc::now().date_naive()).await?,
        Command::Backfill { start, end } => job.backfill(start, end).await?,
    };

    match outcome {
        JobOutcome::Skipped => {
            println!("Skipped: another run holds the lock");
            Ok(())
        }
        JobOutcome::Completed(summary) => {
            report(&summary);
            Ok(())
        }
    }
}

fn build_job(config: &Config) -> Result<ValuationJob> {
    let handle = fundsnap_storage_sqlite::init(&config.db_path)
        .with_context(|| format!("opening database at {}", config.db_path.display()))?;

    let primary: Arc<dyn QuoteSource> = Arc::new(YahooProvider::new()?);
    let secondary: Option<Arc<dyn QuoteSource>> = config
        .alpha_vantage_api_key
        .clone()
        .map(|key| Arc::new(AlphaVantageProvider::new(key)) as Arc<dyn QuoteSource>);
    if secondary.is_none() {
        tracing::warn!("ALPHAVANTAGE_API_KEY not set; running without the fallback source");
    }
    let fetcher = Arc::new(PriceFetcher::new(primary, secondary));

    let fx = FxService::new(Arc::new(SqliteFxRepository::new(handle.clone())));

    Ok(ValuationJob::new(
        Arc::new(SqliteTradeLedgerRepository::new(handle.clone())),
        Arc::new(SqliteSecurityRepository::new(handle.clone())),
        fx,
        fetcher,
        Arc::new(SqliteSnapshotRepository::new(handle)),
    )
    .with_base_currency(&config.base_currency))
}

/// Partial success exits zero with the warning count on stdout; only an
/// unrecoverable error (propagated as `Err` from main) exits non-zero.
fn report(summary: &RunSummary) {
    println!("{}", summary.summary_line());
    let warnings = summary.tickers_failed
        + summary.funds_partial
        + summary.funds_skipped
        + summary.pending_retries.len();
    if warnings > 0 {
        println!("{warnings} warnings; see the log for details");
    }
}

fn init_tracing() {
    let log_format = std::env::var("FUNDSNAP_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}
