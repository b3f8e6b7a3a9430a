//! Price storage: one trait, two backends.
//!
//! The schema is provisioned outside the application (see `sql/`). Stores
//! only check that it is there and fail fast with [`StoreError::SchemaMissing`]
//! when it is not.
//!
//! Every operation opens its own connection and closes it before returning.

pub mod duck;
pub mod postgres;

use crate::models::{DailyPrice, Stock, TimeSeries};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info};

pub use self::duck::DuckStore;
pub use self::postgres::PgStore;

pub const REQUIRED_TABLES: [&str; 2] = ["stocks", "daily_prices"];
pub const REQUIRED_INDEX: &str = "idx_daily_prices_symbol_date";

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("schema missing: {} (apply {schema_file} first)", .missing.join(", "))]
    SchemaMissing {
        missing: Vec<String>,
        schema_file: &'static str,
    },

    #[error("postgres: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("duckdb: {0}")]
    DuckDb(#[from] duckdb::Error),
}

/// Required objects not present among `tables` / `index_present`.
pub(crate) fn missing_objects(tables: &[String], index_present: bool) -> Vec<String> {
    let mut missing: Vec<String> = REQUIRED_TABLES
        .iter()
        .filter(|t| !tables.iter().any(|found| found == *t))
        .map(|t| format!("table {}", t))
        .collect();
    if !index_present {
        missing.push(format!("index {}", REQUIRED_INDEX));
    }
    missing
}

// ── Store trait ───────────────────────────────────────────────────────────────

#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Fails with `SchemaMissing` unless both tables and the (symbol, date) index exist.
    async fn verify_schema(&self) -> Result<(), StoreError>;

    /// In one transaction: refresh `stocks.last_updated`, then insert every
    /// bar whose (symbol, date) is new. Existing price rows are left alone.
    /// Returns the number of rows inserted. On error nothing is kept.
    async fn upsert_prices(&self, symbol: &str, series: &TimeSeries) -> Result<usize, StoreError>;

    /// The `limit` most recent rows, newest first.
    async fn recent_prices(&self, symbol: &str, limit: usize) -> Result<Vec<DailyPrice>, StoreError>;

    /// Known symbols, ascending.
    async fn list_symbols(&self) -> Result<Vec<String>, StoreError>;

    async fn stock(&self, symbol: &str) -> Result<Option<Stock>, StoreError>;

    async fn price_count(&self, symbol: &str) -> Result<i64, StoreError>;

    /// `upsert_prices` for callers that only want a count: a failed
    /// (rolled back) batch is logged and reported as 0 saved.
    async fn save_prices(&self, symbol: &str, series: &TimeSeries) -> usize {
        match self.upsert_prices(symbol, series).await {
            Ok(n) => {
                info!("Saved {} new records for {} ({} fetched)", n, symbol, series.len());
                n
            }
            Err(e) => {
                error!("Error saving {}, batch rolled back: {}", symbol, e);
                0
            }
        }
    }
}
