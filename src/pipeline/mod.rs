//! Pipeline orchestrator: ties fetcher → storage together.
//!
//! One symbol per run, strictly in order:
//!   1. verify the externally provisioned schema (fatal if absent)
//!   2. fetch the daily series
//!   3. no data → report the classified failure and stop
//!   4. upsert (insert-or-ignore prices, refresh the stock timestamp)
//!   5. read back the most recent rows for the report
//!
//! Re-running over the same window inserts 0 new rows.

use crate::fetcher::{FetchError, MarketDataSource};
use crate::fetcher::parsers::normalise_symbol;
use crate::models::{DailyPrice, OutputSize};
use crate::storage::{PriceStore, StoreError};
use crate::utils;
use tracing::{info, warn};

pub struct Pipeline<F, S> {
    source: F,
    store: S,
    recent_days: usize,
}

/// What a single run produced.
#[derive(Debug)]
pub enum RunOutcome {
    Stored(RunReport),
    NoData { symbol: String, reason: FetchError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub symbol: String,
    pub fetched: usize,
    pub inserted: usize,
    pub total_rows: Option<i64>,
    pub recent: Vec<DailyPrice>,
}

impl RunOutcome {
    pub fn has_data(&self) -> bool {
        matches!(self, RunOutcome::Stored(_))
    }
}

impl<F: MarketDataSource, S: PriceStore> Pipeline<F, S> {
    pub fn new(source: F, store: S, recent_days: usize) -> Self {
        Self { source, store, recent_days }
    }

    /// Runs the pipeline. Only a missing schema is an error here; fetch and
    /// storage failures are folded into the outcome.
    pub async fn run(&self, symbol: &str, size: OutputSize) -> Result<RunOutcome, StoreError> {
        let symbol = normalise_symbol(symbol);

        self.store.verify_schema().await?;
        info!("Schema verified");

        let series = match self.source.fetch_daily(&symbol, size).await {
            Ok(series) => series,
            Err(reason) => {
                warn!(kind = reason.kind(), "{}: no data: {}", symbol, reason);
                return Ok(RunOutcome::NoData { symbol, reason });
            }
        };

        let inserted = self.store.save_prices(&symbol, &series).await;

        let recent = self
            .store
            .recent_prices(&symbol, self.recent_days)
            .await
            .unwrap_or_else(|e| {
                warn!("{}: could not read back recent prices: {}", symbol, e);
                Vec::new()
            });
        let total_rows = self.store.price_count(&symbol).await.ok();

        Ok(RunOutcome::Stored(RunReport {
            symbol,
            fetched: series.len(),
            inserted,
            total_rows,
            recent,
        }))
    }
}

// ── Report ────────────────────────────────────────────────────────────────────

const RULE: &str = "==================================================";

pub fn print_banner() {
    println!("{}", RULE);
    println!("FETCH AND STORE STOCK DATA");
    println!("{}", RULE);
}

pub fn render_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Stored(report) => {
            let mut out = format!(
                "Fetched {} days for {}, saved {} new records",
                report.fetched, report.symbol, report.inserted
            );
            if let Some(total) = report.total_rows {
                out.push_str(&format!(" ({} stored)", utils::fmt_number(total)));
            }
            out.push_str(&format!("\n\nMost recent {} days for {}:\n", report.recent.len(), report.symbol));
            out.push_str(&render_prices(&report.recent));
            out.push_str(&format!("\n{}\n✓ SUCCESS!\n{}", RULE, RULE));
            out
        }
        RunOutcome::NoData { symbol, reason } => {
            format!("✗ Failed to fetch data for {} ({}: {})", symbol, reason.kind(), reason)
        }
    }
}

pub fn render_prices(prices: &[DailyPrice]) -> String {
    prices
        .iter()
        .map(|p| format!("  {}: ${:.2} (Vol: {})\n", p.date, p.close, utils::fmt_number(p.volume)))
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeSeries;
    use crate::storage::DuckStore;
    use crate::storage::duck::tests::{bar, day, price, provisioned_store};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Reply {
        Series(TimeSeries),
        Provider,
        RateLimited,
    }

    struct StubSource {
        reply: Reply,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn new(reply: Reply) -> Self {
            Self { reply, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl MarketDataSource for StubSource {
        async fn fetch_daily(&self, _symbol: &str, _size: OutputSize) -> Result<TimeSeries, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Reply::Series(s) => Ok(s.clone()),
                Reply::Provider => Err(FetchError::Provider("Invalid API call".into())),
                Reply::RateLimited => Err(FetchError::RateLimited("5 calls per minute".into())),
            }
        }
    }

    fn week() -> TimeSeries {
        (2..=6).map(|d| (day(2024, 1, d), bar(100.0 + d as f64, 1000 * d as i64))).collect()
    }

    #[tokio::test]
    async fn test_run_stores_and_reads_back() {
        let (_dir, store) = provisioned_store();
        let pipeline = Pipeline::new(StubSource::new(Reply::Series(week())), store, 3);

        let outcome = pipeline.run("ibm", OutputSize::Compact).await.unwrap();
        let RunOutcome::Stored(report) = outcome else {
            panic!("expected data");
        };
        assert_eq!(report.symbol, "IBM");
        assert_eq!(report.fetched, 5);
        assert_eq!(report.inserted, 5);
        assert_eq!(report.total_rows, Some(5));
        let dates: Vec<_> = report.recent.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![day(2024, 1, 6), day(2024, 1, 5), day(2024, 1, 4)]);
    }

    #[tokio::test]
    async fn test_second_run_inserts_nothing() {
        let (_dir, store) = provisioned_store();
        let pipeline = Pipeline::new(StubSource::new(Reply::Series(week())), store, 5);

        pipeline.run("IBM", OutputSize::Compact).await.unwrap();
        let RunOutcome::Stored(report) = pipeline.run("IBM", OutputSize::Compact).await.unwrap() else {
            panic!("expected data");
        };
        assert_eq!(report.inserted, 0);
        assert_eq!(report.total_rows, Some(5));
    }

    #[tokio::test]
    async fn test_provider_error_writes_nothing() {
        let (_dir, store) = provisioned_store();
        let pipeline = Pipeline::new(StubSource::new(Reply::Provider), store, 5);

        let outcome = pipeline.run("IBM", OutputSize::Compact).await.unwrap();
        assert!(!outcome.has_data());
        assert!(matches!(outcome, RunOutcome::NoData { reason: FetchError::Provider(_), .. }));
        assert!(pipeline.store.list_symbols().await.unwrap().is_empty());
        assert_eq!(pipeline.store.price_count("IBM").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_writes_nothing() {
        let (_dir, store) = provisioned_store();
        let pipeline = Pipeline::new(StubSource::new(Reply::RateLimited), store, 5);

        let outcome = pipeline.run("IBM", OutputSize::Full).await.unwrap();
        assert!(matches!(outcome, RunOutcome::NoData { reason: FetchError::RateLimited(_), .. }));
        assert!(pipeline.store.stock("IBM").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_schema_aborts_before_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let store = DuckStore::new(dir.path().join("unprovisioned.duckdb"));
        let pipeline = Pipeline::new(StubSource::new(Reply::Series(week())), store, 5);

        let err = pipeline.run("IBM", OutputSize::Compact).await.unwrap_err();
        assert!(matches!(err, StoreError::SchemaMissing { .. }));
        assert_eq!(pipeline.source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_render_prices() {
        let p = price("IBM", day(2024, 1, 2), &bar(100.5, 1_000_000));
        assert_eq!(render_prices(&[p]), "  2024-01-02: $100.50 (Vol: 1,000,000)\n");
    }

    #[test]
    fn test_render_no_data() {
        let outcome = RunOutcome::NoData {
            symbol: "IBM".into(),
            reason: FetchError::RateLimited("try later".into()),
        };
        assert_eq!(
            render_outcome(&outcome),
            "✗ Failed to fetch data for IBM (rate_limited: rate limited: try later)"
        );
    }
}
