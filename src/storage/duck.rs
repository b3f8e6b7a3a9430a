use crate::models::{DailyPrice, Stock, TimeSeries};
use crate::storage::{PriceStore, REQUIRED_INDEX, StoreError, missing_objects};
use async_trait::async_trait;
use chrono::Utc;
use duckdb::{Connection, params};
use std::path::{Path, PathBuf};
use tracing::debug;

const SCHEMA_FILE: &str = "sql/duckdb/schema.sql";

/// DuckDB file backend.
pub struct DuckStore {
    path: PathBuf,
}

impl DuckStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        debug!("Opening DuckDB at {:?}", self.path);
        Ok(Connection::open(&self.path)?)
    }

    fn verify_schema_sync(&self) -> Result<(), StoreError> {
        // Opening a missing file would create an empty database.
        if !self.path.exists() {
            return Err(StoreError::SchemaMissing {
                missing: missing_objects(&[], false),
                schema_file: SCHEMA_FILE,
            });
        }

        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT table_name FROM information_schema.tables
             WHERE table_schema = current_schema() AND table_name IN ('stocks', 'daily_prices')",
        )?;
        let tables = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let indexes: i64 = conn.query_row(
            "SELECT COUNT(*) FROM duckdb_indexes() WHERE index_name = ?",
            params![REQUIRED_INDEX],
            |r| r.get(0),
        )?;

        let missing = missing_objects(&tables, indexes > 0);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StoreError::SchemaMissing { missing, schema_file: SCHEMA_FILE })
        }
    }

    fn upsert_sync(&self, symbol: &str, series: &TimeSeries) -> Result<usize, StoreError> {
        let mut conn = self.connect()?;
        // Dropping `tx` without commit rolls the whole batch back.
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO stocks (symbol, last_updated) VALUES (?, ?)
             ON CONFLICT (symbol) DO UPDATE SET last_updated = excluded.last_updated",
            params![symbol, Utc::now().naive_utc()],
        )?;

        let count_sql = "SELECT COUNT(*) FROM daily_prices WHERE symbol = ?";
        let before: i64 = tx.query_row(count_sql, params![symbol], |r| r.get(0))?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO daily_prices (symbol, date, open, high, low, close, volume)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (symbol, date) DO NOTHING",
            )?;
            for (date, bar) in series {
                stmt.execute(params![
                    symbol, date,
                    bar.open, bar.high, bar.low, bar.close,
                    bar.volume,
                ])?;
            }
        }

        // Rows this batch actually added; conflicts are skipped silently.
        let after: i64 = tx.query_row(count_sql, params![symbol], |r| r.get(0))?;
        tx.commit()?;

        Ok((after - before).max(0) as usize)
    }

    fn recent_sync(&self, symbol: &str, limit: usize) -> Result<Vec<DailyPrice>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT symbol, date,
                    CAST(open AS DOUBLE), CAST(high AS DOUBLE),
                    CAST(low AS DOUBLE), CAST(close AS DOUBLE),
                    volume
             FROM daily_prices
             WHERE symbol = ?
             ORDER BY date DESC
             LIMIT ?",
        )?;
        let rows = stmt
            .query_map(params![symbol, limit as i64], |r| {
                Ok(DailyPrice {
                    symbol: r.get(0)?,
                    date: r.get(1)?,
                    open: r.get(2)?,
                    high: r.get(3)?,
                    low: r.get(4)?,
                    close: r.get(5)?,
                    volume: r.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_symbols_sync(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT symbol FROM stocks ORDER BY symbol")?;
        let syms = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(syms)
    }

    fn stock_sync(&self, symbol: &str) -> Result<Option<Stock>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT symbol, last_updated FROM stocks WHERE symbol = ?")?;
        let mut rows = stmt.query_map(params![symbol], |r| {
            Ok(Stock { symbol: r.get(0)?, last_updated: r.get(1)? })
        })?;
        Ok(rows.next().transpose()?)
    }

    fn price_count_sync(&self, symbol: &str) -> Result<i64, StoreError> {
        let conn = self.connect()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM daily_prices WHERE symbol = ?",
            params![symbol],
            |r| r.get(0),
        )?)
    }
}

#[async_trait]
impl PriceStore for DuckStore {
    async fn verify_schema(&self) -> Result<(), StoreError> {
        self.verify_schema_sync()
    }

    async fn upsert_prices(&self, symbol: &str, series: &TimeSeries) -> Result<usize, StoreError> {
        self.upsert_sync(symbol, series)
    }

    async fn recent_prices(&self, symbol: &str, limit: usize) -> Result<Vec<DailyPrice>, StoreError> {
        self.recent_sync(symbol, limit)
    }

    async fn list_symbols(&self) -> Result<Vec<String>, StoreError> {
        self.list_symbols_sync()
    }

    async fn stock(&self, symbol: &str) -> Result<Option<Stock>, StoreError> {
        self.stock_sync(symbol)
    }

    async fn price_count(&self, symbol: &str) -> Result<i64, StoreError> {
        self.price_count_sync(symbol)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
