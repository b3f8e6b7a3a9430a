mod config;
mod fetcher;
mod models;
mod pipeline;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{AppConfig, Backend};
use crate::fetcher::AlphaVantageClient;
use crate::models::OutputSize;
use crate::pipeline::Pipeline;
use crate::storage::{DuckStore, PgStore, PriceStore};

#[derive(Parser)]
#[command(name = "stock-etl", about = "Daily stock price ETL: Alpha Vantage → Postgres / DuckDB", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Ticker symbol (default: pipeline.symbol from config)
    #[arg(short, long, global = true)]
    symbol: Option<String>,

    /// compact (~100 days) or full (20+ years)
    #[arg(long, value_enum, global = true)]
    output_size: Option<OutputSize>,

    /// Storage backend (default: database.backend from config)
    #[arg(long, value_enum, global = true)]
    backend: Option<Backend>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, store and report one symbol (the default)
    Run,

    /// Show the most recent stored prices for the symbol
    Recent {
        /// Number of days (default: pipeline.recent_days)
        #[arg(short, long)]
        days: Option<usize>,
    },

    /// List all stored ticker symbols
    Symbols,

    /// Call the provider and print what it returns; nothing is stored
    Probe,
}

/// Commands that need the database.
enum StoreTask {
    Run,
    Recent { days: Option<usize> },
    Symbols,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "stock_etl=info,warn",
        1 => "stock_etl=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load()?;
    if let Some(symbol) = cli.symbol {
        config.pipeline.symbol = symbol;
    }
    if let Some(size) = cli.output_size {
        config.pipeline.output_size = size;
    }
    if let Some(backend) = cli.backend {
        config.database.backend = backend;
    }

    let task = match cli.command.unwrap_or(Command::Run) {
        Command::Probe => {
            config.validate_provider()?;
            return probe(&config).await;
        }
        Command::Run => StoreTask::Run,
        Command::Recent { days } => StoreTask::Recent { days },
        Command::Symbols => StoreTask::Symbols,
    };

    config.validate_database()?;
    match config.database.backend {
        Backend::Postgres => execute(task, PgStore::new(&config.database), &config).await,
        Backend::Duckdb => {
            let store = DuckStore::new(&config.database.duckdb_path);
            info!("Using DuckDB at {:?}", store.path());
            execute(task, store, &config).await
        }
    }
}

async fn execute<S: PriceStore>(task: StoreTask, store: S, config: &AppConfig) -> Result<ExitCode> {
    let symbol = fetcher::parsers::normalise_symbol(&config.pipeline.symbol);

    match task {
        StoreTask::Run => {
            config.validate_provider()?;
            let _t = utils::Timer::start("Fetch and store");

            pipeline::print_banner();
            let source = AlphaVantageClient::new(&config.provider)?;
            let outcome = Pipeline::new(source, store, config.pipeline.recent_days)
                .run(&symbol, config.pipeline.output_size)
                .await
                .context("Schema check failed")?;

            println!("{}", pipeline::render_outcome(&outcome));
            Ok(if outcome.has_data() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }

        StoreTask::Recent { days } => {
            store.verify_schema().await.context("Schema check failed")?;
            let days = days.unwrap_or(config.pipeline.recent_days);
            let prices = store.recent_prices(&symbol, days).await?;
            if prices.is_empty() {
                println!("No prices stored for {} — run `stock-etl run -s {}` first.", symbol, symbol);
            } else {
                println!("Most recent {} days for {}:", prices.len(), symbol);
                print!("{}", pipeline::render_prices(&prices));
            }
            Ok(ExitCode::SUCCESS)
        }

        StoreTask::Symbols => {
            store.verify_schema().await.context("Schema check failed")?;
            let syms = store.list_symbols().await?;
            if syms.is_empty() {
                println!("No symbols — run `stock-etl run` first.");
            } else {
                println!("{} symbols:", syms.len());
                for s in &syms {
                    let updated = store
                        .stock(s)
                        .await?
                        .map(|st| st.last_updated.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "—".into());
                    let rows = store.price_count(s).await?;
                    println!("  {:<8} {:>8} rows  updated {}", s, utils::fmt_number(rows), updated);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Fetch once and print the metadata and latest sessions without storing.
async fn probe(config: &AppConfig) -> Result<ExitCode> {
    let symbol = fetcher::parsers::normalise_symbol(&config.pipeline.symbol);
    let client = AlphaVantageClient::new(&config.provider)?;

    info!("Probing provider for {}", symbol);
    let parsed = match client.fetch_series(&symbol, config.pipeline.output_size).await {
        Ok(parsed) => parsed,
        Err(e) => {
            println!("✗ {} ({})", e, e.kind());
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("✓ Successfully fetched data!");
    if let Some(meta) = &parsed.meta {
        println!("\nMetadata:\n{}", serde_json::to_string_pretty(meta)?);
    }

    println!("\nMost recent 5 days of data:");
    for (date, bar) in parsed.series.iter().rev().take(5) {
        println!("\n{}:", date);
        println!("  Open:   ${:.4}", bar.open);
        println!("  High:   ${:.4}", bar.high);
        println!("  Low:    ${:.4}", bar.low);
        println!("  Close:  ${:.4}", bar.close);
        println!("  Volume: {}", utils::fmt_number(bar.volume));
    }
    Ok(ExitCode::SUCCESS)
}
