use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::OutputSize;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Market-data provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Postgres,
    Duckdb,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: Backend,

    #[serde(default)]
    pub host: String,

    #[serde(default = "default_db_name")]
    pub name: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Refuse to connect without TLS (Supabase requires it).
    #[serde(default = "default_true")]
    pub require_tls: bool,

    #[serde(default = "default_duckdb_path")]
    pub duckdb_path: PathBuf,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,

    #[serde(default)]
    pub output_size: OutputSize,

    #[serde(default = "default_recent_days")]
    pub recent_days: usize,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://www.alphavantage.co/query".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("stock-etl/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_db_name() -> String {
    "postgres".to_string()
}
fn default_port() -> u16 {
    5432
}
fn default_true() -> bool {
    true
}
fn default_duckdb_path() -> PathBuf {
    PathBuf::from("data/prices.duckdb")
}
fn default_symbol() -> String {
    "IBM".to_string()
}
fn default_recent_days() -> usize {
    5
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            host: String::new(),
            name: default_db_name(),
            user: String::new(),
            password: String::new(),
            port: default_port(),
            require_tls: true,
            duckdb_path: default_duckdb_path(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            output_size: OutputSize::default(),
            recent_days: default_recent_days(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

/// Conventional variable names honoured on top of the `STOCK_ETL__*` ones.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("ALPHA_VANTAGE_API_KEY", "provider.api_key"),
    ("SUPABASE_DB_HOST", "database.host"),
    ("SUPABASE_DB_NAME", "database.name"),
    ("SUPABASE_DB_USER", "database.user"),
    ("SUPABASE_DB_PASSWORD", "database.password"),
    ("SUPABASE_DB_PORT", "database.port"),
];

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::assemble(None)
    }

    /// Builds the layered config. `vars` stands in for the process
    /// environment when given.
    fn assemble(vars: Option<config::Map<String, String>>) -> Result<Self> {
        let lookup = |var: &str| match &vars {
            Some(vars) => vars.get(var).cloned(),
            None => std::env::var(var).ok(),
        };

        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("STOCK_ETL")
                    .separator("__")
                    .source(vars.clone()),
            );

        // A blank variable (as left by a copied .env.example) is unset.
        for (var, key) in LEGACY_ENV {
            let value = lookup(var).filter(|v| !v.trim().is_empty());
            builder = builder
                .set_override_option(*key, value)
                .with_context(|| format!("override {} from {}", key, var))?;
        }

        let app_cfg: AppConfig = builder
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(app_cfg)
    }

    pub fn validate_provider(&self) -> Result<()> {
        if self.provider.api_key.trim().is_empty() {
            bail!("API key not set (ALPHA_VANTAGE_API_KEY or STOCK_ETL__PROVIDER__API_KEY)");
        }
        Ok(())
    }

    pub fn validate_database(&self) -> Result<()> {
        if self.database.backend == Backend::Postgres {
            let db = &self.database;
            let missing: Vec<&str> = [("host", &db.host), ("name", &db.name), ("user", &db.user)]
                .into_iter()
                .filter(|(_, v)| v.trim().is_empty())
                .map(|(k, _)| k)
                .collect();
            if !missing.is_empty() {
                bail!("database.{} not set for postgres backend", missing.join(", database."));
            }
        }
        Ok(())
    }
}
