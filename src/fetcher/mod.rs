pub mod http_client;
pub mod parsers;

use crate::config::ProviderConfig;
use crate::models::{DailySeries, OutputSize, TimeSeries};
use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use self::http_client::HttpClient;
use self::parsers::{normalise_symbol, parse_daily_response};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why a fetch produced no data. Every variant is terminal for the call.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error {0}")]
    Http(reqwest::StatusCode),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("response has no daily series ({0})")]
    MissingSeries(String),
}

impl FetchError {
    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Http(_) => "http",
            FetchError::Malformed(_) => "malformed",
            FetchError::Provider(_) => "provider",
            FetchError::RateLimited(_) => "rate_limited",
            FetchError::MissingSeries(_) => "missing_series",
        }
    }
}

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable data source abstraction.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_daily(&self, symbol: &str, size: OutputSize) -> Result<TimeSeries, FetchError>;
}

// ── Alpha Vantage ─────────────────────────────────────────────────────────────

pub struct AlphaVantageClient {
    client: HttpClient,
    base_url: Url,
    api_key: String,
}

impl AlphaVantageClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid provider base_url {:?}", config.base_url))?;

        Ok(Self {
            client: HttpClient::new(config)?,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// Query URL for TIME_SERIES_DAILY. Contains the API key; don't log it.
    fn daily_url(&self, symbol: &str, size: OutputSize) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("function", "TIME_SERIES_DAILY")
            .append_pair("symbol", symbol)
            .append_pair("apikey", &self.api_key)
            .append_pair("outputsize", size.as_str());
        url
    }

    /// Fetch the daily series together with the provider's metadata block.
    pub async fn fetch_series(&self, symbol: &str, size: OutputSize) -> Result<DailySeries, FetchError> {
        let symbol = normalise_symbol(symbol);
        info!("Fetching {} ({}) from Alpha Vantage", symbol, size);

        let body = self.client.get_text(self.daily_url(&symbol, size)).await?;
        debug!("{}: {} bytes", symbol, body.len());

        let parsed = parse_daily_response(&body)?;
        info!("Fetched {} days of data for {}", parsed.series.len(), symbol);
        Ok(parsed)
    }
}

#[async_trait]
impl MarketDataSource for AlphaVantageClient {
    async fn fetch_daily(&self, symbol: &str, size: OutputSize) -> Result<TimeSeries, FetchError> {
        Ok(self.fetch_series(symbol, size).await?.series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> AlphaVantageClient {
        let config = ProviderConfig {
            base_url: base_url.to_string(),
            api_key: "demo".to_string(),
            ..ProviderConfig::default()
        };
        AlphaVantageClient::new(&config).unwrap()
    }

    #[test]
    fn test_daily_url_carries_all_params() {
        let url = client("https://www.alphavantage.co/query").daily_url("IBM", OutputSize::Full);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("function".into(), "TIME_SERIES_DAILY".into()),
                ("symbol".into(), "IBM".into()),
                ("apikey".into(), "demo".into()),
                ("outputsize".into(), "full".into()),
            ]
        );
        assert_eq!(url.path(), "/query");
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let config = ProviderConfig {
            base_url: "not a url".to_string(),
            ..ProviderConfig::default()
        };
        assert!(AlphaVantageClient::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Port 9 on localhost: nothing listens, the connect is refused.
        let c = client("http://127.0.0.1:9/query");
        let err = c.fetch_daily("IBM", OutputSize::Compact).await.unwrap_err();
        assert_eq!(err.kind(), "network");
    }
}
