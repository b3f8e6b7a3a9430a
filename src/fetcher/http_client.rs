use crate::config::ProviderConfig;
use crate::fetcher::FetchError;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { inner })
    }

    /// Fetch a URL as text. One attempt: transport failures and non-2xx
    /// statuses are returned to the caller as-is.
    pub async fn get_text(&self, url: Url) -> Result<String, FetchError> {
        debug!("GET {}{}", url.origin().ascii_serialization(), url.path());

        let resp = self.inner.get(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Http(status));
        }

        Ok(resp.text().await?)
    }
}
