//! HTTP transports for quote requests: direct, through a relay, or an
//! ordered chain of both.

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const USER_AGENT: &str = concat!("stockwatch/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait Transport: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn get_json(&self, url: &str) -> Result<Value>;
}

fn build_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().user_agent(USER_AGENT).build()?)
}

async fn fetch_json(client: &reqwest::Client, url: &str) -> Result<Value> {
    debug!("Requesting {}", url);
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| anyhow!("Request error: {} for URL: {}", e, url))?;

    if !response.status().is_success() {
        bail!("HTTP error: {} for URL: {}", response.status(), url);
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| anyhow!("Failed to parse JSON from {}: {}", url, e))
}

pub struct DirectTransport {
    client: reqwest::Client,
}

impl DirectTransport {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client()?,
        })
    }
}

#[async_trait]
impl Transport for DirectTransport {
    fn name(&self) -> &str {
        "direct"
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        fetch_json(&self.client, url).await
    }
}

/// Forwards requests through a relay that takes the URL-encoded target
/// appended to its prefix.
pub struct RelayTransport {
    prefix: String,
    client: reqwest::Client,
}

impl RelayTransport {
    pub fn new(prefix: &str) -> Result<Self> {
        Ok(Self {
            prefix: prefix.to_string(),
            client: build_client()?,
        })
    }

    pub fn relay_url(&self, target: &str) -> String {
        format!("{}{}", self.prefix, urlencoding::encode(target))
    }
}

#[async_trait]
impl Transport for RelayTransport {
    fn name(&self) -> &str {
        &self.prefix
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        fetch_json(&self.client, &self.relay_url(url)).await
    }
}

/// Tries each source in order until one answers with JSON. Every call starts
/// again from the first source.
pub struct FallbackTransport {
    sources: Vec<Arc<dyn Transport>>,
    timeout: Duration,
}

impl FallbackTransport {
    pub fn new(sources: Vec<Arc<dyn Transport>>, timeout: Duration) -> Self {
        Self { sources, timeout }
    }

    /// Direct access first (when enabled), then each relay prefix in order.
    pub fn from_config(direct: bool, relays: &[String], timeout: Duration) -> Result<Self> {
        let mut sources: Vec<Arc<dyn Transport>> = Vec::new();
        if direct {
            sources.push(Arc::new(DirectTransport::new()?));
        }
        for prefix in relays {
            sources.push(Arc::new(RelayTransport::new(prefix)?));
        }
        Ok(Self::new(sources, timeout))
    }
}

#[async_trait]
impl Transport for FallbackTransport {
    fn name(&self) -> &str {
        "fallback"
    }

    #[instrument(name = "FallbackFetch", skip(self))]
    async fn get_json(&self, url: &str) -> Result<Value> {
        for source in &self.sources {
            match tokio::time::timeout(self.timeout, source.get_json(url)).await {
                Ok(Ok(value)) => {
                    debug!("Fetched through {}", source.name());
                    return Ok(value);
                }
                Ok(Err(e)) => warn!("Source {} failed: {:#}", source.name(), e),
                Err(_) => warn!(
                    "Source {} timed out after {:?}",
                    source.name(),
                    self.timeout
                ),
            }
        }
        bail!("All sources failed for URL: {}", url)
    }
}
