//! reqwest implementation of the fetch collaborators.

use crate::error::{NetError, NetResult};
use crate::fetch::{FetchedMedia, JsonFetcher, MediaFetcher};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Timeout for JSON requests (ms). Media requests use the tier policy.
    pub json_timeout_ms: u64,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            json_timeout_ms: 30_000,
            user_agent: concat!("murmur-core/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// HTTP client for media and feed requests.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpConfig,
}

impl HttpClient {
    /// Builds a client.
    pub fn new(config: HttpConfig) -> NetResult<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| NetError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn get(&self, url: &str, timeout: Duration) -> NetResult<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            debug!("GET {} -> {}", url, status);
            return Err(NetError::Http {
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl MediaFetcher for HttpClient {
    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> NetResult<FetchedMedia> {
        let response = self.get(url, timeout).await?;
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty());
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        Ok(FetchedMedia {
            bytes: bytes.to_vec(),
            mime_type,
        })
    }
}

#[async_trait]
impl JsonFetcher for HttpClient {
    async fn fetch_json(&self, url: &str) -> NetResult<serde_json::Value> {
        let timeout = Duration::from_millis(self.config.json_timeout_ms);
        let response = self.get(url, timeout).await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| NetError::Decode(e.to_string()))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> NetError {
    if e.is_timeout() {
        NetError::Timeout
    } else if let Some(status) = e.status() {
        NetError::Http {
            status: status.as_u16(),
        }
    } else {
        NetError::Transport(e.to_string())
    }
}
