//! Outbound HTTP seam.
//!
//! The fetcher talks to the publisher only through [`HttpSource`], so
//! discovery and retry behavior can be exercised against in-process fakes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use crate::config::FetchConfig;
use crate::error::FetchError;

/// A binary response body plus the declared content type.
#[derive(Debug, Clone)]
pub struct HttpPayload {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Minimal GET-only HTTP client.
///
/// Any network failure or non-2xx status is reported as
/// [`FetchError::Transport`].
#[async_trait]
pub trait HttpSource: Send + Sync {
    /// Fetch an HTML page as text.
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;

    /// Fetch a binary payload (archive download).
    async fn get_bytes(&self, url: &str) -> Result<HttpPayload, FetchError>;
}

/// [`HttpSource`] backed by `reqwest` with a desktop-browser user agent
/// and a fixed per-request timeout.
pub struct ReqwestSource {
    client: reqwest::Client,
}

impl ReqwestSource {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str, accept: &str) -> Result<reqwest::Response, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };
        let response = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Transport {
                url: url.to_string(),
                message: format!("HTTP {}", status),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl HttpSource for ReqwestSource {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .get(url, "text/html,application/xhtml+xml,*/*;q=0.8")
            .await?;
        response.text().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn get_bytes(&self, url: &str) -> Result<HttpPayload, FetchError> {
        let response = self.get(url, "application/zip").await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(HttpPayload {
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}
