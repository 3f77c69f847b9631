//! Gateway forwarding: POST a payload to `/connections/{target}/_send`.
//!
//! Forwarding is best-effort. Callers get a [`ForwardError`] so they can log it,
//! but nothing here retries or inspects the gateway's response body.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("forward request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("gateway returned {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid gateway url: {0}")]
    Url(String),
}

/// Delivers a payload to a connection. Implemented by [`GatewayClient`]; tests plug in fakes.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, target: &str, body: &str) -> Result<(), ForwardError>;
}

/// HTTP client for the routing gateway.
#[derive(Clone)]
pub struct GatewayClient {
    base_url: Url,
    client: reqwest::Client,
}

impl GatewayClient {
    /// `base_url` is scheme + authority, e.g. `http://gateway:8080`. Every call is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ForwardError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ForwardError::Url(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ForwardError::Url(base_url.to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/connections/{target}/_send`, with `target` percent-encoded as one path segment.
    pub fn send_url(&self, target: &str) -> Result<Url, ForwardError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ForwardError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["connections", target, "_send"]);
        Ok(url)
    }
}

#[async_trait]
impl Forwarder for GatewayClient {
    async fn forward(&self, target: &str, body: &str) -> Result<(), ForwardError> {
        let url = self.send_url(target)?;
        let res = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "text/plain")
            .body(body.to_string())
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(ForwardError::Status(res.status()));
        }
        Ok(())
    }
}
