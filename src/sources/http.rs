//! HTTP downloads.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use url::Url;

use crate::sources::errors::RemoteError;
use crate::util::Config;

/// Downloads raw bytes. Implementations must be safe to share across fetch
/// threads.
pub trait HttpClient: Send + Sync {
    /// Download the full body at `url`.
    fn download(&self, url: &Url) -> Result<Vec<u8>, RemoteError>;
}

/// Blocking reqwest client with a timeout and user agent.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Create a client.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("failed to build HTTP client")?;
        Ok(ReqwestClient { client })
    }

    /// Create a client from the `[net]` settings.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.timeout(), &config.user_agent())
    }
}

impl HttpClient for ReqwestClient {
    fn download(&self, url: &Url) -> Result<Vec<u8>, RemoteError> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| RemoteError::Transient(format!("failed to download {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(url, status));
        }

        let bytes = response
            .bytes()
            .map_err(|e| RemoteError::Transient(format!("failed to read body of {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

/// Client errors mean the artifact is not there; server errors may pass.
fn classify_status(url: &Url, status: StatusCode) -> RemoteError {
    let message = format!("{} returned HTTP {}", url, status);
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        RemoteError::NotFound(message)
    } else {
        RemoteError::Transient(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        let url = Url::parse("https://example.com/pkg.tgz").unwrap();

        assert!(matches!(
            classify_status(&url, StatusCode::NOT_FOUND),
            RemoteError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(&url, StatusCode::GONE),
            RemoteError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(&url, StatusCode::TOO_MANY_REQUESTS),
            RemoteError::Transient(_)
        ));
        assert!(matches!(
            classify_status(&url, StatusCode::BAD_GATEWAY),
            RemoteError::Transient(_)
        ));
    }

    #[test]
    fn test_client_builds_from_config() {
        assert!(ReqwestClient::from_config(&Config::default()).is_ok());
    }
}
