//! Backing datastore client
//!
//! Version validation only needs a tiny slice of the datastore API: fetch the
//! root info document and release the connection. That slice is the
//! [`EsClient`] trait so tests and embedders can substitute their own
//! transport; [`HttpEsClient`] is the stock implementation speaking HTTP to
//! the endpoint configured under `esUrl`.

use crate::config::Config;
use crate::errors::{Result, VersionError};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Default endpoint when `esUrl` is not configured
pub const DEFAULT_ES_URL: &str = "http://localhost:9200";

/// Root info document returned by the datastore
#[derive(Debug, Clone, Deserialize)]
pub struct EsInfo {
    pub version: EsVersionInfo,
}

/// Version block of the info document
#[derive(Debug, Clone, Deserialize)]
pub struct EsVersionInfo {
    pub number: String,
}

/// Minimal datastore client surface used by version validation
#[async_trait]
pub trait EsClient: Send + Sync {
    /// Fetch the root info document
    async fn info(&self) -> Result<EsInfo>;

    /// Release the underlying connection
    async fn close(&self) -> Result<()>;
}

/// HTTP implementation of [`EsClient`]
#[derive(Debug, Clone)]
pub struct HttpEsClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpEsClient {
    /// Create a client for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Create a client from the `esUrl` config key, falling back to
    /// [`DEFAULT_ES_URL`]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.get_str("esUrl").unwrap_or(DEFAULT_ES_URL))
    }

    /// The endpoint this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl EsClient for HttpEsClient {
    async fn info(&self) -> Result<EsInfo> {
        debug!(url = %self.base_url, "fetching datastore info");
        let response = self
            .http
            .get(&self.base_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|error| VersionError::Fetch {
                message: error.to_string(),
            })?;

        response
            .json::<EsInfo>()
            .await
            .map_err(|error| {
                VersionError::Fetch {
                    message: format!("invalid info response: {error}"),
                }
                .into()
            })
    }

    async fn close(&self) -> Result<()> {
        // reqwest pools connections behind an Arc; dropping the last clone
        // tears them down, so there is nothing further to release here
        Ok(())
    }
}
