//! Remote resource fetching for URL manifest entries

use serde::{Deserialize, Serialize};

/// Error type for remote fetches
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request could not be sent or the body could not be read
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The server answered with a non-success status
    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The HTTP client could not be built from its settings
    #[error("Invalid HTTP client settings: {0}")]
    Client(String),

    /// Remote fetching is not available in this build
    #[error("Remote fetching is disabled; cannot download {0}")]
    Disabled(String),
}

/// Fetches the bytes behind a URL
pub trait RemoteFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// `[http]` client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpOptions {
    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Proxy URL applied to every request
    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_user_agent() -> String {
    concat!("period-ingest/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            proxy: None,
            user_agent: default_user_agent(),
        }
    }
}

/// Fetcher that refuses every request, used when HTTP support is compiled out
#[derive(Debug, Default)]
pub struct DisabledFetcher;

impl RemoteFetcher for DisabledFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Disabled(url.to_string()))
    }
}

/// Blocking HTTP fetcher
#[cfg(feature = "http-fetch")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http-fetch")]
impl HttpFetcher {
    pub fn new(options: &HttpOptions) -> Result<Self, FetchError> {
        let mut builder = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(options.timeout_secs))
            .user_agent(options.user_agent.clone());
        if let Some(proxy) = &options.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| FetchError::Client(format!("Invalid proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http-fetch")]
impl RemoteFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().map_err(|e| FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().map_err(|e| FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(body.to_vec())
    }
}

/// Build the fetcher for this build's feature set
pub fn default_fetcher(options: &HttpOptions) -> Result<Box<dyn RemoteFetcher>, FetchError> {
    #[cfg(feature = "http-fetch")]
    {
        Ok(Box::new(HttpFetcher::new(options)?))
    }
    #[cfg(not(feature = "http-fetch"))]
    {
        let _ = options;
        Ok(Box::new(DisabledFetcher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_fetcher_refuses() {
        let err = DisabledFetcher.fetch("https://example.org/a.pdf").unwrap_err();
        assert!(matches!(err, FetchError::Disabled(_)));
    }
}
