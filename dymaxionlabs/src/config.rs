//! Client configuration.

use std::env;
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::errors::*;
use crate::retry::{ChunkRetryStrategy, TransportRetry};

/// The public Dymaxion Labs API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.dymaxionlabs.com";

/// Default timeout for connecting, and for each JSON API call as a whole.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable holding the API base URL.
pub const API_URL_VAR: &str = "DYM_API_URL";
/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "DYM_API_KEY";
/// Environment variable holding the project ID.
pub const PROJECT_ID_VAR: &str = "DYM_PROJECT_ID";

/// Settings used by a [`Client`](crate::Client). This uses a "builder"
/// pattern, so you can write:
///
/// ```
/// use std::time::Duration;
/// use dymaxionlabs::Config;
///
/// let config = Config::new("my-api-key")
///     .project_id("a1b2c3")
///     .timeout(Duration::from_secs(60));
/// ```
#[derive(Clone)]
pub struct Config {
    api_url: Url,
    api_key: String,
    project_id: Option<String>,
    timeout: Duration,
    retry: TransportRetry,
    chunk_retry: ChunkRetryStrategy,
}

impl Config {
    /// Create a configuration for the public API endpoint.
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Config {
            api_url: Url::parse(DEFAULT_API_URL)
                .expect("Cannot parse Dymaxion Labs URL in source code"),
            api_key: api_key.into(),
            project_id: None,
            timeout: DEFAULT_TIMEOUT,
            retry: TransportRetry::default(),
            chunk_retry: ChunkRetryStrategy::default(),
        }
    }

    /// Read `DYM_API_URL`, `DYM_API_KEY` and `DYM_PROJECT_ID` from the process
    /// environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Like `from_env`, but using `lookup` to find variable values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| Error::missing_env_var(API_KEY_VAR))?;
        let mut config = Config::new(api_key);
        if let Some(api_url) = lookup(API_URL_VAR).filter(|url| !url.is_empty()) {
            config.api_url =
                Url::parse(&api_url).map_err(|e| Error::could_not_parse_url(api_url, e))?;
        }
        config.project_id = lookup(PROJECT_ID_VAR).filter(|id| !id.is_empty());
        Ok(config)
    }

    /// Point the client at a different API endpoint.
    pub fn api_url(mut self, api_url: Url) -> Self {
        self.api_url = api_url;
        self
    }

    /// Set the project used by project-scoped requests.
    pub fn project_id<S: Into<String>>(mut self, project_id: S) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Set the per-call timeout. Defaults to 30 seconds.
    ///
    /// JSON API calls must finish within it. Binary downloads and resumable
    /// upload chunks only need to connect within it, since their bodies may
    /// take much longer to transfer.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy for idempotent requests.
    pub fn retry(mut self, retry: TransportRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Set the retry policy for resumable upload chunks.
    pub fn chunk_retry(mut self, chunk_retry: ChunkRetryStrategy) -> Self {
        self.chunk_retry = chunk_retry;
        self
    }

    /// The API base URL.
    pub fn get_api_url(&self) -> &Url {
        &self.api_url
    }

    /// The project ID, if one was configured.
    pub fn get_project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// The per-call timeout.
    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    /// The retry policy for idempotent requests.
    pub fn get_retry(&self) -> &TransportRetry {
        &self.retry
    }

    /// The retry policy for resumable upload chunks.
    pub fn get_chunk_retry(&self) -> &ChunkRetryStrategy {
        &self.chunk_retry
    }

    /// The value of our `Authorization` header.
    pub(crate) fn authorization(&self) -> String {
        format!("Api-Key {}", self.api_key)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_url", &self.api_url.as_str())
            .field("api_key", &"*****")
            .field("project_id", &self.project_id)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("chunk_retry", &self.chunk_retry)
            .finish()
    }
}
