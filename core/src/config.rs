//! Configuration for the Feedy API client.
//!
//! Defaults point at the production API with no timeout. `from_env` reads:
//! - `FEEDY_API_URL`: API root (optional)
//! - `FEEDY_ACCESS_TOKEN`: access token (required)
//! - `FEEDY_TIMEOUT_SECS`: whole-request timeout in seconds (optional)

use std::env::{self, VarError};
use std::fmt;
use std::time::Duration;

use crate::client::DEFAULT_BASE_URL;
use crate::error::{ApiError, ApiResult};

/// Client configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root every method path is appended to.
    pub base_url: String,
    /// Token sent as `access_token` with every API call.
    pub access_token: String,
    /// Passed to the transport; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: String::new(),
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Production configuration with the given token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::default().with_access_token(access_token)
    }

    /// Create configuration from environment variables.
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|name| env::var(name))
    }

    /// Same as `from_env`, reading each variable through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> ApiResult<Self>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let access_token = read_var(&lookup, "FEEDY_ACCESS_TOKEN")?
            .ok_or_else(|| ApiError::config("FEEDY_ACCESS_TOKEN is not set"))?;

        let base_url =
            read_var(&lookup, "FEEDY_API_URL")?.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout = match read_var(&lookup, "FEEDY_TIMEOUT_SECS")? {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    ApiError::config(format!("FEEDY_TIMEOUT_SECS is not a number: {raw:?}"))
                })?;
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        let config = Self {
            base_url,
            access_token,
            timeout,
        };
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = token.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ApiResult<()> {
        if self.base_url.is_empty() {
            return Err(ApiError::config("base_url cannot be empty"));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ApiError::config("base_url must start with http:// or https://"));
        }

        if self.access_token.is_empty() {
            return Err(ApiError::config("access_token cannot be empty"));
        }

        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ApiError::config("timeout cannot be zero"));
        }

        Ok(())
    }
}

fn read_var<F>(lookup: &F, name: &str) -> ApiResult<Option<String>>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    match lookup(name) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => {
            Err(ApiError::config(format!("{name} is not valid Unicode")))
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}
