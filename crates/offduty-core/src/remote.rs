//! Remote configuration API client.
//!
//! Fetches `GET {api_url}/api/config` with a bearer token. The API wraps the
//! document in an envelope:
//!
//! ```json
//! { "success": true, "data": { "whitelist": [...], "schedule": {...} } }
//! ```
//!
//! `success: false` or a missing `data` field is an empty answer, not an error.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{Config, ConfigError, ConfigSource, Result};

/// Path of the config endpoint, appended to the API base URL.
pub const CONFIG_PATH: &str = "/api/config";

/// Default transport timeout for one fetch.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`RemoteConfigSource`].
#[derive(Debug, Clone)]
pub struct RemoteConfigSettings {
    /// Base URL of the config API (e.g. `https://api.example.com`).
    pub api_url: Option<String>,
    /// Bearer token sent with every request.
    pub access_token: Option<String>,
    /// Transport timeout for one fetch.
    pub timeout: Duration,
}

impl Default for RemoteConfigSettings {
    fn default() -> Self {
        Self {
            api_url: None,
            access_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl RemoteConfigSettings {
    /// Creates settings with both connection values.
    pub fn new(api_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self::default()
            .with_api_url(api_url)
            .with_access_token(access_token)
    }

    /// Sets the base URL.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    /// Sets the bearer token.
    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    /// Sets the transport timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL of the config endpoint.
    fn endpoint(&self) -> Result<String> {
        let base = non_empty(self.api_url.as_deref())
            .ok_or(ConfigError::MissingSetting("API_URL"))?;
        Ok(format!("{}{}", base.trim_end_matches('/'), CONFIG_PATH))
    }

    fn token(&self) -> Result<&str> {
        non_empty(self.access_token.as_deref())
            .ok_or(ConfigError::MissingSetting("ACCESS_TOKEN"))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Response envelope of the config API.
#[derive(Debug, Deserialize)]
struct ConfigEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Config>,
    #[serde(default)]
    message: Option<String>,
}

/// Config source backed by the remote config API.
#[derive(Debug, Clone)]
pub struct RemoteConfigSource {
    settings: RemoteConfigSettings,
    client: reqwest::Client,
}

impl RemoteConfigSource {
    /// Creates a new source. Missing settings are reported on fetch, not here.
    pub fn new(settings: RemoteConfigSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("Offduty/{}", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .build()?;

        Ok(Self { settings, client })
    }

    /// Returns the connection settings.
    pub fn settings(&self) -> &RemoteConfigSettings {
        &self.settings
    }
}

#[async_trait]
impl ConfigSource for RemoteConfigSource {
    async fn fetch(&self) -> Result<Option<Config>> {
        let url = self.settings.endpoint()?;
        let token = self.settings.token()?;

        debug!(url = %url, "Fetching config");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        let envelope: ConfigEnvelope = serde_json::from_str(&body)?;

        if !envelope.success {
            warn!(message = ?envelope.message, "Config API reported failure");
            return Ok(None);
        }

        Ok(envelope.data)
    }

    fn describe(&self) -> String {
        match self.settings.api_url.as_deref() {
            Some(url) => format!("remote ({url})"),
            None => "remote (unconfigured)".to_string(),
        }
    }
}
