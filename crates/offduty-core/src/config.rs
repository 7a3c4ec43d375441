//! Gatekeeper configuration and the stores that supply it.
//!
//! The engine never owns configuration. Each evaluation asks a
//! [`ConfigSource`] for a fresh snapshot; a source answering `Ok(None)` means
//! the store had nothing to give, which the engine treats the same as a
//! failed fetch.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schedule::Schedule;

/// Errors raised while obtaining configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required connection setting was not supplied.
    #[error("{0} not configured")]
    MissingSetting(&'static str),

    /// The store answered but had no configuration.
    #[error("config store returned no configuration")]
    NotFound,

    /// The source panicked while fetching.
    #[error("config source failed unexpectedly")]
    SourcePanicked,

    /// HTTP transport or status error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (e.g., reading a config file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Whitelist plus weekly schedule.
///
/// Only the whitelist has to be well-formed. A schedule that does not parse
/// is set aside so whitelisted callers still get through; see
/// [`Config::schedule_problem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredConfig")]
pub struct Config {
    /// Callers that are always forwarded. Matched exactly.
    pub whitelist: Vec<String>,
    /// Availability schedule. `None` never matches.
    pub schedule: Option<Schedule>,
    #[serde(skip)]
    malformed_schedule: Option<String>,
}

/// Config document as stored, before the schedule is interpreted.
#[derive(Deserialize)]
struct StoredConfig {
    whitelist: Vec<String>,
    #[serde(default)]
    schedule: Option<serde_json::Value>,
}

impl From<StoredConfig> for Config {
    fn from(stored: StoredConfig) -> Self {
        let (schedule, malformed_schedule) = match stored.schedule {
            None | Some(serde_json::Value::Null) => (None, None),
            Some(value) => match serde_json::from_value::<Schedule>(value) {
                Ok(schedule) => (Some(schedule), None),
                Err(e) => (None, Some(e.to_string())),
            },
        };

        Self {
            whitelist: stored.whitelist,
            schedule,
            malformed_schedule,
        }
    }
}

impl Default for Config {
    /// Empty whitelist; Monday to Friday, 09:00-17:00 local.
    fn default() -> Self {
        Self::new(Vec::new(), Some(Schedule::business_hours()))
    }
}

impl Config {
    /// Creates a config from parts.
    pub fn new(whitelist: Vec<String>, schedule: Option<Schedule>) -> Self {
        Self {
            whitelist,
            schedule,
            malformed_schedule: None,
        }
    }

    /// Why the stored schedule could not be read, if it could not.
    pub fn schedule_problem(&self) -> Option<&str> {
        self.malformed_schedule.as_deref()
    }

    /// Returns true if `caller` is on the whitelist.
    pub fn is_whitelisted(&self, caller: &str) -> bool {
        self.whitelist.iter().any(|entry| entry == caller)
    }

    /// Parses a config document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a config document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}

/// Supplies a configuration snapshot per evaluation.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetches the current configuration. `Ok(None)` means the store is empty.
    async fn fetch(&self) -> Result<Option<Config>>;

    /// Short description used in logs.
    fn describe(&self) -> String;
}

#[async_trait]
impl<T: ConfigSource + ?Sized> ConfigSource for Arc<T> {
    async fn fetch(&self) -> Result<Option<Config>> {
        (**self).fetch().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[async_trait]
impl<T: ConfigSource + ?Sized> ConfigSource for Box<T> {
    async fn fetch(&self) -> Result<Option<Config>> {
        (**self).fetch().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// A fixed, in-memory configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    config: Option<Config>,
}

impl StaticConfigSource {
    /// Always answers with `config`.
    pub fn new(config: Config) -> Self {
        Self {
            config: Some(config),
        }
    }

    /// Always answers with no configuration.
    pub fn empty() -> Self {
        Self { config: None }
    }

    /// Loads the configuration once from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Config::load(path)?))
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn fetch(&self) -> Result<Option<Config>> {
        Ok(self.config.clone())
    }

    fn describe(&self) -> String {
        if self.config.is_some() {
            "static".to_string()
        } else {
            "static (empty)".to_string()
        }
    }
}
