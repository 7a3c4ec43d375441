//! Call events and admission decisions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An inbound call to be admitted or rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEvent {
    /// Caller identifier, compared exactly against the whitelist.
    pub caller: String,
    /// When the call arrived.
    pub arrival: DateTime<Utc>,
}

impl CallEvent {
    /// Creates a call event.
    pub fn new(caller: impl Into<String>, arrival: DateTime<Utc>) -> Self {
        Self {
            caller: caller.into(),
            arrival,
        }
    }

    /// Creates a call event arriving now.
    pub fn now(caller: impl Into<String>) -> Self {
        Self::new(caller, Utc::now())
    }
}

/// Why a call was allowed or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Caller is on the whitelist.
    Whitelist,
    /// Call arrived inside a schedule window.
    WithinHours,
    /// Call arrived outside every schedule window.
    OutsideHours,
    /// Configuration could not be obtained.
    ConfigError,
    /// Invalid caller or any other evaluation failure.
    Error,
}

impl Reason {
    /// Wire name of this reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Whitelist => "whitelist",
            Reason::WithinHours => "within_hours",
            Reason::OutsideHours => "outside_hours",
            Reason::ConfigError => "config_error",
            Reason::Error => "error",
        }
    }

    /// Only whitelist and schedule matches forward the call.
    pub fn allows(&self) -> bool {
        matches!(self, Reason::Whitelist | Reason::WithinHours)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The verdict for one call.
///
/// `allow` is always derived from `reason`; construct decisions through the
/// named constructors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Whether to forward the call.
    pub allow: bool,
    /// Why.
    pub reason: Reason,
    /// Caller identifier as received.
    pub caller: String,
    /// Instant the decision was evaluated for.
    pub timestamp: DateTime<Utc>,
    /// UTC offset used for schedule matching.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub offset_hours: Option<i32>,
    /// Internal detail for failures.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

impl Decision {
    fn new(reason: Reason, caller: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            allow: reason.allows(),
            reason,
            caller: caller.to_string(),
            timestamp,
            offset_hours: None,
            message: None,
        }
    }

    /// Caller is whitelisted.
    pub fn whitelisted(caller: &str, timestamp: DateTime<Utc>) -> Self {
        Self::new(Reason::Whitelist, caller, timestamp)
    }

    /// Result of a schedule check.
    pub fn scheduled(
        within: bool,
        caller: &str,
        timestamp: DateTime<Utc>,
        offset_hours: i32,
    ) -> Self {
        let reason = if within {
            Reason::WithinHours
        } else {
            Reason::OutsideHours
        };
        Self {
            offset_hours: Some(offset_hours),
            ..Self::new(reason, caller, timestamp)
        }
    }

    /// Configuration could not be loaded.
    pub fn config_error(
        caller: &str,
        timestamp: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(Reason::ConfigError, caller, timestamp)
        }
    }

    /// Any other failure.
    pub fn error(caller: &str, timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(Reason::Error, caller, timestamp)
        }
    }
}
