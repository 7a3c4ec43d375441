//! API request and response models.

use serde::{Deserialize, Serialize};

/// Call details for the decision endpoint.
///
/// Accepts the telephony webhook's `From` as well as `from` and `caller`.
#[derive(Debug, Default, Deserialize)]
pub struct CallRequest {
    /// Caller identifier.
    #[serde(default, alias = "From", alias = "caller")]
    pub from: Option<String>,
}

impl CallRequest {
    /// Caller identifier, empty when absent.
    pub fn caller(&self) -> &str {
        self.from.as_deref().unwrap_or_default()
    }
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}
