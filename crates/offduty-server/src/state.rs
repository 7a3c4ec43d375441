//! Application state for the decision server.

use std::sync::Arc;

use offduty_core::{AdmissionEngine, Config, ConfigSource, StaticConfigSource};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Admission engine shared by all requests.
    pub engine: Arc<AdmissionEngine<Arc<dyn ConfigSource>>>,
}

impl AppState {
    /// Creates application state around a config source.
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self::with_engine(AdmissionEngine::new(source))
    }

    /// Creates application state from a prepared engine.
    pub fn with_engine(engine: AdmissionEngine<Arc<dyn ConfigSource>>) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Creates application state serving a fixed config.
    pub fn with_config(config: Config) -> Self {
        Self::new(Arc::new(StaticConfigSource::new(config)))
    }
}
