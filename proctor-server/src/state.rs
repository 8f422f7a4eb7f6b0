//! Shared application state for the proctor server

use std::sync::Arc;

use chrono::{DateTime, Utc};
use proctor_core::{EngineConfig, EventBus, RawSample, SessionRegistry};

use crate::ServerError;
use crate::ws::decode_frame;

/// Shared application state accessible by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Session registry owning every live exam session
    pub registry: Arc<SessionRegistry>,
    /// Event bus the registry publishes to
    pub event_bus: Arc<dyn EventBus>,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state around an existing registry
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        let event_bus = registry.event_bus();
        Self {
            registry,
            event_bus,
            started_at: Utc::now(),
        }
    }

    /// State backed entirely by in-memory stores
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(Arc::new(SessionRegistry::in_memory(config)))
    }

    /// Validate a wire sample, decode its frame and hand it to the registry
    pub async fn ingest(&self, raw: RawSample, frame: Option<&str>) -> Result<(), ServerError> {
        let frame = frame.map(decode_frame).transpose()?;
        let sample = raw.into_sample(frame)?;
        self.registry.ingest(sample).await?;
        Ok(())
    }

    /// Seconds since the server started
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
