//! Application state shared across all request handlers.

use farebid_core::config::SharedConfig;
use farebid_core::engine::{Deadline, SessionEngine};

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub engine: SessionEngine,
    /// Runtime configuration (sections can be reloaded via SIGHUP).
    pub config: SharedConfig,
}

impl AppState {
    pub fn new(engine: SessionEngine, config: SharedConfig) -> Self {
        Self { engine, config }
    }

    /// Deadline for one request, starting now.
    pub async fn request_deadline(&self) -> Deadline {
        Deadline::within(self.config.server.read().await.request_deadline)
    }
}
