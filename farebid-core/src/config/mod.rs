//! Runtime configuration shared across crates.
//!
//! These are validated runtime types. Loading and parsing the TOML file is
//! the server crate's job.

mod auth;
mod bus;
mod config_store;
mod policy;
mod server;

pub use auth::AuthConfig;
pub use bus::{BusConfig, WebhookSubscriber};
pub use config_store::{ConfigStore, ConfigWatcher};
pub use policy::{NegotiationPolicy, PolicyError};
pub use server::ServerConfig;

use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared configuration state with separate locks for each section.
///
/// The negotiation policy lives in a [`ConfigStore`] instead, because the
/// engine and the expiry sweeper need to be told when it changes.
#[derive(Clone)]
pub struct SharedConfig {
    /// Listen address, request deadline, push tuning.
    pub server: Arc<RwLock<ServerConfig>>,
    /// Gateway assertion verification.
    pub auth: Arc<RwLock<AuthConfig>>,
    /// Bus webhook subscribers.
    pub bus: Arc<RwLock<BusConfig>>,
    pub policy: ConfigStore<NegotiationPolicy>,
}

impl SharedConfig {
    pub fn new(
        server: ServerConfig,
        auth: AuthConfig,
        bus: BusConfig,
        policy: NegotiationPolicy,
    ) -> Self {
        Self {
            server: Arc::new(RwLock::new(server)),
            auth: Arc::new(RwLock::new(auth)),
            bus: Arc::new(RwLock::new(bus)),
            policy: ConfigStore::new(policy),
        }
    }
}
