//! Configuration module for farebid-server.
//!
//! Handles loading configuration from the TOML file, CLI arguments,
//! and environment variables, and converting it into the validated runtime
//! types from `farebid_core::config`.

pub mod file;

use crate::config::file::{CacheConfig, FileConfig, PolicyConfig, PricingConfig};
use farebid_core::config::{
    AuthConfig, BusConfig, NegotiationPolicy, ServerConfig, SharedConfig, WebhookSubscriber,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub policy: NegotiationPolicy,
    pub pricing: PricingConfig,
    pub cache: CacheConfig,
    pub bus: BusConfig,
}

impl LoadedConfig {
    /// Convert into a SharedConfig. Pricing and the cache are consumed
    /// separately at startup and are not part of the shared state.
    pub fn into_shared(self) -> SharedConfig {
        SharedConfig::new(self.server, self.auth, self.bus, self.policy)
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read, override, validate and convert the configuration file.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.parse(&config_content)
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn parse(&self, content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;
        let policy = convert_policy(&file_config.policy);
        policy
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("policy: {e}")))?;

        Ok(LoadedConfig {
            server: ServerConfig {
                listen: file_config.server.listen,
                request_deadline: Duration::from_millis(file_config.server.request_deadline_ms),
                push_write_timeout: Duration::from_millis(
                    file_config.server.push_write_timeout_ms,
                ),
                push_buffer: file_config.server.push_buffer,
            },
            auth: AuthConfig {
                gateway_secret: file_config.auth.gateway_secret.into_bytes().into_boxed_slice(),
                max_assertion_age_secs: file_config.auth.max_assertion_age_secs,
            },
            policy,
            pricing: file_config.pricing,
            cache: file_config.cache,
            bus: BusConfig {
                max_attempts: file_config.bus.max_attempts,
                webhooks: file_config
                    .bus
                    .webhooks
                    .into_iter()
                    .map(|w| WebhookSubscriber {
                        url: w.url,
                        secret: w.secret.into_bytes().into_boxed_slice(),
                        subjects: w.subjects,
                    })
                    .collect(),
            },
        })
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.auth.gateway_secret.is_empty() {
        return Err(ConfigError::ValidationError(
            "auth.gateway_secret must not be empty".into(),
        ));
    }
    if config.auth.max_assertion_age_secs <= 0 {
        return Err(ConfigError::ValidationError(
            "auth.max_assertion_age_secs must be positive".into(),
        ));
    }
    if config.server.request_deadline_ms == 0 || config.server.push_write_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "server timeouts must be greater than zero".into(),
        ));
    }
    if config.bus.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "bus.max_attempts must be at least 1".into(),
        ));
    }
    for webhook in &config.bus.webhooks {
        if webhook.secret.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "webhook {} has an empty secret",
                webhook.url
            )));
        }
    }
    if let CacheConfig::Redis(redis) = &config.cache {
        if redis.timeout_ms == 0 || redis.open_ttl_secs == 0 || redis.terminal_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache timeouts and ttls must be greater than zero".into(),
            ));
        }
    }
    if let PricingConfig::Static(table) = &config.pricing {
        if table.ride_types.is_empty() {
            return Err(ConfigError::ValidationError(
                "static pricing has no ride types".into(),
            ));
        }
        if let Some(bad) = table
            .ride_types
            .iter()
            .find(|r| r.floor_ratio > r.ceiling_ratio || r.floor_ratio.is_sign_negative())
        {
            return Err(ConfigError::ValidationError(format!(
                "ride type {} has an incoherent floor/ceiling ratio",
                bad.id
            )));
        }
    }
    Ok(())
}

fn convert_policy(p: &PolicyConfig) -> NegotiationPolicy {
    NegotiationPolicy {
        default_ttl: Duration::from_secs(p.default_ttl_secs),
        counter_extension: Duration::from_secs(p.counter_extension_secs),
        max_session_lifetime: Duration::from_secs(p.max_session_lifetime_secs),
        max_cas_retries: p.max_cas_retries,
        store_retry_attempts: p.store_retry_attempts,
        store_retry_base: Duration::from_millis(p.store_retry_base_ms),
        pricing_timeout: Duration::from_millis(p.pricing_timeout_ms),
        sweep_interval: Duration::from_secs(p.sweep_interval_secs),
        sweep_batch_size: p.sweep_batch_size,
        terminal_snapshot_retention: Duration::from_secs(p.terminal_snapshot_retention_secs),
        max_open_sessions_per_rider: p.max_open_sessions_per_rider,
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[auth]
gateway_secret = "gw-secret"

[pricing]
kind = "static"
currency = "INR"

[[pricing.ride_types]]
id = "auto"
base_fare = 30
per_km = 12
floor_ratio = "0.8"
ceiling_ratio = 2
"#;

    fn loader() -> ConfigLoader {
        ConfigLoader::new("unused.toml", None)
    }

    #[test]
    fn defaults_match_the_negotiation_policy() {
        let loaded = loader().parse(MINIMAL).unwrap();
        assert_eq!(loaded.policy, NegotiationPolicy::default());
        assert_eq!(loaded.server.request_deadline, Duration::from_secs(5));
        assert_eq!(loaded.server.push_write_timeout, Duration::from_secs(2));
        assert_eq!(&*loaded.auth.gateway_secret, b"gw-secret");
        assert_eq!(loaded.bus.max_attempts, 8);
    }

    #[test]
    fn listen_override_wins() {
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let loaded = ConfigLoader::new("unused.toml", Some(addr))
            .parse(MINIMAL)
            .unwrap();
        assert_eq!(loaded.server.listen, addr);
    }

    #[test]
    fn invalid_policy_is_rejected() {
        let content = format!("{MINIMAL}\n[policy]\nmax_cas_retries = 0\n");
        let err = loader().parse(&content).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)), "{err}");
    }

    #[test]
    fn ttl_longer_than_lifetime_is_rejected() {
        let content =
            format!("{MINIMAL}\n[policy]\ndefault_ttl_secs = 900\nmax_session_lifetime_secs = 600\n");
        assert!(loader().parse(&content).is_err());
    }

    #[test]
    fn empty_gateway_secret_is_rejected() {
        let content = MINIMAL.replace("gw-secret", "");
        assert!(matches!(
            loader().parse(&content),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn zero_cache_ttl_is_rejected() {
        let content = format!(
            "{MINIMAL}\n[cache]\nkind = \"redis\"\nurl = \"redis://localhost\"\nopen_ttl_secs = 0\n"
        );
        assert!(matches!(
            loader().parse(&content),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(loader().parse(MINIMAL).unwrap().cache, CacheConfig::Memory));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = ConfigLoader::new("/nonexistent/farebid.toml", None)
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
