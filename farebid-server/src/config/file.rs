//! TOML file configuration structures.
//!
//! These structs directly map to the `farebid.toml` file format.

use farebid_core::cache::RedisCacheConfig;
use farebid_core::pricing::{HttpPricingConfig, StaticPricingConfig};
use farebid_sdk::signature::MAX_SIGNATURE_AGE;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    pub pricing: PricingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub bus: BusConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    pub listen: SocketAddr,
    pub request_deadline_ms: u64,
    pub push_write_timeout_ms: u64,
    pub push_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            request_deadline_ms: 5_000,
            push_write_timeout_ms: 2_000,
            push_buffer: farebid_core::push::DEFAULT_PUSH_BUFFER,
        }
    }
}

/// Gateway assertion settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Secret shared with the API gateway that signs `Farebid-Actor`.
    pub gateway_secret: String,
    #[serde(default = "default_assertion_age")]
    pub max_assertion_age_secs: i64,
}

fn default_assertion_age() -> i64 {
    MAX_SIGNATURE_AGE
}

/// Negotiation policy section. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub default_ttl_secs: u64,
    pub counter_extension_secs: u64,
    pub max_session_lifetime_secs: u64,
    pub max_cas_retries: u32,
    pub store_retry_attempts: u32,
    pub store_retry_base_ms: u64,
    pub pricing_timeout_ms: u64,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: i64,
    pub terminal_snapshot_retention_secs: u64,
    pub max_open_sessions_per_rider: Option<u32>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 120,
            counter_extension_secs: 30,
            max_session_lifetime_secs: 600,
            max_cas_retries: 3,
            store_retry_attempts: 3,
            store_retry_base_ms: 25,
            pricing_timeout_ms: 1_500,
            sweep_interval_secs: 10,
            sweep_batch_size: 500,
            terminal_snapshot_retention_secs: 300,
            max_open_sessions_per_rider: None,
        }
    }
}

/// Where quotes come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PricingConfig {
    Static(StaticPricingConfig),
    Http(HttpPricingConfig),
}

/// Where session snapshots are cached. Defaults to process memory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CacheConfig {
    #[default]
    Memory,
    Redis(RedisCacheConfig),
}

/// Event bus webhook section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Delivery attempts per message and subscriber, including the first.
    pub max_attempts: u32,
    pub webhooks: Vec<WebhookConfig>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            webhooks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: Url,
    /// HMAC key for the `Farebid-Signature` header.
    pub secret: String,
    /// Subjects to deliver, e.g. `negotiation.accepted`. Empty means all.
    #[serde(default)]
    pub subjects: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"
request_deadline_ms = 3000

[auth]
gateway_secret = "gw-secret"

[policy]
counter_extension_secs = 45
max_open_sessions_per_rider = 2

[pricing]
kind = "static"
currency = "INR"
max_trip_km = 80.0

[[pricing.ride_types]]
id = "auto"
base_fare = 30
per_km = "12.5"
floor_ratio = "0.8"
ceiling_ratio = 2

[[bus.webhooks]]
url = "https://billing.example.com/hooks/negotiation"
secret = "hook-secret"
subjects = ["negotiation.accepted"]
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.server.request_deadline_ms, 3000);
        assert_eq!(config.server.push_write_timeout_ms, 2000);
        assert_eq!(config.auth.max_assertion_age_secs, MAX_SIGNATURE_AGE);
        assert_eq!(config.policy.counter_extension_secs, 45);
        assert_eq!(config.policy.default_ttl_secs, 120);
        assert_eq!(config.policy.max_open_sessions_per_rider, Some(2));
        let PricingConfig::Static(pricing) = &config.pricing else {
            panic!("expected static pricing");
        };
        assert_eq!(pricing.ride_types.len(), 1);
        assert_eq!(pricing.ride_types[0].id, "auto");
        assert_eq!(config.bus.max_attempts, 8);
        assert_eq!(config.bus.webhooks[0].subjects, ["negotiation.accepted"]);
        assert!(matches!(config.cache, CacheConfig::Memory));
    }

    #[test]
    fn test_redis_cache_parsing() {
        let toml_str = r#"
[auth]
gateway_secret = "gw-secret"

[pricing]
kind = "http"
url = "http://pricing.internal/quote"

[cache]
kind = "redis"
url = "redis://cache.internal:6379/0"
terminal_ttl_secs = 120
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        let CacheConfig::Redis(redis) = config.cache else {
            panic!("expected redis cache");
        };
        assert_eq!(redis.url, "redis://cache.internal:6379/0");
        assert_eq!(redis.key_prefix, "farebid:snapshot");
        assert_eq!(redis.terminal_ttl_secs, 120);
        assert_eq!(redis.open_ttl_secs, 900);
    }

    #[test]
    fn test_http_pricing_parsing() {
        let toml_str = r#"
[auth]
gateway_secret = "gw-secret"

[pricing]
kind = "http"
url = "http://pricing.internal/quote"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert!(config.bus.webhooks.is_empty());
        match config.pricing {
            PricingConfig::Http(http) => {
                assert_eq!(http.url.as_str(), "http://pricing.internal/quote");
                assert_eq!(http.timeout_ms, 1500);
            }
            other => panic!("unexpected pricing {other:?}"),
        }
    }

    #[test]
    fn test_missing_auth_is_rejected() {
        let toml_str = r#"
[pricing]
kind = "http"
url = "http://pricing.internal/quote"
"#;
        assert!(toml::from_str::<FileConfig>(toml_str).is_err());
    }
}
