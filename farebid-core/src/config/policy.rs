use std::time::Duration;

/// Tunables of the negotiation engine and its background tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationPolicy {
    /// Session lifetime when pricing does not suggest one.
    pub default_ttl: Duration,
    /// Added to the deadline on every counter-offer.
    pub counter_extension: Duration,
    /// Hard ceiling: no deadline ever passes `created_at + max_session_lifetime`.
    pub max_session_lifetime: Duration,
    /// Compare-and-set attempts before a mutation reports `Conflict`.
    pub max_cas_retries: u32,
    /// Attempts for a store call failing with a transient error.
    pub store_retry_attempts: u32,
    /// First backoff step; doubles per attempt.
    pub store_retry_base: Duration,
    /// Time budget for one pricing quote.
    pub pricing_timeout: Duration,
    pub sweep_interval: Duration,
    /// Sessions expired per sweeper tick at most.
    pub sweep_batch_size: i64,
    /// How long terminal snapshots stay in the cache.
    pub terminal_snapshot_retention: Duration,
    /// `None` disables the admission limit.
    pub max_open_sessions_per_rider: Option<u32>,
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(120),
            counter_extension: Duration::from_secs(30),
            max_session_lifetime: Duration::from_secs(600),
            max_cas_retries: 3,
            store_retry_attempts: 3,
            store_retry_base: Duration::from_millis(25),
            pricing_timeout: Duration::from_millis(1500),
            sweep_interval: Duration::from_secs(10),
            sweep_batch_size: 500,
            terminal_snapshot_retention: Duration::from_secs(300),
            max_open_sessions_per_rider: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("default_ttl must not exceed max_session_lifetime")]
    TtlBeyondLifetime,
}

impl NegotiationPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        for (name, value) in [
            ("default_ttl", self.default_ttl),
            ("max_session_lifetime", self.max_session_lifetime),
            ("pricing_timeout", self.pricing_timeout),
            ("sweep_interval", self.sweep_interval),
        ] {
            if value.is_zero() {
                return Err(PolicyError::Zero(name));
            }
        }
        if self.max_cas_retries == 0 {
            return Err(PolicyError::Zero("max_cas_retries"));
        }
        if self.store_retry_attempts == 0 {
            return Err(PolicyError::Zero("store_retry_attempts"));
        }
        if self.sweep_batch_size <= 0 {
            return Err(PolicyError::Zero("sweep_batch_size"));
        }
        if self.default_ttl > self.max_session_lifetime {
            return Err(PolicyError::TtlBeyondLifetime);
        }
        Ok(())
    }
}
