//! Retry delays shared by the engine and the bus relay.

use std::time::Duration;

use rand::Rng;

/// Largest exponent used by [`calculate_retry_delay`] (2^11 = 2048 seconds).
pub const MAX_RETRY_EXPONENT: u32 = 11;

/// Delay before the next webhook delivery attempt: `2^retry_count` seconds,
/// capped at `2^MAX_RETRY_EXPONENT`.
pub fn calculate_retry_delay(retry_count: u32) -> Duration {
    let seconds = 2u64.pow(retry_count.min(MAX_RETRY_EXPONENT));
    Duration::from_secs(seconds)
}

/// `base * 2^attempt`, saturating.
pub fn exponential(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.min(16)))
}

/// [`exponential`] plus up to half of `base` of random jitter, so retries
/// of writers that collided do not collide again.
pub fn store_backoff(base: Duration, attempt: u32) -> Duration {
    let step = exponential(base, attempt);
    let spread = u64::try_from(base.as_micros() / 2).unwrap_or(u64::MAX);
    if spread == 0 {
        return step;
    }
    let jitter = rand::rng().random_range(0..=spread);
    step.saturating_add(Duration::from_micros(jitter))
}
