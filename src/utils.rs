//! Small shared helpers.

use crate::config::RetryPolicy;
use rand::Rng;
use std::time::Duration;

/// Computes the backoff delay before retry attempt `attempt` (1-based).
///
/// The raw delay is `base_delay * 2^(attempt - 1)` clamped at `max_delay`.
/// With jitter enabled the result is equal-jittered: half the delay is kept
/// and the other half randomized, preserving ~75% of the backoff on average
/// while desynchronizing concurrent retries.
pub fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let base = policy.base_delay();
    let max = policy.max_delay();

    let exponent = attempt.saturating_sub(1).min(31);
    let raw = base.checked_mul(1u32 << exponent).unwrap_or(max).min(max);

    if !policy.enable_jitter || raw.is_zero() {
        return raw;
    }

    let half = raw / 2;
    let spread = raw - half;
    let jitter_ms = rand::rng().random_range(0..=spread.as_millis() as u64);
    half + Duration::from_millis(jitter_ms)
}
