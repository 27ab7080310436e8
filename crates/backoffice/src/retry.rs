//! Exponential back-off for inbox and outbox retries.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// When a row that has failed `attempts` times (counting the one just
/// recorded) should be tried again: `2^attempts` seconds after `now`,
/// capped.
pub fn next_attempt_at(
    now: DateTime<Utc>,
    attempts: i32,
    max_backoff: Duration,
) -> DateTime<Utc> {
    let exponent = attempts.clamp(0, 30) as u32;
    let delay = Duration::from_secs(2u64.saturating_pow(exponent));
    let delay = delay.min(max_backoff);
    now + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::hours(1))
}

/// Whether a row with this many attempts is still retried automatically.
pub fn attempts_exhausted(attempts: i32, max_attempts: i32) -> bool {
    attempts >= max_attempts
}
