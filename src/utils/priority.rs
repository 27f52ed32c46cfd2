// Severity to queue priority mapping and retry backoff

use rand::Rng;
use std::time::Duration;

/// Priority used when severity is outside 1..=5
pub const DEFAULT_PRIORITY: i32 = 3;

/// Invert severity into a queue priority: 5 -> 1 (most urgent) .. 1 -> 5
pub fn severity_to_priority(severity: i32) -> i32 {
    match severity {
        1..=5 => 6 - severity,
        _ => DEFAULT_PRIORITY,
    }
}

/// Exponential delay before retry number `retry_count` (1-based):
/// `base * 2^(retry_count - 1)`, capped at `max`. Overflow falls back to `max`.
pub fn backoff_delay(retry_count: u32, base: Duration, max: Duration) -> Duration {
    let exp = 2_u32
        .checked_pow(retry_count.saturating_sub(1))
        .unwrap_or(u32::MAX);
    let delay = base.checked_mul(exp).unwrap_or(max);
    delay.min(max)
}

/// `backoff_delay` plus 0-25% random jitter so retries from one batch spread out
pub fn backoff_with_jitter(retry_count: u32, base: Duration, max: Duration) -> Duration {
    let delay = backoff_delay(retry_count, base, max);
    let jitter_cap = (delay.as_millis() / 4) as u64;
    if jitter_cap == 0 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0..=jitter_cap);
    delay + Duration::from_millis(jitter)
}
