//! Backoff arithmetic for the durable retry queue and for local call-site retries.
use crate::domain::model::RetryPolicy;

/// Delay before the next queue attempt: `base * 2^attempts` (5, 10, 20, 40, 80 min for a
/// five minute base).
pub fn queue_retry_delay_ms(base_delay_ms: i64, attempts: i64) -> i64 {
    let exp = attempts.clamp(0, 32) as u32;
    base_delay_ms.saturating_mul(2i64.saturating_pow(exp))
}

pub fn next_scheduled_for_ms(now_ms: i64, base_delay_ms: i64, attempts: i64) -> i64 {
    now_ms.saturating_add(queue_retry_delay_ms(base_delay_ms, attempts))
}

/// Wait before local retry number `attempt` (0-based), clamped to the policy bounds.
/// With jitter the wait is drawn between the floor and the exponential ceiling.
pub fn local_retry_delay_ms(policy: &RetryPolicy, attempt: u32, rand01: f64) -> u64 {
    let growth = policy.multiplier.max(1).saturating_pow(attempt.min(32));
    let ceiling = policy
        .min_delay_ms
        .saturating_mul(growth)
        .clamp(policy.min_delay_ms, policy.max_delay_ms.max(policy.min_delay_ms));

    if !policy.jitter {
        return ceiling;
    }
    let span = (ceiling - policy.min_delay_ms) as f64;
    policy.min_delay_ms + (span * rand01.clamp(0.0, 1.0)).round() as u64
}
