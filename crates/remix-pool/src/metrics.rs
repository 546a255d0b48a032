//! Pool metrics.

use metrics::counter;

/// Metric name constants.
pub mod names {
    pub const CALLS_TOTAL: &str = "credential_pool_calls_total";
    pub const RATE_LIMITS_TOTAL: &str = "credential_pool_rate_limits_total";
    pub const RETRIES_TOTAL: &str = "credential_pool_retries_total";
    pub const SLOT_EXHAUSTED_TOTAL: &str = "credential_pool_slot_exhausted_total";
}

pub fn record_call(pool: &str, operation: &str, outcome: &'static str) {
    counter!(
        names::CALLS_TOTAL,
        "pool" => pool.to_string(),
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_rate_limit(pool: &str, slot: usize) {
    counter!(
        names::RATE_LIMITS_TOTAL,
        "pool" => pool.to_string(),
        "slot" => slot.to_string()
    )
    .increment(1);
}

pub fn record_retry(pool: &str, operation: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "pool" => pool.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

pub fn record_slot_exhausted(pool: &str, slot: usize) {
    counter!(
        names::SLOT_EXHAUSTED_TOTAL,
        "pool" => pool.to_string(),
        "slot" => slot.to_string()
    )
    .increment(1);
}
