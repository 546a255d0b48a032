//! Cooldown and backoff delays.

use rand::Rng;
use std::time::Duration;

/// `base * 2^n`, capped at `max`.
pub fn exponential(base: Duration, n: u32, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(n.min(31));
    base.saturating_mul(factor).min(max)
}

/// Exponential backoff with full jitter, never below `base`.
pub fn jittered(base: Duration, attempt: u32, max: Duration) -> Duration {
    let capped = exponential(base, attempt, max);
    let capped_ms = capped.as_millis() as u64;
    let jitter_ms = if capped_ms > 0 {
        rand::rng().random_range(0..=capped_ms)
    } else {
        0
    };
    Duration::from_millis(jitter_ms).max(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_doubles_and_caps() {
        let base = Duration::from_secs(2);
        let max = Duration::from_secs(60);
        assert_eq!(exponential(base, 0, max), Duration::from_secs(2));
        assert_eq!(exponential(base, 3, max), Duration::from_secs(16));
        assert_eq!(exponential(base, 10, max), max);
        assert_eq!(exponential(base, 200, max), max);
    }

    #[test]
    fn test_jittered_bounds() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(1000);
        for attempt in 0..10 {
            let d = jittered(base, attempt, max);
            assert!(d >= base);
            assert!(d <= max);
        }
    }
}
