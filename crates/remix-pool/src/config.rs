//! Pool configuration.

use std::time::Duration;

use crate::key::ApiKey;

/// Tuning knobs for one [`crate::CredentialPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// First cooldown after a rate limit. Doubles per consecutive rate limit.
    pub cooldown_base: Duration,
    /// Upper bound for a single cooldown.
    pub cooldown_max: Duration,
    /// Slot rotations allowed within one logical call.
    pub max_rotations: u32,
    /// Same-slot retries after transient failures.
    pub max_transient_retries: u32,
    /// Base delay for transient backoff.
    pub backoff_base: Duration,
    /// Upper bound for transient backoff.
    pub backoff_max: Duration,
    /// A slot is exhausted once its consecutive rejected-key failures exceed this.
    pub max_consecutive_failures: u32,
    /// Fail `acquire` instead of waiting longer than this.
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            cooldown_base: Duration::from_secs(2),
            cooldown_max: Duration::from_secs(60),
            max_rotations: 6,
            max_transient_retries: 3,
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_secs(5),
            max_consecutive_failures: 5,
            acquire_timeout: None,
        }
    }
}

impl PoolConfig {
    /// Read overrides from `{PREFIX}_POOL_*` environment variables.
    pub fn from_env(prefix: &str) -> Self {
        let defaults = Self::default();
        let ms = |name: &str, default: Duration| {
            env_parse::<u64>(&format!("{prefix}_POOL_{name}"))
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            cooldown_base: ms("COOLDOWN_BASE_MS", defaults.cooldown_base),
            cooldown_max: ms("COOLDOWN_MAX_MS", defaults.cooldown_max),
            max_rotations: env_parse(&format!("{prefix}_POOL_MAX_ROTATIONS"))
                .unwrap_or(defaults.max_rotations),
            max_transient_retries: env_parse(&format!("{prefix}_POOL_MAX_RETRIES"))
                .unwrap_or(defaults.max_transient_retries),
            backoff_base: ms("BACKOFF_BASE_MS", defaults.backoff_base),
            backoff_max: ms("BACKOFF_MAX_MS", defaults.backoff_max),
            max_consecutive_failures: env_parse(&format!("{prefix}_POOL_MAX_FAILURES"))
                .unwrap_or(defaults.max_consecutive_failures),
            acquire_timeout: env_parse::<u64>(&format!("{prefix}_POOL_ACQUIRE_TIMEOUT_MS"))
                .map(Duration::from_millis),
        }
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Comma-separated key list from `primary`, or from `fallback` when unset.
///
/// Duplicates and blanks are dropped; order is preserved.
pub fn keys_from_env(primary: &str, fallback: &str) -> Vec<ApiKey> {
    let raw = std::env::var(primary)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok())
        .unwrap_or_default();

    let mut keys: Vec<ApiKey> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let key = ApiKey::new(part);
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}
