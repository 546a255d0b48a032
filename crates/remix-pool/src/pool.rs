//! The shared credential pool.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff;
use crate::classify::{FailureKind, RetryClassify};
use crate::config::PoolConfig;
use crate::error::{AcquireError, PoolError, PoolResult};
use crate::key::ApiKey;
use crate::metrics;
use crate::slot::{Slot, SlotSnapshot, SlotState};

struct PoolState {
    slots: Vec<Slot>,
    /// Preferred slot. Advances only when that slot is rate limited or exhausted.
    cursor: usize,
}

impl PoolState {
    fn refresh(&mut self, now: Instant, pool: &str) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.refresh(now) {
                debug!(pool = %pool, slot = index, "Credential slot cooled down");
            }
        }
    }

    fn all_exhausted(&self) -> bool {
        self.slots.iter().all(|s| s.state == SlotState::Exhausted)
    }

    /// First selectable slot in round-robin order from the cursor.
    fn pick(&self) -> Option<usize> {
        let n = self.slots.len();
        (0..n)
            .map(|offset| (self.cursor + offset) % n)
            .find(|&i| self.slots[i].is_selectable())
    }

    fn earliest_cooldown(&self) -> Option<Instant> {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::CoolingDown)
            .filter_map(|s| s.cooldown_until)
            .min()
    }

    fn move_cursor_past(&mut self, index: usize) {
        if self.cursor == index && !self.slots.is_empty() {
            self.cursor = (index + 1) % self.slots.len();
        }
    }
}

struct Inner {
    name: String,
    config: PoolConfig,
    state: Mutex<PoolState>,
    notify: Notify,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Rotating set of API keys for one external service.
///
/// Cheap to clone; clones share slot state.
#[derive(Clone)]
pub struct CredentialPool {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPool")
            .field("name", &self.inner.name)
            .field("slots", &self.snapshot())
            .finish()
    }
}

impl CredentialPool {
    pub fn new(name: impl Into<String>, keys: Vec<ApiKey>, config: PoolConfig) -> Self {
        let name = name.into();
        info!(pool = %name, slots = keys.len(), "Credential pool created");
        Self {
            inner: Arc::new(Inner {
                name,
                config,
                state: Mutex::new(PoolState {
                    slots: keys.into_iter().map(Slot::new).collect(),
                    cursor: 0,
                }),
                notify: Notify::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Current state of every slot.
    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        let now = Instant::now();
        let mut state = self.inner.lock();
        state.refresh(now, &self.inner.name);
        state
            .slots
            .iter()
            .enumerate()
            .map(|(i, s)| s.snapshot(i, now))
            .collect()
    }

    /// Take the first available slot, waiting if all are busy or cooling.
    ///
    /// Fails once every slot is exhausted, or when the configured acquire
    /// timeout elapses first.
    pub async fn acquire(&self) -> Result<SlotLease, AcquireError> {
        match self.inner.config.acquire_timeout {
            Some(limit) => self.acquire_with_timeout(limit).await,
            None => self.acquire_wait().await,
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up after `limit`.
    pub async fn acquire_with_timeout(&self, limit: Duration) -> Result<SlotLease, AcquireError> {
        tokio::time::timeout(limit, self.acquire_wait())
            .await
            .map_err(|_| AcquireError::Timeout(limit))?
    }

    async fn acquire_wait(&self) -> Result<SlotLease, AcquireError> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = {
                let mut state = self.inner.lock();
                state.refresh(Instant::now(), &self.inner.name);

                if state.all_exhausted() {
                    return Err(AcquireError::Exhausted(self.inner.name.clone()));
                }

                if let Some(index) = state.pick() {
                    let slot = &mut state.slots[index];
                    slot.in_flight = true;
                    return Ok(SlotLease {
                        inner: Arc::clone(&self.inner),
                        index,
                        key: slot.key.clone(),
                    });
                }

                state.earliest_cooldown()
            };

            match wake_at {
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Run one logical operation against the service.
    ///
    /// `op` is invoked with the key of the slot currently held. Rate limits
    /// cool the slot down and rotate to another one. Transient failures are
    /// retried on the same slot. Everything else returns at once, and only
    /// a rejected key counts against the slot.
    pub async fn call<T, E, F, Fut>(&self, operation: &str, mut op: F) -> PoolResult<T, E>
    where
        F: FnMut(ApiKey) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassify + Display,
    {
        let pool = self.inner.name.as_str();
        let config = &self.inner.config;

        let mut lease = match self.acquire().await {
            Ok(lease) => lease,
            Err(e) => {
                metrics::record_call(pool, operation, "unavailable");
                return Err(e.into());
            }
        };
        let mut attempts = 0u32;
        let mut rotations = 0u32;
        let mut transient_retries = 0u32;

        loop {
            attempts += 1;
            debug!(pool, operation, slot = lease.index, attempt = attempts, "Pooled call");

            let err = match op(lease.key.clone()).await {
                Ok(value) => {
                    lease.succeeded();
                    metrics::record_call(pool, operation, "success");
                    return Ok(value);
                }
                Err(err) => err,
            };

            match err.failure_kind() {
                FailureKind::RateLimited { retry_after } => {
                    let cooldown = lease.rate_limited(retry_after);
                    metrics::record_rate_limit(pool, lease.index);
                    warn!(
                        pool,
                        operation,
                        slot = lease.index,
                        key = %lease.key,
                        cooldown_ms = cooldown.as_millis() as u64,
                        "Rate limited, rotating credential: {}",
                        err
                    );
                    drop(lease);

                    rotations += 1;
                    if rotations > config.max_rotations {
                        metrics::record_call(pool, operation, "rate_limited");
                        return Err(PoolError::RetriesExhausted { attempts, last: err });
                    }

                    lease = match self.acquire().await {
                        Ok(lease) => lease,
                        Err(e) => {
                            metrics::record_call(pool, operation, "unavailable");
                            return Err(e.into());
                        }
                    };
                    transient_retries = 0;
                }
                FailureKind::Transient if transient_retries < config.max_transient_retries => {
                    let delay =
                        backoff::jittered(config.backoff_base, transient_retries, config.backoff_max);
                    transient_retries += 1;
                    metrics::record_retry(pool, operation);
                    warn!(
                        pool,
                        operation,
                        slot = lease.index,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, retrying: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
                FailureKind::Transient => {
                    metrics::record_call(pool, operation, "failed");
                    return Err(PoolError::RetriesExhausted { attempts, last: err });
                }
                FailureKind::Credential => {
                    lease.failed();
                    metrics::record_call(pool, operation, "unauthorized");
                    warn!(
                        pool,
                        operation,
                        slot = lease.index,
                        key = %lease.key,
                        "Credential rejected: {}",
                        err
                    );
                    return Err(PoolError::Call(err));
                }
                FailureKind::Permanent => {
                    metrics::record_call(pool, operation, "rejected");
                    warn!(pool, operation, slot = lease.index, "Non-retryable failure: {}", err);
                    return Err(PoolError::Call(err));
                }
            }
        }
    }
}

/// Exclusive hold on one slot. Released on drop.
pub struct SlotLease {
    inner: Arc<Inner>,
    index: usize,
    key: ApiKey,
}

impl std::fmt::Debug for SlotLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotLease")
            .field("pool", &self.inner.name)
            .field("index", &self.index)
            .field("key", &self.key)
            .finish()
    }
}

impl SlotLease {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn key(&self) -> &ApiKey {
        &self.key
    }

    /// Reset failure counters after a successful call.
    pub fn succeeded(&self) {
        let mut state = self.inner.lock();
        let slot = &mut state.slots[self.index];
        slot.consecutive_failures = 0;
        slot.consecutive_rate_limits = 0;
    }

    /// Put the slot into cooldown. Returns the cooldown applied.
    pub fn rate_limited(&self, retry_after: Option<Duration>) -> Duration {
        let config = &self.inner.config;
        let mut state = self.inner.lock();
        let slot = &mut state.slots[self.index];

        let cooldown = retry_after
            .map(|d| d.min(config.cooldown_max))
            .unwrap_or_else(|| {
                backoff::exponential(
                    config.cooldown_base,
                    slot.consecutive_rate_limits,
                    config.cooldown_max,
                )
            });

        slot.consecutive_rate_limits = slot.consecutive_rate_limits.saturating_add(1);
        if slot.state != SlotState::Exhausted {
            slot.state = SlotState::CoolingDown;
            slot.cooldown_until = Some(Instant::now() + cooldown);
        }
        state.move_cursor_past(self.index);
        cooldown
    }

    /// Count a rejected key against the slot; exhaust it past the threshold.
    pub fn failed(&self) {
        let threshold = self.inner.config.max_consecutive_failures;
        let mut state = self.inner.lock();
        let slot = &mut state.slots[self.index];
        slot.consecutive_failures = slot.consecutive_failures.saturating_add(1);

        if slot.consecutive_failures > threshold && slot.state != SlotState::Exhausted {
            slot.state = SlotState::Exhausted;
            slot.cooldown_until = None;
            warn!(
                pool = %self.inner.name,
                slot = self.index,
                key = %self.key,
                failures = slot.consecutive_failures,
                "Credential slot exhausted"
            );
            metrics::record_slot_exhausted(&self.inner.name, self.index);
            state.move_cursor_past(self.index);
        }
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        {
            let mut state = self.inner.lock();
            state.slots[self.index].in_flight = false;
        }
        self.inner.notify.notify_waiters();
    }
}
