//! Credential slot state.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::key::ApiKey;

/// Lifecycle state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Available,
    CoolingDown,
    /// Excluded until restart.
    Exhausted,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlotState::Available => "available",
            SlotState::CoolingDown => "cooling_down",
            SlotState::Exhausted => "exhausted",
        };
        write!(f, "{}", s)
    }
}

/// Point-in-time view of one slot for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSnapshot {
    pub index: usize,
    pub key_hint: String,
    pub state: SlotState,
    /// Time left until the slot is available again
    pub cooldown_remaining: Option<Duration>,
    pub in_flight: bool,
    pub consecutive_failures: u32,
}

#[derive(Debug)]
pub(crate) struct Slot {
    pub key: ApiKey,
    pub state: SlotState,
    pub cooldown_until: Option<Instant>,
    pub consecutive_rate_limits: u32,
    pub consecutive_failures: u32,
    pub in_flight: bool,
}

impl Slot {
    pub fn new(key: ApiKey) -> Self {
        Self {
            key,
            state: SlotState::Available,
            cooldown_until: None,
            consecutive_rate_limits: 0,
            consecutive_failures: 0,
            in_flight: false,
        }
    }

    /// Move an elapsed cooldown back to available. Returns true on change.
    pub fn refresh(&mut self, now: Instant) -> bool {
        match (self.state, self.cooldown_until) {
            (SlotState::CoolingDown, Some(until)) if until <= now => {
                self.state = SlotState::Available;
                self.cooldown_until = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_selectable(&self) -> bool {
        self.state == SlotState::Available && !self.in_flight
    }

    pub fn snapshot(&self, index: usize, now: Instant) -> SlotSnapshot {
        SlotSnapshot {
            index,
            key_hint: self.key.hint(),
            state: self.state,
            cooldown_remaining: self
                .cooldown_until
                .map(|until| until.saturating_duration_since(now)),
            in_flight: self.in_flight,
            consecutive_failures: self.consecutive_failures,
        }
    }
}
