// Reconnect schedule for a lost MIDI port
//
// Delays double from `base` up to `cap`; after `attempts` tries the monitor
// gives up until the user reconnects by hand.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff limits, as stored in the `midi` config section
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    pub fn strategy(&self) -> ReconnectionStrategy {
        ReconnectionStrategy::with_limits(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms.max(self.base_delay_ms)),
            self.attempts,
        )
    }
}

/// Running state of one reconnect sequence
#[derive(Debug, Clone)]
pub struct ReconnectionStrategy {
    base: Duration,
    cap: Duration,
    limit: u32,
    tried: u32,
}

impl ReconnectionStrategy {
    pub fn new() -> Self {
        ReconnectPolicy::default().strategy()
    }

    pub fn with_limits(base: Duration, cap: Duration, limit: u32) -> Self {
        Self {
            base,
            cap,
            limit,
            tried: 0,
        }
    }

    /// Wait before the next try, `None` once every attempt is used
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        let delay = match 1u32.checked_shl(self.tried) {
            Some(factor) => self.base.saturating_mul(factor).min(self.cap),
            None => self.cap,
        };
        self.tried += 1;
        Some(delay)
    }

    /// Start a fresh sequence after the port vanished again
    pub fn reset(&mut self) {
        self.tried = 0;
    }

    pub fn should_retry(&self) -> bool {
        self.tried < self.limit
    }

    pub fn current_attempt(&self) -> u32 {
        self.tried
    }
}

impl Default for ReconnectionStrategy {
    fn default() -> Self {
        Self::new()
    }
}
