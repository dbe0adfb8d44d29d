//! Reconnect backoff policy for the host channel.
//!
//! Delay for the Nth scheduled attempt (1-based) is
//! `min(initial * 2^(N-1), max)`; after `max_attempts` scheduled attempts
//! no further automatic reconnects happen.

use serde::{Deserialize, Serialize};

/// Default initial reconnect delay in milliseconds.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;

/// Default reconnect delay ceiling in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Default number of automatic reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt.
    pub initial_delay_ms: u64,
    /// Ceiling applied to every computed delay.
    pub max_delay_ms: u64,
    /// Scheduled attempts allowed before the connection gives up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay for a reconnect scheduled after `attempts` previous attempts.
    ///
    /// Saturates instead of overflowing for large attempt counts.
    pub fn delay_for_attempt(&self, attempts: u32) -> u64 {
        let factor = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
        self.initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    /// Whether another automatic attempt is allowed after `attempts` attempts.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
