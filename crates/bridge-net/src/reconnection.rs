//! Client-side reconnection with a fixed delay and a bounded attempt count.
//!
//! The peer is LAN-local and its faults fail fast, so delays are linear
//! rather than exponential. [`ReconnectState`] is advanced by the polling
//! tick: time accumulates only while disconnected, an attempt becomes due
//! once [`ReconnectConfig::delay`] has elapsed, and each failure restarts
//! the delay. Any successful handshake or inbound byte resets it.

use std::time::Duration;

/// Configuration for client-side reconnection behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Automatic attempts before the session identity is dropped. Default: 5.
    pub max_attempts: u32,
    /// Time between attempts, and before the first one. Default: 2 s.
    pub delay: Duration,
    /// Polling period of the supervisor task. Default: 100 ms.
    pub tick: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(2),
            tick: Duration::from_millis(100),
        }
    }
}

/// Attempt counter in `[0, max_attempts]` plus time since the last attempt.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    config: ReconnectConfig,
    attempts: u32,
    elapsed: Duration,
}

impl ReconnectState {
    /// Create a new state from the given config.
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Advance the timer by `dt`.
    ///
    /// Returns the 1-based number of the attempt that is now due, or `None`
    /// while waiting or once exhausted.
    pub fn poll(&mut self, dt: Duration) -> Option<u32> {
        if self.is_exhausted() {
            return None;
        }
        self.elapsed = self.elapsed.saturating_add(dt);
        if self.elapsed >= self.config.delay {
            Some(self.attempts + 1)
        } else {
            None
        }
    }

    /// Record a failed attempt and restart the delay.
    /// Returns `true` when this failure exhausts the budget.
    pub fn record_failure(&mut self) -> bool {
        self.attempts = (self.attempts + 1).min(self.config.max_attempts);
        self.elapsed = Duration::ZERO;
        self.is_exhausted()
    }

    /// Restart the delay timer without touching the attempt counter.
    pub fn restart_timer(&mut self) {
        self.elapsed = Duration::ZERO;
    }

    /// Reset counter and timer (successful connect, inbound data, fresh session).
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.elapsed = Duration::ZERO;
    }

    /// Return the number of failed attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether no further automatic attempts will be made.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.config.max_attempts
    }

    /// Time left before the next attempt is due.
    pub fn remaining(&self) -> Duration {
        self.config.delay.saturating_sub(self.elapsed)
    }

    /// The configuration this state was built from.
    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts,
            delay: Duration::from_secs(2),
            tick: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_attempt_due_only_after_delay() {
        let mut state = ReconnectState::new(config(5));
        assert_eq!(state.poll(Duration::from_millis(1500)), None);
        assert_eq!(state.remaining(), Duration::from_millis(500));
        assert_eq!(state.poll(Duration::from_millis(500)), Some(1));
    }

    #[test]
    fn test_delay_is_linear_not_exponential() {
        let mut state = ReconnectState::new(config(10));
        for expected in 1..=4 {
            assert_eq!(state.poll(Duration::from_millis(1999)), None);
            assert_eq!(state.poll(Duration::from_millis(1)), Some(expected));
            state.record_failure();
        }
    }

    #[test]
    fn test_max_attempts_exhausted() {
        let mut state = ReconnectState::new(config(3));
        let tick = Duration::from_secs(2);

        assert_eq!(state.poll(tick), Some(1));
        assert!(!state.record_failure());
        assert_eq!(state.poll(tick), Some(2));
        assert!(!state.record_failure());
        assert_eq!(state.poll(tick), Some(3));
        assert!(state.record_failure());

        assert_eq!(state.poll(Duration::from_secs(60)), None);
        assert_eq!(state.attempts(), 3);
    }

    #[test]
    fn test_counter_never_exceeds_max() {
        let mut state = ReconnectState::new(config(2));
        for _ in 0..5 {
            state.record_failure();
        }
        assert_eq!(state.attempts(), 2);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut state = ReconnectState::new(config(5));
        state.poll(Duration::from_secs(3));
        state.record_failure();
        state.record_failure();
        assert_eq!(state.attempts(), 2);

        state.reset();
        assert_eq!(state.attempts(), 0);
        assert_eq!(state.remaining(), Duration::from_secs(2));
    }

    #[test]
    fn test_restart_timer_keeps_attempts() {
        let mut state = ReconnectState::new(config(5));
        state.record_failure();
        state.poll(Duration::from_secs(1));
        state.restart_timer();
        assert_eq!(state.attempts(), 1);
        assert_eq!(state.remaining(), Duration::from_secs(2));
    }

    #[test]
    fn test_defaults() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.delay, Duration::from_secs(2));
    }
}
