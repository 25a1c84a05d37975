//! # Circuit Breaker Module
//!
//! Stops calling the model service after repeated failures so a dead or
//! throttled endpoint costs nothing but a fallback parse.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::receipt_config::ModelConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker for model calls
///
/// ```text
/// CLOSED ────failures ≥ threshold────► OPEN
///    ▲                                   │
///    └──────────reset timeout────────────┘
/// ```
///
/// Once the reset timeout elapses the counters are cleared and the next call
/// goes through. A success clears the counters at any time.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: u32,
    reset_after: Duration,
}

impl CircuitBreaker {
    /// Create a breaker with explicit settings
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use receipt_ingest::circuit_breaker::CircuitBreaker;
    ///
    /// let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
    /// assert!(!breaker.is_open());
    /// ```
    pub fn new(threshold: u32, reset_after: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            threshold,
            reset_after,
        }
    }

    /// Create a breaker from the model connection settings
    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(
            config.circuit_breaker_threshold,
            Duration::from_secs(config.circuit_breaker_reset_secs),
        )
    }

    /// Whether calls should currently be skipped
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock();
        if state.failure_count < self.threshold {
            return false;
        }

        match state.last_failure_time {
            Some(last_time) if last_time.elapsed() < self.reset_after => true,
            _ => {
                *state = BreakerState::default();
                false
            }
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure_time = Some(Instant::now());
    }

    pub fn record_success(&self) {
        *self.state.lock() = BreakerState::default();
    }

    /// Consecutive failures recorded since the last reset
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }
}
