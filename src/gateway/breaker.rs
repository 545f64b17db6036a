//! Process-wide circuit breaker for the AI service
//!
//! Trips on overload signals (429/503) and closes on its own once the
//! cooldown has elapsed. There is no way to close it early: only time does.

use std::sync::{Mutex, PoisonError};
use tokio::time::{Duration, Instant};

/// Longest deadline accepted by `trip`; keeps the clock from overflowing
const MAX_COOLDOWN: Duration = Duration::from_secs(86_400 * 365);

/// Observable breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open { until: Instant },
}

/// Shared open/closed flag with a deadline.
///
/// All reads and writes of the deadline happen under one mutex, so
/// concurrent `trip` and `is_open` calls never observe a torn update.
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    open_until: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while the current time is before the stored deadline
    pub fn is_open(&self) -> bool {
        self.is_open_at(Instant::now())
    }

    pub fn is_open_at(&self, now: Instant) -> bool {
        matches!(self.state_at(now), CircuitState::Open { .. })
    }

    /// Open the circuit for `cooldown`, overwriting any existing deadline.
    pub fn trip(&self, cooldown: Duration) {
        self.trip_at(Instant::now(), cooldown);
    }

    pub fn trip_at(&self, now: Instant, cooldown: Duration) {
        let until = now + cooldown.min(MAX_COOLDOWN);
        let mut guard = self.lock();
        *guard = Some(until);
        drop(guard);
        tracing::warn!(cooldown_ms = cooldown.as_millis(), "Circuit breaker opened");
    }

    pub fn state(&self) -> CircuitState {
        self.state_at(Instant::now())
    }

    pub fn state_at(&self, now: Instant) -> CircuitState {
        let mut guard = self.lock();
        match *guard {
            Some(until) if now < until => CircuitState::Open { until },
            Some(_) => {
                // Deadline passed: close lazily
                *guard = None;
                CircuitState::Closed
            }
            None => CircuitState::Closed,
        }
    }

    /// Time left until the circuit closes, if open
    pub fn remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        match self.state_at(now) {
            CircuitState::Open { until } => Some(until - now),
            CircuitState::Closed => None,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.open_until.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
