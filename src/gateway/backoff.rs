//! Retry delay computation

use rand::Rng;
use std::time::Duration;

const MULTIPLIER: u32 = 2;

/// Randomisation applied on top of the exponential delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// Exact exponential delays
    #[default]
    None,
    /// Uniform in `[0, delay]`
    Full,
}

/// Exponential backoff: `base_delay * 2^(attempt - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base_delay: Duration,
    jitter: Jitter,
}

impl BackoffPolicy {
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            jitter: Jitter::None,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Deterministic delay before retrying after `attempt` failed.
    ///
    /// Attempts are 1-based; 0 is treated as 1. Saturates at `Duration::MAX`.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        MULTIPLIER
            .checked_pow(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Delay actually slept by the retry loop (jitter applied if configured)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let delay = self.compute_delay(attempt);
        match self.jitter {
            Jitter::None => delay,
            Jitter::Full => {
                let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                Duration::from_millis(rng.gen_range(0..=millis))
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_DELAY)
    }
}
