//! Backoff delay calculation between retry attempts

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay strategy between retry attempts.
///
/// A multiplier of 1.0 gives a constant delay; anything larger grows the
/// delay exponentially up to `max_ms`. A zero delay is allowed and means
/// "retry immediately after yielding".
///
/// # Example
///
/// ```
/// use sqlbatch::BackoffStrategy;
/// use std::time::Duration;
///
/// let backoff = BackoffStrategy::exponential(100, 1_000);
///
/// assert_eq!(backoff.calculate_delay(0), Duration::from_millis(100));
/// assert_eq!(backoff.calculate_delay(1), Duration::from_millis(200));
/// assert_eq!(backoff.calculate_delay(10), Duration::from_millis(1_000));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffStrategy {
    /// Delay before the first retry in milliseconds
    initial_ms: u64,
    /// Cap for exponential growth in milliseconds
    max_ms: u64,
    /// Growth factor per attempt (1.0 = constant)
    multiplier: f64,
    /// Randomize delays by up to +/-25%
    jitter: bool,
}

impl BackoffStrategy {
    /// The same delay before every retry.
    pub fn constant(delay_ms: u64) -> Self {
        Self {
            initial_ms: delay_ms,
            max_ms: delay_ms,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Delay doubling per attempt, capped at `max_ms`.
    pub fn exponential(initial_ms: u64, max_ms: u64) -> Self {
        Self {
            initial_ms,
            max_ms: max_ms.max(initial_ms),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// No delay at all between attempts.
    pub fn immediate() -> Self {
        Self::constant(0)
    }

    /// Set the growth factor; values below 1.0 are raised to 1.0.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (0 = first retry).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_ms as f64) * self.multiplier.powi(attempt as i32);
        let capped_ms = delay_ms.min(self.max_ms as f64) as u64;

        if !self.jitter {
            return Duration::from_millis(capped_ms);
        }

        // uniform over [capped - 25%, capped + 25%]
        let spread = capped_ms / 4;
        let offset = (jitter_fraction(attempt) * (2 * spread) as f64) as u64;
        let final_ms = capped_ms - spread + offset;

        Duration::from_millis(final_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn has_jitter(&self) -> bool {
        self.jitter
    }

    pub fn is_constant(&self) -> bool {
        self.multiplier == 1.0 || self.initial_ms == self.max_ms
    }
}

impl Default for BackoffStrategy {
    /// One second between attempts, like most driver-level retry loops.
    fn default() -> Self {
        Self::constant(1_000)
    }
}

/// Fraction in [0, 1) drawn from a randomly seeded hasher.
fn jitter_fraction(attempt: u32) -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::BuildHasher;

    let bits = RandomState::new().hash_one(attempt);
    (bits >> 11) as f64 / (1u64 << 53) as f64
}
