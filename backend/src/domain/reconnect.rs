//! Delay policy between store reconnect attempts.
//!
//! The policy only shapes *when* the next attempt happens. It never caps the
//! number of attempts: a supervised connection is retried for as long as the
//! process lives.

use std::time::Duration;

/// Backoff applied before each reconnect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectBackoff {
    /// Retry as soon as the disconnect is observed.
    #[default]
    Immediate,
    /// Double the delay for every consecutive failed attempt, up to `max`.
    Exponential { initial: Duration, max: Duration },
}

impl ReconnectBackoff {
    /// Build from millisecond settings; `initial_ms == 0` means immediate.
    ///
    /// # Examples
    /// ```
    /// use std::time::Duration;
    /// use social_backend::domain::ReconnectBackoff;
    ///
    /// assert_eq!(ReconnectBackoff::from_millis(0, 30_000), ReconnectBackoff::Immediate);
    /// let policy = ReconnectBackoff::from_millis(100, 1_000);
    /// assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    /// ```
    #[must_use]
    pub fn from_millis(initial_ms: u64, max_ms: u64) -> Self {
        if initial_ms == 0 {
            return Self::Immediate;
        }
        Self::Exponential {
            initial: Duration::from_millis(initial_ms),
            max: Duration::from_millis(max_ms.max(initial_ms)),
        }
    }

    /// Delay before the `attempt`-th consecutive reconnect (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Self::Immediate => Duration::ZERO,
            Self::Exponential { initial, max } => {
                let exponent = attempt.saturating_sub(1).min(31);
                initial
                    .checked_mul(1_u32 << exponent)
                    .map_or(max, |delay| delay.min(max))
            }
        }
    }
}
