//! Reconnect backoff for the session loop.
//!
//! Delay doubles after each failed attempt, capped, with jitter so a fleet
//! of subagents restarting after a master outage does not reconnect in
//! lockstep.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Exponential backoff with jitter.
///
/// The default matches the session's reconnect policy: 1 second base,
/// 60 second cap, 25% jitter, unbounded attempts.
///
/// # Examples
///
/// ```
/// use async_agentx::backoff::Backoff;
/// use std::time::Duration;
///
/// let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1), 0.0);
/// assert_eq!(backoff.next_delay(), Duration::from_millis(100));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(200));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(400));
/// backoff.reset();
/// assert_eq!(backoff.next_delay(), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    jitter: f64,
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), 0.25)
    }
}

impl Backoff {
    /// Create a backoff schedule. `jitter` is clamped to [0.0, 1.0] and
    /// means plus or minus that fraction of the computed delay.
    pub fn new(initial: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            initial,
            max,
            jitter: jitter.clamp(0.0, 1.0),
            attempt: 0,
        }
    }

    /// The delay before the next attempt, advancing the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.peek();
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// The delay the next call to [`next_delay`](Self::next_delay) returns.
    fn peek(&self) -> Duration {
        let shift = self.attempt.min(31);
        let multiplier = 1u32.checked_shl(shift).unwrap_or(u32::MAX);
        let base = self.initial.saturating_mul(multiplier);
        let capped = base.min(self.max);
        Duration::from_secs_f64(capped.as_secs_f64() * jitter_factor(self.jitter))
    }

    /// Restart the schedule after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Global counter for jitter generation.
static JITTER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Compute a jitter factor in the range [1-jitter, 1+jitter].
///
/// Uses a multiplicative hash of an atomic counter. Retry desynchronization
/// does not need true randomness.
fn jitter_factor(jitter: f64) -> f64 {
    if jitter <= 0.0 {
        return 1.0;
    }
    let counter = JITTER_COUNTER.fetch_add(1, Ordering::Relaxed);
    let hash = counter.wrapping_mul(0x5851f42d4c957f2d);
    let random = (hash >> 11) as f64 / ((1u64 << 53) as f64);
    1.0 + (random - 0.5) * 2.0 * jitter
}
