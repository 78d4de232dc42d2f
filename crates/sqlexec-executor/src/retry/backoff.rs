//! Delay between open attempts

use std::time::Duration;

/// Doubling delay between open retries, capped at a maximum.
///
/// ```
/// use sqlexec_executor::BackoffStrategy;
/// use std::time::Duration;
///
/// let backoff = BackoffStrategy::new(50, 2_000);
///
/// assert_eq!(backoff.calculate_delay(0), Duration::from_millis(50));
/// assert_eq!(backoff.calculate_delay(1), Duration::from_millis(100));
/// assert_eq!(backoff.calculate_delay(20), Duration::from_millis(2_000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffStrategy {
    first: Duration,
    ceiling: Duration,
}

impl BackoffStrategy {
    /// The first delay is at least 1ms and the cap never falls below it
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        let first = Duration::from_millis(initial_ms.max(1));
        Self {
            first,
            ceiling: Duration::from_millis(max_ms).max(first),
        }
    }

    /// Delay before retry number `retry` (0 = first retry)
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.first
            .checked_mul(factor)
            .map_or(self.ceiling, |delay| delay.min(self.ceiling))
    }
}
