//! # Retry policy for background operations.
//!
//! [`RetryPolicy`] controls how many times an operation is retried and how long
//! to wait between attempts. It is parameterized by:
//! - [`RetryPolicy::max_retries`] retries after the first attempt;
//! - [`RetryPolicy::base_delay`] the unit of the linear backoff.
//!
//! The wait after failed attempt `n` (0-indexed) is `base_delay × (n + 1)`: the
//! backoff grows **linearly**, not exponentially.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use statevisor::RetryPolicy;
//!
//! let policy = RetryPolicy::new(3, Duration::from_millis(1000));
//!
//! assert_eq!(policy.total_attempts(), 4);
//! assert_eq!(policy.delay_after(0), Duration::from_millis(1000));
//! assert_eq!(policy.delay_after(1), Duration::from_millis(2000));
//! assert_eq!(policy.delay_after(2), Duration::from_millis(3000));
//! ```

use std::time::Duration;

/// Bounded retry with linear backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (`0` = run once).
    pub max_retries: u32,
    /// Backoff unit; attempt `n` waits `base_delay × (n + 1)` before the next one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    /// Returns a policy with:
    /// - `max_retries = 3` (four attempts in total);
    /// - `base_delay = 1000ms`.
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Runs the operation exactly once.
    pub fn once() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Total number of attempts (`max_retries + 1`, saturating).
    #[inline]
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait after failed attempt `attempt` (0-indexed).
    ///
    /// Saturates at [`Duration::MAX`] instead of overflowing.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(attempt.saturating_add(1))
            .unwrap_or(Duration::MAX)
    }

    /// True if another attempt follows failed attempt `attempt` (0-indexed).
    #[inline]
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_three_retries_one_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.total_attempts(), 4);
    }

    #[test]
    fn test_linear_growth() {
        let policy = RetryPolicy::new(5, Duration::from_millis(250));
        let delays: Vec<_> = (0..4).map(|n| policy.delay_after(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_millis(750),
                Duration::from_millis(1000),
            ]
        );
    }

    #[test]
    fn test_has_next_stops_at_max_retries() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        assert!(policy.has_next(0));
        assert!(policy.has_next(1));
        assert!(!policy.has_next(2));
    }

    #[test]
    fn test_once_never_retries() {
        let policy = RetryPolicy::once();
        assert_eq!(policy.total_attempts(), 1);
        assert!(!policy.has_next(0));
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(u64::MAX / 2));
        assert_eq!(policy.delay_after(u32::MAX), Duration::MAX);
        assert_eq!(policy.total_attempts(), u32::MAX);
    }
}
