//! # Engine configuration.
//!
//! Provides [`EngineConfig`] centralized settings for one engine instance.
//!
//! Config is used in two ways:
//! 1. **Engine creation**: `Engine::builder(handler).with_config(cfg)`
//! 2. **Policy defaults**: handlers read them through `Scope::config()`.
//!
//! ## Sentinel values
//! - `effect_capacity = 0` and `bus_capacity = 0` are clamped to 1.

use std::time::Duration;

use crate::policies::RetryPolicy;

/// Configuration for one engine instance.
///
/// ## Field semantics
/// - `effect_capacity`: bounded effect buffer size; overflow evicts the oldest (min 1)
/// - `bus_capacity`: runtime event bus ring buffer size (min 1)
/// - `retry`: default retry policy
/// - `debounce`: default quiescence window
/// - `throttle`: default cooldown window
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Maximum number of buffered, undrained effects.
    ///
    /// When full, the oldest buffered effect is evicted to admit the newest.
    pub effect_capacity: usize,

    /// Capacity of the runtime event bus broadcast ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages
    /// skip older items.
    pub bus_capacity: usize,

    /// Default retry policy.
    pub retry: RetryPolicy,

    /// Default debounce window.
    pub debounce: Duration,

    /// Default throttle cooldown.
    pub throttle: Duration,
}

impl EngineConfig {
    /// Returns the effect capacity clamped to a minimum of 1.
    #[inline]
    pub fn effect_capacity_clamped(&self) -> usize {
        self.effect_capacity.max(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for EngineConfig {
    /// Default configuration:
    ///
    /// - `effect_capacity = 64`
    /// - `bus_capacity = 1024`
    /// - `retry = RetryPolicy::default()` (3 retries, 1s linear backoff)
    /// - `debounce = 300ms`
    /// - `throttle = 1000ms`
    fn default() -> Self {
        Self {
            effect_capacity: 64,
            bus_capacity: 1024,
            retry: RetryPolicy::default(),
            debounce: Duration::from_millis(300),
            throttle: Duration::from_millis(1000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacities_are_clamped() {
        let cfg = EngineConfig {
            effect_capacity: 0,
            bus_capacity: 0,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.effect_capacity_clamped(), 1);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
