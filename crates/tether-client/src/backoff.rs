//! Reconnect backoff strategies.
//!
//! A strategy is a pure function of `(attempt count, base delay)` to the
//! delay before the next attempt. No shared state; the same inputs always
//! produce the same delay.

use std::time::Duration;

/// Backoff strategy used between failed reconnect attempts.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tether_client::ReconnectStrategy;
///
/// let base = Duration::from_millis(100);
/// assert_eq!(ReconnectStrategy::Exponential(2).delay(3, base), Duration::from_millis(800));
/// assert_eq!(ReconnectStrategy::Linear(1).delay(3, base), Duration::from_millis(300));
/// assert_eq!(ReconnectStrategy::Static.delay(3, base), base);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectStrategy {
    /// `base_delay * factor^attempt`
    Exponential(u32),
    /// `base_delay * slope * attempt`
    Linear(u32),
    /// `base_delay`, regardless of attempt count
    Static,
}

impl ReconnectStrategy {
    /// Computes the delay before reconnect attempt number `attempt + 1`,
    /// where `attempt` counts the consecutive failures so far. Saturates
    /// instead of overflowing.
    pub fn delay(&self, attempt: u32, base_delay: Duration) -> Duration {
        match self {
            ReconnectStrategy::Exponential(factor) => {
                base_delay.saturating_mul(factor.saturating_pow(attempt))
            }
            ReconnectStrategy::Linear(slope) => {
                base_delay.saturating_mul(slope.saturating_mul(attempt))
            }
            ReconnectStrategy::Static => base_delay,
        }
    }
}

impl Default for ReconnectStrategy {
    fn default() -> Self {
        ReconnectStrategy::Exponential(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(1000);

    #[test]
    fn test_exponential_doubles_each_attempt() {
        let strategy = ReconnectStrategy::Exponential(2);
        assert_eq!(strategy.delay(0, BASE), Duration::from_millis(1000));
        assert_eq!(strategy.delay(1, BASE), Duration::from_millis(2000));
        assert_eq!(strategy.delay(2, BASE), Duration::from_millis(4000));
        assert_eq!(strategy.delay(3, BASE), Duration::from_millis(8000));
    }

    #[test]
    fn test_linear_grows_by_slope() {
        let strategy = ReconnectStrategy::Linear(3);
        assert_eq!(strategy.delay(0, BASE), Duration::ZERO);
        assert_eq!(strategy.delay(1, BASE), Duration::from_millis(3000));
        assert_eq!(strategy.delay(2, BASE), Duration::from_millis(6000));
    }

    #[test]
    fn test_static_ignores_attempt_count() {
        let strategy = ReconnectStrategy::Static;
        assert_eq!(strategy.delay(0, BASE), BASE);
        assert_eq!(strategy.delay(100, BASE), BASE);
    }

    #[test]
    fn test_exponential_saturates_instead_of_overflowing() {
        let strategy = ReconnectStrategy::Exponential(2);
        // 2^64 overflows u32; the delay must clamp, not panic.
        let delay = strategy.delay(64, BASE);
        assert!(delay >= strategy.delay(10, BASE));
    }

    #[test]
    fn test_default_is_exponential_base_two() {
        assert_eq!(ReconnectStrategy::default(), ReconnectStrategy::Exponential(2));
    }

    #[test]
    fn test_same_inputs_same_delay() {
        for strategy in [
            ReconnectStrategy::Exponential(3),
            ReconnectStrategy::Linear(2),
            ReconnectStrategy::Static,
        ] {
            assert_eq!(strategy.delay(5, BASE), strategy.delay(5, BASE));
        }
    }
}
