//! Reconnect backoff policy.

use std::time::Duration;

use agora_shared::constants::{BACKOFF_BASE_MS, MAX_RECONNECT_ATTEMPTS};

/// Exponential backoff: `base * 2^attempt`, up to a fixed attempt ceiling.
/// Past the ceiling the session goes terminal and stops retrying.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    base: Duration,
    max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self { base, max_attempts }
    }

    /// Delay before the given (zero-based) attempt, or `None` once the
    /// retry budget is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        Some(self.base.saturating_mul(1u32 << attempt.min(16)))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(BACKOFF_BASE_MS),
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_per_attempt() {
        let policy = ReconnectPolicy::new(Duration::from_millis(100), 4);

        assert_eq!(policy.delay_for(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(800)));
    }

    #[test]
    fn test_exhaustion_past_ceiling() {
        let policy = ReconnectPolicy::new(Duration::from_millis(100), 3);

        assert!(policy.delay_for(2).is_some());
        assert_eq!(policy.delay_for(3), None);
        assert_eq!(policy.delay_for(100), None);
    }

    #[test]
    fn test_delays_are_non_decreasing() {
        let policy = ReconnectPolicy::default();
        let mut previous = Duration::ZERO;
        let mut attempt = 0;
        while let Some(delay) = policy.delay_for(attempt) {
            assert!(delay >= previous);
            previous = delay;
            attempt += 1;
        }
        assert_eq!(attempt, policy.max_attempts());
    }
}
