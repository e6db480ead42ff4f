//! Reconnection backoff with exponential growth and full jitter.

use std::time::Duration;

use rand::Rng;

/// Reconnection policy with exponential backoff and full jitter.
///
/// Implements the "Full Jitter" algorithm recommended by AWS:
/// <https://aws.amazon.com/blogs/architecture/exponential-backoff-and-jitter/>
#[derive(Debug)]
pub struct ReconnectPolicy {
    /// Initial backoff duration.
    initial_backoff: Duration,
    /// Maximum backoff duration.
    max_backoff: Duration,
    /// Backoff multiplier.
    multiplier: f64,
    /// Maximum attempts before giving up.
    max_attempts: u32,
    /// Current attempt count.
    current_attempt: u32,
}

impl ReconnectPolicy {
    /// Create a policy with explicit parameters.
    #[must_use]
    pub const fn new(
        initial_backoff: Duration,
        max_backoff: Duration,
        multiplier: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            multiplier,
            max_attempts,
            current_attempt: 0,
        }
    }

    /// Calculate the next backoff duration with jitter.
    ///
    /// Returns `None` if max attempts have been exceeded.
    #[must_use]
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }

        let base_ms = self.initial_backoff.as_millis() as f64;
        let exponential = base_ms
            * self
                .multiplier
                .powi(i32::try_from(self.current_attempt).unwrap_or(i32::MAX));
        let capped = exponential.min(self.max_backoff.as_millis() as f64);

        // Full jitter: random value between 0 and capped
        let jitter = rand::rng().random_range(0.0..=capped);

        self.current_attempt += 1;

        Some(Duration::from_millis(jitter as u64))
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.current_attempt = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    /// Check if reconnection should be attempted.
    #[must_use]
    pub const fn should_reconnect(&self) -> bool {
        self.current_attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_capped() {
        let mut policy =
            ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(5), 10.0, 20);

        for _ in 0..10 {
            let backoff = policy.next_backoff().expect("attempts remain");
            assert!(backoff <= Duration::from_secs(5));
        }
    }

    #[test]
    fn max_attempts_exhausts() {
        let mut policy = ReconnectPolicy::new(
            Duration::from_millis(10),
            Duration::from_millis(100),
            2.0,
            3,
        );

        assert!(policy.next_backoff().is_some());
        assert!(policy.next_backoff().is_some());
        assert!(policy.next_backoff().is_some());
        assert!(policy.next_backoff().is_none());
        assert!(!policy.should_reconnect());
    }

    #[test]
    fn reset_restores_attempts() {
        let mut policy = ReconnectPolicy::new(
            Duration::from_millis(10),
            Duration::from_millis(100),
            2.0,
            1,
        );

        let _ = policy.next_backoff();
        assert!(policy.next_backoff().is_none());

        policy.reset();
        assert_eq!(policy.current_attempt(), 0);
        assert!(policy.next_backoff().is_some());
    }
}
