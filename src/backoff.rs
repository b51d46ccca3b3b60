use std::time::Duration;

/// Reconnect cooldown: grows by 1.5x per failed attempt up to a cap and
/// snaps back to the base after a successful connection.
#[derive(Clone, Debug)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Backoff {
            base,
            max: max.max(base),
            current: base,
            attempts: 0,
        }
    }

    /// Record a failed attempt and return how long to wait before the next one.
    pub fn record_failure(&mut self) -> Duration {
        let wait = self.current;
        self.attempts += 1;
        self.current = Duration::from_secs_f64(
            (self.current.as_secs_f64() * 1.5).min(self.max.as_secs_f64()),
        );
        wait
    }

    pub fn record_success(&mut self) {
        self.attempts = 0;
        self.current = self.base;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));

        let first = backoff.record_failure();
        assert_eq!(first, Duration::from_secs(1));
        assert_eq!(backoff.attempts(), 1);

        let second = backoff.record_failure();
        assert!(second > first);
        assert!((second.as_secs_f64() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_backoff_is_capped() {
        let mut backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(30));
        for _ in 0..20 {
            backoff.record_failure();
        }
        assert_eq!(backoff.record_failure(), Duration::from_secs(30));
    }

    #[test]
    fn test_success_resets() {
        let mut backoff = Backoff::default();
        backoff.record_failure();
        backoff.record_failure();
        backoff.record_success();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.record_failure(), Duration::from_secs(2));
    }
}
