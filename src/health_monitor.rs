use std::time::{Duration, Instant};

/// Health transitions worth logging exactly once.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HealthChange {
    WentSilent { failures: u32, silent_for: Duration },
    Recovered { failures: u32 },
}

/// Tracks read health for the sample source driving the fusion loop
#[derive(Clone, Debug)]
pub struct SensorHealth {
    pub name: String,
    pub silence_threshold: Duration,
    last_update: Instant,
    consecutive_failures: u32,
    reported_silent: bool,
}

impl SensorHealth {
    pub fn new(name: &str, silence_threshold: Duration) -> Self {
        SensorHealth {
            name: name.to_string(),
            silence_threshold,
            last_update: Instant::now(),
            consecutive_failures: 0,
            reported_silent: false,
        }
    }

    /// Record a good sample.
    pub fn update(&mut self) -> Option<HealthChange> {
        let failures = self.consecutive_failures;
        self.last_update = Instant::now();
        self.consecutive_failures = 0;

        if self.reported_silent {
            self.reported_silent = false;
            return Some(HealthChange::Recovered { failures });
        }
        None
    }

    /// Record a failed or timed-out read.
    pub fn record_failure(&mut self) -> Option<HealthChange> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if !self.reported_silent && self.is_silent() {
            self.reported_silent = true;
            return Some(HealthChange::WentSilent {
                failures: self.consecutive_failures,
                silent_for: self.time_since_last_update(),
            });
        }
        None
    }

    pub fn time_since_last_update(&self) -> Duration {
        self.last_update.elapsed()
    }

    pub fn is_silent(&self) -> bool {
        self.time_since_last_update() > self.silence_threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Format health status for logging
    pub fn format_status(&self) -> String {
        if self.is_silent() {
            format!(
                "{} ⚠ (silent {:.1}s, {} failed reads)",
                self.name,
                self.time_since_last_update().as_secs_f64(),
                self.consecutive_failures
            )
        } else {
            format!("{} ✓", self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_sensor_health_detection() {
        let mut health = SensorHealth::new("test", Duration::from_millis(50));

        // Initially healthy (just created)
        assert!(!health.is_silent());
        assert_eq!(health.record_failure(), None);

        thread::sleep(Duration::from_millis(80));

        assert!(health.is_silent());
        let change = health.record_failure();
        assert!(matches!(change, Some(HealthChange::WentSilent { failures: 2, .. })));

        // Reported once only
        assert_eq!(health.record_failure(), None);

        assert_eq!(health.update(), Some(HealthChange::Recovered { failures: 3 }));
        assert!(!health.is_silent());
        assert_eq!(health.consecutive_failures(), 0);
    }

    #[test]
    fn test_update_without_silence_reports_nothing() {
        let mut health = SensorHealth::new("test", Duration::from_secs(10));
        health.record_failure();
        assert_eq!(health.update(), None);
        assert!(health.format_status().contains("✓"));
    }
}
