//! Utility module
//!
//! This module provides common utilities and helper functions used
//! throughout the library.

use std::time::{Duration, Instant};

/// Fires at a fixed cadence when polled
#[derive(Debug, Clone, Copy)]
pub struct IntervalTimer {
    interval: Duration,
    last: Instant,
}

impl IntervalTimer {
    pub fn new(interval: Duration, now: Instant) -> Self {
        IntervalTimer { interval, last: now }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last) >= self.interval
    }

    /// Restarts the timer, returning the time since it last fired
    pub fn reset(&mut self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last);
        self.last = now;
        elapsed
    }

    /// Resets the timer and returns the elapsed time if it is due
    pub fn fire(&mut self, now: Instant) -> Option<Duration> {
        if self.is_due(now) {
            Some(self.reset(now))
        } else {
            None
        }
    }
}

/// Installs the fmt subscriber on stderr
///
/// Library code only emits events; binaries call this once at startup.
/// A subscriber that is already installed is left in place.
pub fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_timer() {
        let start = Instant::now();
        let mut timer = IntervalTimer::new(Duration::from_millis(100), start);

        assert!(!timer.is_due(start + Duration::from_millis(99)));
        assert_eq!(timer.fire(start + Duration::from_millis(50)), None);
        assert_eq!(
            timer.fire(start + Duration::from_millis(130)),
            Some(Duration::from_millis(130))
        );
        assert_eq!(timer.fire(start + Duration::from_millis(200)), None);
        assert_eq!(
            timer.fire(start + Duration::from_millis(230)),
            Some(Duration::from_millis(100))
        );
    }

    #[test]
    fn test_timer_ignores_clock_going_back() {
        let start = Instant::now() + Duration::from_secs(10);
        let mut timer = IntervalTimer::new(Duration::from_secs(1), start);
        assert_eq!(timer.fire(start - Duration::from_secs(5)), None);
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing(true);
        init_tracing(false);
        tracing::debug!("still usable");
    }
}
