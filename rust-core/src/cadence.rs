//! Fixed-interval cadence tracking.
//!
//! Hosts rarely deliver timer callbacks at exactly the configured rate. A
//! [`Cadence`] lets the monitor be polled at any rate and reports when the
//! next interval has elapsed, measured from the last time it fired.

/// Tracks when a periodic action is next due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    interval_ms: u64,
    last_fired_ms: Option<u64>,
}

impl Cadence {
    /// Create a cadence that is immediately due.
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            last_fired_ms: None,
        }
    }

    /// True when at least one interval has elapsed since the last firing.
    ///
    /// A clock that goes backwards makes the cadence due immediately.
    pub fn is_due(&self, now_ms: u64) -> bool {
        match self.last_fired_ms {
            None => true,
            Some(last) if now_ms < last => true,
            Some(last) => now_ms - last >= self.interval_ms,
        }
    }

    /// Fire if due. Returns whether it fired.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if !self.is_due(now_ms) {
            return false;
        }
        self.last_fired_ms = Some(now_ms);
        true
    }

    /// Forget the last firing so the next poll fires.
    pub fn reset(&mut self) {
        self.last_fired_ms = None;
    }

    /// Interval in milliseconds.
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Time of the last firing.
    pub fn last_fired_ms(&self) -> Option<u64> {
        self.last_fired_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_poll_fires() {
        let mut cadence = Cadence::new(100);
        assert!(cadence.poll(0));
        assert_eq!(cadence.last_fired_ms(), Some(0));
    }

    #[test]
    fn test_fires_once_per_interval() {
        let mut cadence = Cadence::new(100);
        let fired: Vec<u64> = (0..=350).step_by(20).filter(|&t| cadence.poll(t)).collect();
        assert_eq!(fired, vec![0, 100, 200, 300]);
    }

    #[test]
    fn test_jittered_callbacks() {
        let mut cadence = Cadence::new(100);
        assert!(cadence.poll(5));
        assert!(!cadence.poll(99));
        assert!(cadence.poll(110));
        assert!(!cadence.poll(205));
        assert!(cadence.poll(215));
    }

    #[test]
    fn test_clock_regression_fires() {
        let mut cadence = Cadence::new(100);
        cadence.poll(1000);
        assert!(cadence.poll(10));
    }

    #[test]
    fn test_reset_and_zero_interval() {
        let mut cadence = Cadence::new(0);
        assert_eq!(cadence.interval_ms(), 1);
        cadence.poll(7);
        assert!(!cadence.is_due(7));
        cadence.reset();
        assert!(cadence.is_due(7));
    }
}
