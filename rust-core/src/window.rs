//! Sliding sample window for tilt smoothing.
//!
//! A fixed-capacity circular buffer of the most recent roll samples. Pushing
//! is O(1) with no allocation after construction; once the buffer is full
//! the oldest sample is overwritten (strict FIFO).
//!
//! Statistics are recomputed on demand from the window contents, so they are
//! a pure function of what the window currently holds.

use serde::{Deserialize, Serialize};

/// Largest window accepted by configuration (about 22 minutes at 50 Hz).
pub const MAX_WINDOW_CAPACITY: usize = 65_536;

/// Dispersion statistic used as the stability proxy.
///
/// Stability thresholds are calibrated per metric. A range threshold is
/// roughly twice a standard-deviation threshold for the same jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispersionMetric {
    /// `max − min` over the window.
    #[default]
    Range,
    /// Population standard deviation over the window.
    StdDev,
}

/// Statistics over the current window contents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSnapshot {
    /// Arithmetic mean of the samples.
    pub mean: f64,
    /// Dispersion according to the window's metric.
    pub dispersion: f64,
    /// Number of samples the statistics were computed from.
    pub count: usize,
}

/// Fixed-capacity FIFO window of scalar samples.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    buffer: Vec<f64>,
    capacity: usize,
    /// Slot the next push writes to.
    head: usize,
    len: usize,
    metric: DispersionMetric,
}

impl SampleWindow {
    /// Create an empty window.
    ///
    /// Capacity is clamped to `1..=MAX_WINDOW_CAPACITY`; configuration
    /// validation rejects values outside that range before they get here.
    pub fn new(capacity: usize, metric: DispersionMetric) -> Self {
        let capacity = capacity.clamp(1, MAX_WINDOW_CAPACITY);
        Self {
            buffer: vec![0.0; capacity],
            capacity,
            head: 0,
            len: 0,
            metric,
        }
    }

    /// Push a sample, evicting the oldest one when full.
    pub fn push(&mut self, value: f64) {
        self.buffer[self.head] = value;
        self.head = (self.head + 1) % self.capacity;
        if self.len < self.capacity {
            self.len += 1;
        }
    }

    /// Statistics over the current contents, or `None` while empty.
    pub fn snapshot(&self) -> Option<WindowSnapshot> {
        if self.len == 0 {
            return None;
        }

        // Shift by the oldest sample so that a constant window yields an
        // exact zero spread and an exact mean.
        let shift = self.oldest()?;
        let n = self.len as f64;

        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for value in self.iter() {
            let d = value - shift;
            sum += d;
            sum_sq += d * d;
            min = min.min(value);
            max = max.max(value);
        }

        let mean_offset = sum / n;
        let dispersion = match self.metric {
            DispersionMetric::Range => max - min,
            DispersionMetric::StdDev => (sum_sq / n - mean_offset * mean_offset).max(0.0).sqrt(),
        };

        Some(WindowSnapshot {
            mean: shift + mean_offset,
            dispersion,
            count: self.len,
        })
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let start = (self.head + self.capacity - self.len) % self.capacity;
        (0..self.len).map(move |i| self.buffer[(start + i) % self.capacity])
    }

    /// Oldest sample still in the window.
    pub fn oldest(&self) -> Option<f64> {
        self.iter().next()
    }

    /// Most recently pushed sample.
    pub fn latest(&self) -> Option<f64> {
        if self.len == 0 {
            return None;
        }
        Some(self.buffer[(self.head + self.capacity - 1) % self.capacity])
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True while no sample has been pushed since construction or reset.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of samples held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Dispersion metric used by [`snapshot`](Self::snapshot).
    pub fn metric(&self) -> DispersionMetric {
        self.metric
    }

    /// Drop all samples.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_len_never_exceeds_capacity(
            capacity in 1usize..64,
            values in prop::collection::vec(-3.2f64..3.2, 0..300)
        ) {
            let mut window = SampleWindow::new(capacity, DispersionMetric::Range);
            for &v in &values {
                window.push(v);
            }
            prop_assert_eq!(window.len(), values.len().min(capacity));
        }

        #[test]
        fn prop_mean_matches_last_n(
            capacity in 1usize..64,
            values in prop::collection::vec(-3.2f64..3.2, 1..300)
        ) {
            let mut window = SampleWindow::new(capacity, DispersionMetric::StdDev);
            for &v in &values {
                window.push(v);
            }
            let tail = &values[values.len().saturating_sub(capacity)..];
            let expected = tail.iter().sum::<f64>() / tail.len() as f64;
            let snap = window.snapshot().unwrap();
            prop_assert!((snap.mean - expected).abs() < 1e-9);
            prop_assert!(snap.dispersion >= 0.0);
        }

        #[test]
        fn prop_range_bounds_std_dev(
            values in prop::collection::vec(-3.2f64..3.2, 1..100)
        ) {
            let mut range = SampleWindow::new(values.len(), DispersionMetric::Range);
            let mut std_dev = SampleWindow::new(values.len(), DispersionMetric::StdDev);
            for &v in &values {
                range.push(v);
                std_dev.push(v);
            }
            let r = range.snapshot().unwrap().dispersion;
            let s = std_dev.snapshot().unwrap().dispersion;
            prop_assert!(s <= r + 1e-9);
        }
    }
}
