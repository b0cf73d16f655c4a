//! Tilt analysis: smoothing, stability and periodic telemetry.
//!
//! Raw roll samples arrive on the sensor cadence and go straight into a
//! [`SampleWindow`]. On the (independent, slower) emission cadence the
//! analyzer reads the window, refreshes its [`TiltState`] and produces a
//! [`TiltReport`].
//!
//! Until the window holds the configured minimum number of samples the
//! analyzer reports nothing: a half-filled window is "insufficient data",
//! never a zero reading. The same holds for a session whose sensor is
//! unavailable.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MonitorError, Result};
use crate::types::{EventKind, MonitorEvent, TiltBand, TiltSample, TiltState};
use crate::window::{DispersionMetric, SampleWindow, MAX_WINDOW_CAPACITY};

/// 70 degrees in radians.
pub const DEFAULT_TILT_THRESHOLD_RAD: f64 = 1.2217;

/// Upper edge of the flat band as a fraction of the tilt threshold.
pub const DEFAULT_FLAT_BAND_FRACTION: f64 = 0.1;

/// Parameters for tilt analysis.
///
/// Defaults reproduce a 50 Hz device-motion stream smoothed over 5 seconds
/// and reported 10 times per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TiltConfig {
    /// Nominal interval between raw samples (ms).
    pub sample_interval_ms: u64,

    /// Interval between tilt reports (ms).
    pub report_interval_ms: u64,

    /// Real-time span the window should cover (ms).
    pub window_duration_ms: u64,

    /// Explicit window capacity in samples. Overrides the derived value.
    pub window_capacity: Option<usize>,

    /// Samples required before a report is produced. Defaults to a full window.
    pub min_samples: Option<usize>,

    /// Tilt magnitude treated as "beyond threshold" (rad).
    pub tilt_threshold_rad: f64,

    /// Upper edge of the flat band as a fraction of the tilt threshold.
    pub flat_band_fraction: f64,

    /// Upper edge of the mild band as a fraction of the tilt threshold.
    pub mild_band_fraction: f64,

    /// Dispersion statistic used for oscillation.
    pub dispersion: DispersionMetric,
}

impl Default for TiltConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 20,   // 50 Hz
            report_interval_ms: 100,  // 10 reports per second
            window_duration_ms: 5000, // 250 samples at 50 Hz
            window_capacity: None,
            min_samples: None,
            tilt_threshold_rad: DEFAULT_TILT_THRESHOLD_RAD,
            flat_band_fraction: DEFAULT_FLAT_BAND_FRACTION,
            mild_band_fraction: 1.0,
            dispersion: DispersionMetric::Range,
        }
    }
}

impl TiltConfig {
    /// Window capacity in samples.
    pub fn capacity(&self) -> usize {
        match self.window_capacity {
            Some(capacity) => capacity,
            None => {
                let interval = self.sample_interval_ms.max(1);
                usize::try_from(self.window_duration_ms.div_ceil(interval))
                    .unwrap_or(usize::MAX)
                    .max(1)
            }
        }
    }

    /// Samples required before the first report.
    pub fn required_samples(&self) -> usize {
        self.min_samples.unwrap_or_else(|| self.capacity())
    }

    /// Classify a smoothed tilt by magnitude.
    pub fn classify(&self, smoothed_tilt: f64) -> TiltBand {
        let magnitude = smoothed_tilt.abs();
        if magnitude < self.flat_band_fraction * self.tilt_threshold_rad {
            TiltBand::Flat
        } else if magnitude < self.mild_band_fraction * self.tilt_threshold_rad {
            TiltBand::MildTilt
        } else {
            TiltBand::BeyondThreshold
        }
    }

    /// Reject values that would make the analyzer meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_ms == 0 {
            return Err(MonitorError::invalid("tilt.sample_interval_ms", "must be positive"));
        }
        if self.report_interval_ms == 0 {
            return Err(MonitorError::invalid("tilt.report_interval_ms", "must be positive"));
        }
        if self.window_capacity == Some(0) {
            return Err(MonitorError::invalid("tilt.window_capacity", "must be positive"));
        }
        if self.window_capacity.is_none() && self.window_duration_ms == 0 {
            return Err(MonitorError::invalid("tilt.window_duration_ms", "must be positive"));
        }
        let capacity = self.capacity();
        if capacity > MAX_WINDOW_CAPACITY {
            return Err(MonitorError::invalid(
                "tilt.window_capacity",
                format!("{capacity} samples exceeds the maximum of {MAX_WINDOW_CAPACITY}"),
            ));
        }
        match self.min_samples {
            Some(0) => {
                return Err(MonitorError::invalid("tilt.min_samples", "must be positive"));
            }
            Some(min) if min > capacity => {
                return Err(MonitorError::invalid(
                    "tilt.min_samples",
                    format!("{min} exceeds window capacity {capacity}"),
                ));
            }
            _ => {}
        }
        if !self.tilt_threshold_rad.is_finite() || self.tilt_threshold_rad <= 0.0 {
            return Err(MonitorError::invalid(
                "tilt.tilt_threshold_rad",
                "must be finite and positive",
            ));
        }
        if !(self.flat_band_fraction > 0.0 && self.flat_band_fraction <= 1.0) {
            return Err(MonitorError::invalid("tilt.flat_band_fraction", "must be in (0, 1]"));
        }
        if !(self.mild_band_fraction > 0.0 && self.mild_band_fraction <= 1.0) {
            return Err(MonitorError::invalid("tilt.mild_band_fraction", "must be in (0, 1]"));
        }
        if self.flat_band_fraction > self.mild_band_fraction {
            return Err(MonitorError::invalid(
                "tilt.flat_band_fraction",
                "must not exceed mild_band_fraction",
            ));
        }
        Ok(())
    }
}

/// Output of one emission tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiltReport {
    /// Refreshed snapshot.
    pub state: TiltState,
    /// Classification of the smoothed tilt.
    pub band: TiltBand,
    /// Samples the snapshot was computed from.
    pub sample_count: usize,
}

impl TiltReport {
    /// Build the telemetry event for this report.
    pub fn to_event(&self) -> MonitorEvent {
        MonitorEvent::new(
            EventKind::TiltReport,
            format!("Roll angle (window average): {}", self.band.label()),
            self.state.last_updated_ms,
        )
        .with_tilt(Some(&self.state))
    }
}

/// Windowed tilt analyzer.
#[derive(Debug, Clone)]
pub struct TiltAnalyzer {
    config: TiltConfig,
    window: SampleWindow,
    state: Option<TiltState>,
    sensor_available: bool,
    samples_ingested: u64,
    samples_rejected: u64,
}

impl TiltAnalyzer {
    /// Create a new analyzer.
    pub fn new(config: TiltConfig) -> Self {
        let window = SampleWindow::new(config.capacity(), config.dispersion);
        Self {
            config,
            window,
            state: None,
            sensor_available: true,
            samples_ingested: 0,
            samples_rejected: 0,
        }
    }

    /// Create an analyzer with default configuration.
    pub fn default_analyzer() -> Self {
        Self::new(TiltConfig::default())
    }

    /// Push a raw roll sample into the window.
    ///
    /// Non-finite readings are dropped. Samples are ignored entirely once
    /// the sensor has been reported unavailable.
    pub fn ingest(&mut self, raw_tilt_rad: f64, now_ms: u64) {
        self.ingest_sample(TiltSample::new(now_ms, raw_tilt_rad));
    }

    /// Push a timestamped sample into the window.
    pub fn ingest_sample(&mut self, sample: TiltSample) {
        if !self.sensor_available {
            return;
        }
        if !sample.is_finite() {
            self.samples_rejected += 1;
            debug!(
                timestamp_ms = sample.timestamp_ms,
                rejected = self.samples_rejected,
                "dropping non-finite tilt sample"
            );
            return;
        }

        self.window.push(sample.value_rad);
        self.samples_ingested += 1;
    }

    /// Recompute the tilt state from the window.
    ///
    /// Returns `None` while the window holds fewer than the required number
    /// of samples or when the sensor is unavailable.
    pub fn tick(&mut self, now_ms: u64) -> Option<TiltReport> {
        if !self.sensor_available {
            return None;
        }
        let snapshot = self.window.snapshot()?;
        if snapshot.count < self.config.required_samples() {
            return None;
        }

        let state = TiltState {
            smoothed_tilt: snapshot.mean,
            oscillation: snapshot.dispersion,
            last_updated_ms: now_ms,
        };
        self.state = Some(state);

        Some(TiltReport {
            state,
            band: self.config.classify(state.smoothed_tilt),
            sample_count: snapshot.count,
        })
    }

    /// Record that the orientation sensor is missing for this session.
    ///
    /// Returns true the first time, so the caller reports it exactly once.
    pub fn mark_unavailable(&mut self) -> bool {
        if !self.sensor_available {
            return false;
        }
        warn!("orientation sensor unavailable; tilt reports and alarms disabled for this session");
        self.sensor_available = false;
        self.window.clear();
        self.state = None;
        true
    }

    /// Forget the current tilt snapshot so it reads as unknown until the
    /// next successful tick. Window contents are kept.
    pub fn clear_stability(&mut self) {
        self.state = None;
    }

    /// Start a fresh session: empty window, unknown tilt, sensor assumed present.
    pub fn reset(&mut self) {
        self.window.clear();
        self.state = None;
        self.sensor_available = true;
        self.samples_ingested = 0;
        self.samples_rejected = 0;
    }

    /// Current tilt snapshot, `None` when unknown.
    pub fn tilt_state(&self) -> Option<&TiltState> {
        self.state.as_ref()
    }

    /// Whether the orientation sensor is considered present.
    pub fn is_sensor_available(&self) -> bool {
        self.sensor_available
    }

    /// Samples accepted this session.
    pub fn samples_ingested(&self) -> u64 {
        self.samples_ingested
    }

    /// Non-finite samples dropped this session.
    pub fn samples_rejected(&self) -> u64 {
        self.samples_rejected
    }

    /// Underlying window, for diagnostics.
    pub fn window(&self) -> &SampleWindow {
        &self.window
    }

    /// Active configuration.
    pub fn config(&self) -> &TiltConfig {
        &self.config
    }
}

impl Default for TiltAnalyzer {
    fn default() -> Self {
        Self::default_analyzer()
    }
}
