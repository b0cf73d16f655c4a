//! Alarm decision: unlocked, flat and stable.
//!
//! The predicate itself is a pure function of the lock state, the current
//! tilt snapshot and two thresholds:
//!
//! ```text
//! lock == Unlocked && |smoothed_tilt| < flatness && oscillation < stability
//! ```
//!
//! Both comparisons are strict. An unknown tilt snapshot never fires.
//!
//! Whether a continuous violation fires once or on every evaluation is an
//! explicit [`RefirePolicy`]; the edge-triggered policy is the only state
//! the evaluator keeps.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MonitorError, Result};
use crate::tilt::TiltConfig;
use crate::types::{EventKind, LockState, MonitorEvent, TiltState};

/// Default stability threshold for the range metric (~1.5 degrees).
pub const DEFAULT_STABILITY_THRESHOLD_RAD: f64 = 0.026;

/// How a continuous violation is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefirePolicy {
    /// Fire once when the condition becomes true; re-arm when it clears.
    #[default]
    EdgeTriggered,
    /// Fire on every evaluation while the condition holds.
    LevelTriggered,
}

/// Alarm tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Explicit flatness threshold (rad). Defaults to the upper edge of the
    /// tilt analyzer's flat band, so a "flat/stable" report and the alarm
    /// agree on what flat means.
    pub flatness_threshold_rad: Option<f64>,

    /// Oscillation below which the device counts as stable (rad).
    /// Must be calibrated for the configured dispersion metric.
    pub stability_threshold_rad: f64,

    /// Re-fire behaviour for a sustained violation.
    pub refire: RefirePolicy,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            flatness_threshold_rad: None,
            stability_threshold_rad: DEFAULT_STABILITY_THRESHOLD_RAD,
            refire: RefirePolicy::EdgeTriggered,
        }
    }
}

impl AlarmConfig {
    /// Resolve concrete thresholds against the tilt classification bands.
    pub fn thresholds(&self, tilt: &TiltConfig) -> AlarmThresholds {
        AlarmThresholds {
            flatness: self
                .flatness_threshold_rad
                .unwrap_or(tilt.flat_band_fraction * tilt.tilt_threshold_rad),
            stability: self.stability_threshold_rad,
        }
    }

    /// Reject non-finite or non-positive thresholds.
    pub fn validate(&self) -> Result<()> {
        if let Some(flatness) = self.flatness_threshold_rad {
            if !flatness.is_finite() || flatness <= 0.0 {
                return Err(MonitorError::invalid(
                    "alarm.flatness_threshold_rad",
                    "must be finite and positive",
                ));
            }
        }
        if !self.stability_threshold_rad.is_finite() || self.stability_threshold_rad <= 0.0 {
            return Err(MonitorError::invalid(
                "alarm.stability_threshold_rad",
                "must be finite and positive",
            ));
        }
        Ok(())
    }
}

/// Resolved thresholds used by [`evaluate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlarmThresholds {
    /// `|smoothed_tilt|` must be strictly below this (rad).
    pub flatness: f64,
    /// Oscillation must be strictly below this (rad).
    pub stability: f64,
}

/// A satisfied alarm predicate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlarmCondition {
    /// Smoothed tilt at evaluation time (rad).
    pub smoothed_tilt: f64,
    /// Oscillation at evaluation time (rad).
    pub oscillation: f64,
    /// Stability threshold that was beaten (rad).
    pub stability_threshold: f64,
    /// Evaluation time.
    pub timestamp_ms: u64,
}

impl AlarmCondition {
    /// Title used for host notifications.
    pub const TITLE: &'static str = "Unattended device alarm";

    /// Human-readable description with angles in degrees.
    pub fn message(&self) -> String {
        format!(
            "ALARM: device unlocked, flat (tilt {:.1}°) and stable (oscillation {:.2}° < {:.2}°).",
            self.smoothed_tilt.to_degrees(),
            self.oscillation.to_degrees(),
            self.stability_threshold.to_degrees(),
        )
    }

    /// Build the alarm event.
    pub fn to_event(&self, location: Option<String>) -> MonitorEvent {
        let mut event = MonitorEvent::new(EventKind::Alarm, self.message(), self.timestamp_ms)
            .with_location(location);
        event.tilt_value = Some(self.smoothed_tilt);
        event.oscillation_value = Some(self.oscillation);
        event
    }
}

/// Pure alarm predicate.
pub fn evaluate(
    lock: LockState,
    tilt: Option<&TiltState>,
    thresholds: &AlarmThresholds,
) -> Option<AlarmCondition> {
    if lock != LockState::Unlocked {
        return None;
    }
    let tilt = tilt?;
    let flat = tilt.smoothed_tilt.abs() < thresholds.flatness;
    let stable = tilt.oscillation < thresholds.stability;
    if !(flat && stable) {
        return None;
    }
    Some(AlarmCondition {
        smoothed_tilt: tilt.smoothed_tilt,
        oscillation: tilt.oscillation,
        stability_threshold: thresholds.stability,
        timestamp_ms: tilt.last_updated_ms,
    })
}

/// Applies the re-fire policy on top of [`evaluate`].
#[derive(Debug, Clone)]
pub struct AlarmEvaluator {
    thresholds: AlarmThresholds,
    policy: RefirePolicy,
    /// Set while an edge-triggered violation is in progress.
    alarming: bool,
    fired: u64,
}

impl AlarmEvaluator {
    /// Create an evaluator with resolved thresholds.
    pub fn new(thresholds: AlarmThresholds, policy: RefirePolicy) -> Self {
        Self {
            thresholds,
            policy,
            alarming: false,
            fired: 0,
        }
    }

    /// Create an evaluator from configuration.
    pub fn from_config(config: &AlarmConfig, tilt: &TiltConfig) -> Self {
        Self::new(config.thresholds(tilt), config.refire)
    }

    /// Evaluate against the current snapshots and apply the re-fire policy.
    ///
    /// `now_ms` stamps the alarm; the tilt snapshot time is kept only when
    /// it is later.
    pub fn check(
        &mut self,
        lock: LockState,
        tilt: Option<&TiltState>,
        now_ms: u64,
    ) -> Option<AlarmCondition> {
        let Some(mut condition) = evaluate(lock, tilt, &self.thresholds) else {
            if self.alarming {
                debug!("alarm condition cleared; re-armed");
            }
            self.alarming = false;
            return None;
        };

        if self.policy == RefirePolicy::EdgeTriggered && self.alarming {
            return None;
        }
        self.alarming = true;
        self.fired += 1;
        condition.timestamp_ms = condition.timestamp_ms.max(now_ms);

        warn!(
            tilt_rad = condition.smoothed_tilt,
            oscillation_rad = condition.oscillation,
            timestamp_ms = condition.timestamp_ms,
            "unattended unlocked device alarm"
        );
        Some(condition)
    }

    /// Re-arm without waiting for the condition to clear.
    pub fn reset(&mut self) {
        self.alarming = false;
    }

    /// True while an edge-triggered violation is latched.
    pub fn is_alarming(&self) -> bool {
        self.alarming
    }

    /// Alarms fired since construction.
    pub fn fired_count(&self) -> u64 {
        self.fired
    }

    /// Resolved thresholds.
    pub fn thresholds(&self) -> &AlarmThresholds {
        &self.thresholds
    }

    /// Active re-fire policy.
    pub fn policy(&self) -> RefirePolicy {
        self.policy
    }
}
