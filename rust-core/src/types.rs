//! Core data types for the unlock sensing engine.
//!
//! This module defines the values that flow between the window, the tilt
//! analyzer, the lock tracker and the alarm evaluator, plus the event record
//! handed to the host bridge.
//!
//! Design principle: if a concept exists, it gets a type. Lock state is an
//! enum rather than a string, tilt snapshots are structs rather than tuples,
//! and "no data yet" is `None` rather than a zero reading.

use serde::{Deserialize, Serialize};

/// A single raw tilt (roll) sample from the orientation collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiltSample {
    /// Monotonic timestamp in milliseconds.
    pub timestamp_ms: u64,

    /// Roll angle in radians.
    pub value_rad: f64,
}

impl TiltSample {
    /// Creates a new tilt sample.
    pub fn new(timestamp_ms: u64, value_rad: f64) -> Self {
        Self {
            timestamp_ms,
            value_rad,
        }
    }

    /// NaN and infinite readings are sensor glitches and never enter a window.
    pub fn is_finite(&self) -> bool {
        self.value_rad.is_finite()
    }
}

/// Lock state of the device as seen by the tracker.
///
/// `Unknown` is only ever the initial value. Once a signal has been observed
/// the tracker moves between `Locked` and `Unlocked` and never returns here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockState {
    /// No lock signal has been observed yet.
    #[default]
    Unknown,
    /// The device is locked.
    Locked,
    /// The device is unlocked.
    Unlocked,
}

impl LockState {
    /// Short upper-case label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            LockState::Unknown => "UNKNOWN",
            LockState::Locked => "LOCKED",
            LockState::Unlocked => "UNLOCKED",
        }
    }
}

/// The external lock signal, already reduced to a binary reading.
///
/// Whatever produces it (an OS lock notification, app lifecycle, screen
/// wake/sleep) is a host concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockSignal {
    /// The collaborator reports the device as locked.
    Locked,
    /// The collaborator reports the device as unlocked.
    Unlocked,
}

impl LockSignal {
    /// Map a boolean `is_locked` reading to a signal.
    pub fn from_is_locked(is_locked: bool) -> Self {
        if is_locked {
            LockSignal::Locked
        } else {
            LockSignal::Unlocked
        }
    }

    /// The tracker state this signal maps to.
    pub fn to_state(self) -> LockState {
        match self {
            LockSignal::Locked => LockState::Locked,
            LockSignal::Unlocked => LockState::Unlocked,
        }
    }
}

impl From<bool> for LockSignal {
    fn from(is_locked: bool) -> Self {
        LockSignal::from_is_locked(is_locked)
    }
}

/// Qualitative classification of the smoothed tilt magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TiltBand {
    /// Magnitude below the flat band: device lying flat and settled.
    Flat,
    /// Tilted, but below the tilt threshold.
    MildTilt,
    /// At or beyond the tilt threshold.
    BeyondThreshold,
}

impl TiltBand {
    /// Human-readable label carried in tilt report messages.
    pub fn label(&self) -> &'static str {
        match self {
            TiltBand::Flat => "flat/stable",
            TiltBand::MildTilt => "mild tilt",
            TiltBand::BeyondThreshold => "beyond threshold",
        }
    }
}

/// Smoothed tilt snapshot owned by the tilt analyzer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiltState {
    /// Window mean of the roll angle in radians.
    pub smoothed_tilt: f64,
    /// Window dispersion in radians. Never negative.
    pub oscillation: f64,
    /// Timestamp of the tick that produced this snapshot.
    pub last_updated_ms: u64,
}

// ============================================================================
// EVENTS
// ============================================================================

/// Discriminant of a [`MonitorEvent`], serialized as the wire `type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Transition into `Locked`.
    #[serde(rename = "LOCK_EVENT")]
    LockChanged,
    /// Transition into `Unlocked`.
    #[serde(rename = "UNLOCK_EVENT")]
    UnlockChanged,
    /// Periodic smoothed tilt telemetry.
    #[serde(rename = "TILT_EVENT")]
    TiltReport,
    /// Unlocked, flat and stable.
    #[serde(rename = "ALARM_EVENT")]
    Alarm,
}

impl EventKind {
    /// Wire tag for this kind.
    pub fn wire_name(&self) -> &'static str {
        match self {
            EventKind::LockChanged => "LOCK_EVENT",
            EventKind::UnlockChanged => "UNLOCK_EVENT",
            EventKind::TiltReport => "TILT_EVENT",
            EventKind::Alarm => "ALARM_EVENT",
        }
    }
}

/// One self-contained event record for the host bridge.
///
/// Immutable once built. Field names follow the host's JSON contract
/// (`tiltValue`, `oscillationValue`, `timestampMillis`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorEvent {
    /// Event discriminant.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Human-readable description.
    pub message: String,
    /// Last known location description, if a collaborator supplied one.
    pub location: Option<String>,
    /// Smoothed tilt in radians.
    pub tilt_value: Option<f64>,
    /// Oscillation in radians.
    pub oscillation_value: Option<f64>,
    /// Event time in milliseconds.
    pub timestamp_millis: i64,
}

impl MonitorEvent {
    /// Create an event with no location or tilt payload.
    pub fn new(kind: EventKind, message: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            tilt_value: None,
            oscillation_value: None,
            timestamp_millis: i64::try_from(timestamp_ms).unwrap_or(i64::MAX),
        }
    }

    /// Attach a location description.
    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    /// Attach the smoothed tilt and oscillation of a snapshot, if any.
    pub fn with_tilt(mut self, tilt: Option<&TiltState>) -> Self {
        if let Some(state) = tilt {
            self.tilt_value = Some(state.smoothed_tilt);
            self.oscillation_value = Some(state.oscillation);
        }
        self
    }
}
