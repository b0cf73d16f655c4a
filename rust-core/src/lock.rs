//! Lock-state tracking with debouncing.
//!
//! The lock signal comes from an unreliable platform proxy that may repeat
//! the same reading many times. The tracker only reports actual changes:
//! `Unknown → Locked/Unlocked` on the first signal, then every flip between
//! `Locked` and `Unlocked`. Repeated identical signals produce nothing.

use tracing::info;

use crate::types::{EventKind, LockSignal, LockState, MonitorEvent};

/// A change of lock state accepted by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTransition {
    /// State before the signal.
    pub from: LockState,
    /// State after the signal. Never `Unknown`.
    pub to: LockState,
    /// Time the signal was observed.
    pub timestamp_ms: u64,
}

impl LockTransition {
    /// True when the device just became locked.
    pub fn is_lock(&self) -> bool {
        self.to == LockState::Locked
    }

    /// True when the device just became unlocked.
    pub fn is_unlock(&self) -> bool {
        self.to == LockState::Unlocked
    }

    /// Build the transition event. Location and tilt context are attached
    /// by the caller.
    pub fn to_event(&self) -> MonitorEvent {
        let (kind, message) = match self.to {
            LockState::Locked => (EventKind::LockChanged, "Device locked."),
            _ => (EventKind::UnlockChanged, "Device unlocked."),
        };
        MonitorEvent::new(kind, message, self.timestamp_ms)
    }
}

/// Debouncing lock-state machine.
#[derive(Debug, Clone, Default)]
pub struct LockStateTracker {
    state: LockState,
    last_change_ms: Option<u64>,
    transitions: u64,
    suppressed: u64,
}

impl LockStateTracker {
    /// Create a tracker in the `Unknown` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one lock signal.
    ///
    /// Returns the transition when the mapped state differs from the current
    /// one, `None` for a repeated signal.
    pub fn observe(&mut self, signal: impl Into<LockSignal>, now_ms: u64) -> Option<LockTransition> {
        let next = signal.into().to_state();
        if next == self.state {
            self.suppressed += 1;
            return None;
        }

        let transition = LockTransition {
            from: self.state,
            to: next,
            timestamp_ms: now_ms,
        };
        self.state = next;
        self.last_change_ms = Some(now_ms);
        self.transitions += 1;

        info!(
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            timestamp_ms = now_ms,
            "lock state changed"
        );
        Some(transition)
    }

    /// Current state.
    pub fn state(&self) -> LockState {
        self.state
    }

    /// Timestamp of the last accepted transition.
    pub fn last_change_ms(&self) -> Option<u64> {
        self.last_change_ms
    }

    /// Number of accepted transitions.
    pub fn transition_count(&self) -> u64 {
        self.transitions
    }

    /// Number of repeated signals swallowed by debouncing.
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed
    }
}
