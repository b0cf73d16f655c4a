//! Pluggable host collaborators: location lookup and alarm notification.
//!
//! The engine never talks to platform services itself. A host that has a
//! location fix or a notification center plugs it in through these traits;
//! without them, events carry `location: null` and alarms only reach the
//! event stream.

use std::fmt;

/// A geolocation fix as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in meters.
    pub altitude_m: f64,
    /// Ground speed in m/s.
    pub speed_mps: f64,
}

impl fmt::Display for LocationFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Lat: {:.6}, Lon: {:.6}, Alt: {:.1}m, Speed: {:.1} m/s",
            self.latitude, self.longitude, self.altitude_m, self.speed_mps
        )
    }
}

/// Supplies the last known location description for events.
pub trait LocationProvider: Send {
    /// Last known location, `None` when no fix is available.
    fn last_known_location(&self) -> Option<String>;
}

/// Provider used when the host has no location collaborator.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

impl LocationProvider for NoLocation {
    fn last_known_location(&self) -> Option<String> {
        None
    }
}

/// Provider holding the most recent fix pushed by the host.
#[derive(Debug, Clone, Default)]
pub struct LatestFix {
    fix: Option<LocationFix>,
}

impl LatestFix {
    /// Create a provider with no fix yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider seeded with a fix.
    pub fn with_fix(fix: LocationFix) -> Self {
        Self { fix: Some(fix) }
    }

    /// Replace the stored fix.
    pub fn update(&mut self, fix: LocationFix) {
        self.fix = Some(fix);
    }

    /// Forget the stored fix.
    pub fn clear(&mut self) {
        self.fix = None;
    }
}

impl LocationProvider for LatestFix {
    fn last_known_location(&self) -> Option<String> {
        self.fix.map(|fix| fix.to_string())
    }
}

impl<F> LocationProvider for F
where
    F: Fn() -> Option<String> + Send,
{
    fn last_known_location(&self) -> Option<String> {
        self()
    }
}

/// Receives a user-facing notification whenever an alarm fires.
pub trait AlarmNotifier: Send {
    /// Deliver a notification. Failures are the host's concern.
    fn notify(&mut self, title: &str, body: &str);
}

impl<F> AlarmNotifier for F
where
    F: FnMut(&str, &str) + Send,
{
    fn notify(&mut self, title: &str, body: &str) {
        self(title, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix() -> LocationFix {
        LocationFix {
            latitude: 21.028511,
            longitude: 105.804817,
            altitude_m: 12.34,
            speed_mps: 0.0,
        }
    }

    #[test]
    fn test_fix_description() {
        assert_eq!(
            fix().to_string(),
            "Lat: 21.028511, Lon: 105.804817, Alt: 12.3m, Speed: 0.0 m/s"
        );
    }

    #[test]
    fn test_no_location() {
        assert_eq!(NoLocation.last_known_location(), None);
    }

    #[test]
    fn test_latest_fix_updates() {
        let mut provider = LatestFix::new();
        assert_eq!(provider.last_known_location(), None);

        provider.update(fix());
        assert!(provider.last_known_location().unwrap().starts_with("Lat: 21.028511"));

        provider.clear();
        assert_eq!(provider.last_known_location(), None);
    }

    #[test]
    fn test_closure_collaborators() {
        let provider = || Some("somewhere".to_string());
        assert_eq!(provider.last_known_location().as_deref(), Some("somewhere"));

        let mut seen = Vec::new();
        {
            let mut notifier = |title: &str, body: &str| seen.push(format!("{title}: {body}"));
            notifier.notify("Alarm", "flat");
        }
        assert_eq!(seen, vec!["Alarm: flat".to_string()]);
    }
}
