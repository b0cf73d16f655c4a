//! The unlock monitor: single owner of all per-device sensing state.
//!
//! This module wires the stages together:
//! 1. **Tilt analysis**: raw roll samples → window → smoothed tilt + oscillation
//! 2. **Lock tracking**: raw lock signal → debounced transitions
//! 3. **Alarm evaluation**: after every tilt report and every lock transition
//! 4. **Output**: every event goes to the configured [`EventSink`]
//!
//! The host constructs one monitor per device and drives it from its sensor,
//! timer and lock callbacks. All of them mutate the same state, so they must
//! be serialized: either call the monitor from a single thread or share it
//! through a [`MonitorHandle`](crate::handle::MonitorHandle).
//!
//! `start` and `stop` are idempotent. While stopped, inputs are ignored as if
//! the monitor had deregistered from its sources; events already handed to
//! the sink remain with the listener.

use std::sync::mpsc::Receiver;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::alarm::{AlarmCondition, AlarmConfig, AlarmEvaluator, DEFAULT_STABILITY_THRESHOLD_RAD};
use crate::cadence::Cadence;
use crate::collaborators::{AlarmNotifier, LocationProvider, NoLocation};
use crate::error::{MonitorError, Result};
use crate::lock::LockStateTracker;
use crate::sink::{EventEncoder, EventSink, JsonChannelSink, DEFAULT_QUEUE_CAPACITY, MAX_QUEUE_CAPACITY};
use crate::tilt::{TiltAnalyzer, TiltConfig};
use crate::types::{LockSignal, LockState, MonitorEvent, TiltState};
use crate::window::DispersionMetric;

/// Complete monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Tilt window, cadence and classification.
    pub tilt: TiltConfig,
    /// Alarm thresholds and re-fire policy.
    pub alarm: AlarmConfig,
    /// Records a channel listener may leave undrained before new ones drop.
    pub queue_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tilt: TiltConfig::default(),
            alarm: AlarmConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl MonitorConfig {
    /// Parse a JSON document. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: MonitorConfig = serde_json::from_str(json).map_err(MonitorError::ConfigParse)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section.
    pub fn validate(&self) -> Result<()> {
        self.tilt.validate()?;
        self.alarm.validate()?;
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(MonitorError::invalid(
                "queue_capacity",
                format!("must be in 1..={MAX_QUEUE_CAPACITY}"),
            ));
        }
        if self.tilt.dispersion == DispersionMetric::StdDev
            && self.alarm.stability_threshold_rad == DEFAULT_STABILITY_THRESHOLD_RAD
        {
            warn!("std_dev dispersion with the range-tuned stability threshold; alarms will be looser than intended");
        }
        Ok(())
    }
}

/// Per-device monitor.
pub struct UnlockMonitor<S: EventSink = JsonChannelSink> {
    config: MonitorConfig,
    tilt: TiltAnalyzer,
    lock: LockStateTracker,
    alarm: AlarmEvaluator,
    report_cadence: Cadence,
    location: Box<dyn LocationProvider>,
    notifier: Option<Box<dyn AlarmNotifier>>,
    sink: S,
    running: bool,
}

impl UnlockMonitor<JsonChannelSink> {
    /// Create a monitor that publishes JSON records to a channel.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let sink = JsonChannelSink::with_queue_capacity(config.queue_capacity);
        Self::with_sink(config, sink)
    }
}

impl<S: EventSink> UnlockMonitor<S> {
    /// Create a monitor with a custom sink.
    pub fn with_sink(config: MonitorConfig, sink: S) -> Result<Self> {
        config.validate()?;
        let alarm = AlarmEvaluator::from_config(&config.alarm, &config.tilt);
        Ok(Self {
            tilt: TiltAnalyzer::new(config.tilt.clone()),
            lock: LockStateTracker::new(),
            alarm,
            report_cadence: Cadence::new(config.tilt.report_interval_ms),
            location: Box::new(NoLocation),
            notifier: None,
            sink,
            running: false,
            config,
        })
    }

    /// Attach a location collaborator.
    pub fn with_location(mut self, provider: impl LocationProvider + 'static) -> Self {
        self.set_location_provider(provider);
        self
    }

    /// Attach an alarm notifier.
    pub fn with_notifier(mut self, notifier: impl AlarmNotifier + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    /// Replace the location collaborator.
    pub fn set_location_provider(&mut self, provider: impl LocationProvider + 'static) {
        self.location = Box::new(provider);
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Begin a monitoring session. Returns false if already running.
    ///
    /// A new session starts with an empty window, an unknown tilt and a
    /// re-armed alarm. Lock state carries over.
    pub fn start(&mut self) -> bool {
        if self.running {
            debug!("start ignored; monitor already running");
            return false;
        }
        self.tilt.reset();
        self.alarm.reset();
        self.report_cadence.reset();
        self.running = true;
        info!(
            window_capacity = self.tilt.window().capacity(),
            report_interval_ms = self.config.tilt.report_interval_ms,
            "monitoring started"
        );
        true
    }

    /// End the session. Returns false if already stopped.
    pub fn stop(&mut self) -> bool {
        if !self.running {
            debug!("stop ignored; monitor not running");
            return false;
        }
        self.running = false;
        info!(
            samples = self.tilt.samples_ingested(),
            alarms = self.alarm.fired_count(),
            "monitoring stopped"
        );
        true
    }

    /// Whether a session is active.
    pub fn is_running(&self) -> bool {
        self.running
    }

    // =========================================================================
    // INPUTS
    // =========================================================================

    /// Orientation sensor delivered a roll sample.
    pub fn on_tilt_sample(&mut self, radians: f64, now_ms: u64) {
        if !self.running {
            return;
        }
        self.tilt.ingest(radians, now_ms);
    }

    /// The lock collaborator delivered a reading.
    pub fn on_lock_signal(&mut self, signal: impl Into<LockSignal>, now_ms: u64) {
        if !self.running {
            return;
        }
        let Some(transition) = self.lock.observe(signal, now_ms) else {
            return;
        };

        let context = self.tilt.tilt_state().copied();
        if transition.is_lock() {
            self.tilt.clear_stability();
        }
        let event = transition
            .to_event()
            .with_location(self.location.last_known_location())
            .with_tilt(context.as_ref());
        self.sink.emit(event);

        self.evaluate_alarm(now_ms);
    }

    /// Emission timer fired. Returns true if a tilt report was produced.
    pub fn on_tick(&mut self, now_ms: u64) -> bool {
        if !self.running {
            return false;
        }
        let Some(report) = self.tilt.tick(now_ms) else {
            return false;
        };
        self.sink.emit(report.to_event());
        self.evaluate_alarm(now_ms);
        true
    }

    /// Tick only if the report interval has elapsed since the last tick.
    ///
    /// Lets a host drive the monitor from a timer of any rate.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if !self.running || !self.report_cadence.poll(now_ms) {
            return false;
        }
        self.on_tick(now_ms)
    }

    /// The orientation sensor is missing for this session.
    ///
    /// Reported once; afterwards tilt stays unknown and no alarm can fire
    /// until the next session.
    pub fn on_sensor_unavailable(&mut self) -> bool {
        if !self.running {
            debug!("sensor unavailability reported while stopped; ignored");
            return false;
        }
        let first = self.tilt.mark_unavailable();
        if first {
            self.alarm.reset();
        }
        first
    }

    fn evaluate_alarm(&mut self, now_ms: u64) {
        let Some(condition) = self.alarm.check(self.lock.state(), self.tilt.tilt_state(), now_ms) else {
            return;
        };
        self.raise(condition);
    }

    fn raise(&mut self, condition: AlarmCondition) {
        if let Some(notifier) = self.notifier.as_mut() {
            notifier.notify(AlarmCondition::TITLE, &condition.message());
        }
        let event: MonitorEvent = condition.to_event(self.location.last_known_location());
        self.sink.emit(event);
    }

    // =========================================================================
    // STATE
    // =========================================================================

    /// Current lock state.
    pub fn lock_state(&self) -> LockState {
        self.lock.state()
    }

    /// Current tilt snapshot, `None` when unknown.
    pub fn tilt_state(&self) -> Option<&TiltState> {
        self.tilt.tilt_state()
    }

    /// Whether the orientation sensor is considered present.
    pub fn is_sensor_available(&self) -> bool {
        self.tilt.is_sensor_available()
    }

    /// Raw samples accepted this session.
    pub fn samples_ingested(&self) -> u64 {
        self.tilt.samples_ingested()
    }

    /// Alarms fired since construction.
    pub fn alarm_count(&self) -> u64 {
        self.alarm.fired_count()
    }

    /// Active configuration.
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Output sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Output sink, mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

impl<E: EventEncoder> UnlockMonitor<JsonChannelSink<E>> {
    /// Attach a listener and start monitoring.
    ///
    /// Mirrors a host stream handler: listening begins a session, and the
    /// returned receiver yields one JSON record per event.
    pub fn listen(&mut self) -> Receiver<String> {
        let receiver = self.sink.attach();
        self.start();
        receiver
    }

    /// Stop monitoring and detach the listener.
    pub fn unlisten(&mut self) {
        self.stop();
        self.sink.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::LatestFix;
    use crate::collaborators::LocationFix;
    use crate::sink::RecordingSink;
    use crate::types::EventKind;
    use std::sync::{Arc, Mutex};

    fn small_config(capacity: usize) -> MonitorConfig {
        let mut config = MonitorConfig::default();
        config.tilt.window_capacity = Some(capacity);
        config
    }

    fn recording(capacity: usize) -> UnlockMonitor<RecordingSink> {
        UnlockMonitor::with_sink(small_config(capacity), RecordingSink::new()).unwrap()
    }

    fn kinds(monitor: &UnlockMonitor<RecordingSink>) -> Vec<EventKind> {
        monitor.sink().events().iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_start_stop_idempotent() {
        let mut monitor = recording(2);
        assert!(!monitor.is_running());
        assert!(monitor.start());
        assert!(!monitor.start());
        assert!(monitor.is_running());
        assert!(monitor.stop());
        assert!(!monitor.stop());
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_inputs_ignored_while_stopped() {
        let mut monitor = recording(1);
        monitor.on_tilt_sample(0.0, 0);
        monitor.on_lock_signal(false, 10);
        assert!(!monitor.on_tick(20));
        assert!(monitor.sink().events().is_empty());
        assert_eq!(monitor.lock_state(), LockState::Unknown);
    }

    #[test]
    fn test_tick_reports_then_alarms_on_unlock() {
        let mut monitor = recording(3);
        monitor.start();
        for i in 0..3 {
            monitor.on_tilt_sample(0.0, i * 20);
        }
        assert!(monitor.on_tick(60));
        assert_eq!(kinds(&monitor), vec![EventKind::TiltReport]);

        monitor.on_lock_signal(false, 80);
        assert_eq!(
            kinds(&monitor),
            vec![EventKind::TiltReport, EventKind::UnlockChanged, EventKind::Alarm]
        );
    }

    #[test]
    fn test_edge_triggered_across_ticks() {
        let mut monitor = recording(2);
        monitor.start();
        monitor.on_lock_signal(false, 0);
        for t in [20, 40] {
            monitor.on_tilt_sample(0.0, t);
        }
        monitor.on_tick(100);
        monitor.on_tick(200);
        monitor.on_tick(300);

        let alarms = kinds(&monitor).into_iter().filter(|k| *k == EventKind::Alarm).count();
        assert_eq!(alarms, 1);
        assert_eq!(monitor.alarm_count(), 1);
    }

    #[test]
    fn test_lock_clears_stability() {
        let mut monitor = recording(2);
        monitor.start();
        monitor.on_tilt_sample(0.0, 0);
        monitor.on_tilt_sample(0.0, 20);
        monitor.on_tick(40);
        assert!(monitor.tilt_state().is_some());

        monitor.on_lock_signal(true, 60);
        assert!(monitor.tilt_state().is_none());

        // Unlocking right after a lock does not reuse the stale snapshot.
        monitor.on_lock_signal(false, 80);
        assert!(!kinds(&monitor).contains(&EventKind::Alarm));

        // The next report re-establishes stability and fires.
        monitor.on_tick(140);
        assert_eq!(kinds(&monitor).last(), Some(&EventKind::Alarm));
    }

    #[test]
    fn test_lock_event_carries_context() {
        let fix = LocationFix {
            latitude: 1.0,
            longitude: 2.0,
            altitude_m: 3.0,
            speed_mps: 0.0,
        };
        let mut monitor = recording(1).with_location(LatestFix::with_fix(fix));
        monitor.start();
        monitor.on_tilt_sample(0.7, 0);
        monitor.on_tick(20);
        monitor.on_lock_signal(true, 40);

        let lock = monitor.sink().events().last().unwrap();
        assert_eq!(lock.kind, EventKind::LockChanged);
        assert_eq!(lock.tilt_value, Some(0.7));
        assert_eq!(lock.location.as_deref(), Some(fix.to_string().as_str()));
    }

    #[test]
    fn test_tilted_device_does_not_alarm() {
        let mut monitor = recording(2);
        monitor.start();
        monitor.on_lock_signal(false, 0);
        monitor.on_tilt_sample(1.3, 20);
        monitor.on_tilt_sample(1.3, 40);
        monitor.on_tick(100);
        assert_eq!(
            kinds(&monitor),
            vec![EventKind::UnlockChanged, EventKind::TiltReport]
        );
    }

    #[test]
    fn test_oscillating_device_does_not_alarm() {
        let mut monitor = recording(4);
        monitor.start();
        monitor.on_lock_signal(false, 0);
        for (i, v) in [0.0, 0.05, -0.05, 0.0].into_iter().enumerate() {
            monitor.on_tilt_sample(v, i as u64 * 20);
        }
        monitor.on_tick(100);
        assert!(!kinds(&monitor).contains(&EventKind::Alarm));
    }

    #[test]
    fn test_sensor_unavailable_suppresses_reports() {
        let mut monitor = recording(1);
        monitor.start();
        assert!(monitor.on_sensor_unavailable());
        assert!(!monitor.on_sensor_unavailable());
        monitor.on_lock_signal(false, 0);
        monitor.on_tilt_sample(0.0, 10);
        assert!(!monitor.on_tick(20));
        assert_eq!(kinds(&monitor), vec![EventKind::UnlockChanged]);
        assert!(!monitor.is_sensor_available());

        // A new session assumes the sensor again.
        monitor.stop();
        monitor.start();
        assert!(monitor.is_sensor_available());
    }

    #[test]
    fn test_poll_respects_report_interval() {
        let mut monitor = recording(1);
        monitor.start();
        monitor.on_tilt_sample(0.5, 0);
        let produced: Vec<u64> = (0..=300).step_by(20).filter(|&t| monitor.poll(t)).collect();
        assert_eq!(produced, vec![0, 100, 200, 300]);
    }

    #[test]
    fn test_notifier_receives_alarm() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut monitor = recording(1).with_notifier(move |title: &str, body: &str| {
            sink.lock().unwrap().push((title.to_string(), body.to_string()));
        });
        monitor.start();
        monitor.on_lock_signal(false, 0);
        monitor.on_tilt_sample(0.0, 10);
        monitor.on_tick(20);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, AlarmCondition::TITLE);
        assert!(seen[0].1.starts_with("ALARM"));
    }

    #[test]
    fn test_listen_starts_and_unlisten_stops() {
        let mut monitor = UnlockMonitor::new(small_config(1)).unwrap();
        let rx = monitor.listen();
        assert!(monitor.is_running());

        monitor.on_lock_signal(true, 5);
        monitor.unlisten();
        assert!(!monitor.is_running());

        let record: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(record["type"], "LOCK_EVENT");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config = MonitorConfig::from_json_str(
            r#"{"tilt": {"window_capacity": 10, "dispersion": "std_dev"},
                "alarm": {"stability_threshold_rad": 0.01, "refire": "level_triggered"}}"#,
        )
        .unwrap();
        assert_eq!(config.tilt.capacity(), 10);
        assert_eq!(config.tilt.dispersion, DispersionMetric::StdDev);
        assert_eq!(config.tilt.report_interval_ms, 100);
        assert_eq!(config.alarm.stability_threshold_rad, 0.01);
        assert_eq!(config.alarm.refire, crate::alarm::RefirePolicy::LevelTriggered);
    }

    #[test]
    fn test_config_from_json_rejects_invalid() {
        assert!(matches!(
            MonitorConfig::from_json_str("{not json"),
            Err(MonitorError::ConfigParse(_))
        ));
        assert!(matches!(
            MonitorConfig::from_json_str(r#"{"tilt": {"report_interval_ms": 0}}"#),
            Err(MonitorError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_flat_report_and_alarm_agree_on_band() {
        let mut config = small_config(1);
        config.tilt.flat_band_fraction = 0.3;
        let mut monitor = UnlockMonitor::with_sink(config, RecordingSink::new()).unwrap();
        monitor.start();
        monitor.on_lock_signal(false, 0);

        // 0.3 rad sits in the widened flat band, well above 0.1 x threshold.
        monitor.on_tilt_sample(0.3, 10);
        monitor.on_tick(20);

        let events = monitor.sink().events();
        assert!(events[1].message.ends_with("flat/stable"));
        assert_eq!(events[2].kind, EventKind::Alarm);
    }

    #[test]
    fn test_slow_listener_queue_stays_bounded() {
        let mut config = small_config(1);
        config.queue_capacity = 8;
        let mut monitor = UnlockMonitor::new(config).unwrap();
        let rx = monitor.listen();
        monitor.on_tilt_sample(0.7, 0);

        // An hour of reports at 10 Hz with nobody draining.
        for i in 0..36_000 {
            monitor.on_tick(i * 100);
        }
        assert_eq!(rx.try_iter().count(), 8);
        let stats = monitor.sink().stats();
        assert_eq!(stats.delivered, 8);
        assert_eq!(stats.dropped_queue_full, 36_000 - 8);
    }

    #[test]
    fn test_queue_capacity_validated() {
        let mut config = MonitorConfig::default();
        config.queue_capacity = 0;
        assert!(config.validate().is_err());
        config.queue_capacity = MAX_QUEUE_CAPACITY + 1;
        assert!(config.validate().is_err());
        assert_eq!(MonitorConfig::default().queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_config_from_json_rejects_huge_window() {
        let result = MonitorConfig::from_json_str(r#"{"tilt": {"window_capacity": 2305843009213693952}}"#);
        assert!(result.is_err());

        let mut config = MonitorConfig::default();
        config.tilt.window_capacity = Some(usize::MAX / 8);
        assert!(matches!(
            UnlockMonitor::with_sink(config, RecordingSink::new()),
            Err(MonitorError::InvalidConfig { field: "tilt.window_capacity", .. })
        ));
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let mut config = MonitorConfig::default();
        config.alarm.stability_threshold_rad = -1.0;
        assert!(UnlockMonitor::new(config).is_err());
    }
}
