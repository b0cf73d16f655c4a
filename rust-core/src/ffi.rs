//! C FFI bindings for host bridges.
//!
//! This module exposes the unlock monitor to mobile platforms via C ABI.
//! A native bridge owns one engine per device, forwards sensor, lock and
//! timer callbacks into it, and drains queued events as JSON strings.
//!
//! Memory Safety:
//! - All returned strings must be freed with `unlock_free_string()`
//! - The engine instance must be freed with `unlock_engine_destroy()`
//! - NULL checks are performed on all inputs
//!
//! Thread Safety:
//! - The engine is NOT thread-safe. Use a single thread or mutex.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::mpsc::Receiver;

use tracing::warn;

use crate::alarm::RefirePolicy;
use crate::monitor::{MonitorConfig, UnlockMonitor};
use crate::types::{LockSignal, LockState};
use crate::window::DispersionMetric;

// ============================================================================
// OPAQUE HANDLE TYPES
// ============================================================================

/// Opaque handle to one device's unlock monitor.
pub struct UnlockEngine {
    monitor: UnlockMonitor,
    // Survives `stop` so records emitted before it can still be drained.
    events: Option<Receiver<String>>,
}

/// Result status codes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockStatus {
    /// Operation succeeded.
    Ok = 0,
    /// Null pointer provided.
    NullPointer = 1,
    /// Invalid parameter value.
    InvalidParameter = 2,
    /// Monitoring has not been started; the input was ignored.
    NotRunning = 3,
}

/// Configuration for the engine. Zero or negative fields keep defaults.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct UnlockConfig {
    /// Expected orientation sample interval in milliseconds (default 20).
    pub sample_interval_ms: u32,
    /// Tilt report interval in milliseconds (default 100).
    pub report_interval_ms: u32,
    /// Window length in milliseconds (default 5000).
    pub window_duration_ms: u32,
    /// Explicit window capacity in samples; 0 derives it from the duration.
    pub window_capacity: u32,
    /// Oscillation below this is "stable", in radians (default 0.026).
    pub stability_threshold_rad: f64,
    /// Dispersion metric (0 = range, 1 = standard deviation).
    pub dispersion: i32,
    /// Re-fire the alarm on every evaluation while the condition holds.
    pub level_triggered: i32,
}

impl UnlockConfig {
    fn to_monitor_config(&self) -> Option<MonitorConfig> {
        let mut config = MonitorConfig::default();
        if self.sample_interval_ms > 0 {
            config.tilt.sample_interval_ms = u64::from(self.sample_interval_ms);
        }
        if self.report_interval_ms > 0 {
            config.tilt.report_interval_ms = u64::from(self.report_interval_ms);
        }
        if self.window_duration_ms > 0 {
            config.tilt.window_duration_ms = u64::from(self.window_duration_ms);
        }
        if self.window_capacity > 0 {
            config.tilt.window_capacity = Some(self.window_capacity as usize);
        }
        if self.stability_threshold_rad > 0.0 {
            config.alarm.stability_threshold_rad = self.stability_threshold_rad;
        }
        config.tilt.dispersion = match self.dispersion {
            0 => DispersionMetric::Range,
            1 => DispersionMetric::StdDev,
            _ => return None,
        };
        if self.level_triggered != 0 {
            config.alarm.refire = RefirePolicy::LevelTriggered;
        }
        Some(config)
    }
}

fn into_engine(config: MonitorConfig) -> *mut UnlockEngine {
    match UnlockMonitor::new(config) {
        Ok(monitor) => Box::into_raw(Box::new(UnlockEngine {
            monitor,
            events: None,
        })),
        Err(err) => {
            warn!(error = %err, "engine creation rejected");
            ptr::null_mut()
        }
    }
}

// ============================================================================
// ENGINE LIFECYCLE
// ============================================================================

/// Create a new engine.
///
/// # Safety
/// - `config` must be a valid pointer to UnlockConfig.
/// - The returned pointer must be freed with `unlock_engine_destroy()`.
///
/// # Returns
/// - Pointer to UnlockEngine on success.
/// - NULL on failure.
#[no_mangle]
pub unsafe extern "C" fn unlock_engine_create(config: *const UnlockConfig) -> *mut UnlockEngine {
    if config.is_null() {
        return ptr::null_mut();
    }
    match (*config).to_monitor_config() {
        Some(config) => into_engine(config),
        None => ptr::null_mut(),
    }
}

/// Create a new engine from a JSON configuration document.
///
/// # Safety
/// - `json` must be a valid null-terminated C string.
/// - The returned pointer must be freed with `unlock_engine_destroy()`.
///
/// # Returns
/// - Pointer to UnlockEngine on success.
/// - NULL if the document is missing, malformed or out of range.
#[no_mangle]
pub unsafe extern "C" fn unlock_engine_create_json(json: *const c_char) -> *mut UnlockEngine {
    if json.is_null() {
        return ptr::null_mut();
    }
    let Ok(json) = CStr::from_ptr(json).to_str() else {
        return ptr::null_mut();
    };
    match MonitorConfig::from_json_str(json) {
        Ok(config) => into_engine(config),
        Err(err) => {
            warn!(error = %err, "engine config rejected");
            ptr::null_mut()
        }
    }
}

/// Destroy an engine.
///
/// # Safety
/// - `engine` must be a valid pointer from `unlock_engine_create*()`.
/// - Must not be called more than once for the same pointer.
#[no_mangle]
pub unsafe extern "C" fn unlock_engine_destroy(engine: *mut UnlockEngine) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Start monitoring and begin queueing events. Calling it again while
/// running is a no-op.
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn unlock_engine_start(engine: *mut UnlockEngine) -> UnlockStatus {
    if engine.is_null() {
        return UnlockStatus::NullPointer;
    }

    let engine = &mut *engine;
    if !engine.monitor.is_running() {
        engine.events = Some(engine.monitor.listen());
    }
    UnlockStatus::Ok
}

/// Stop monitoring. Events queued before the call stay available to
/// `unlock_engine_next_event_json()`.
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn unlock_engine_stop(engine: *mut UnlockEngine) -> UnlockStatus {
    if engine.is_null() {
        return UnlockStatus::NullPointer;
    }

    (*engine).monitor.unlisten();
    UnlockStatus::Ok
}

// ============================================================================
// INPUTS
// ============================================================================

/// Push one roll-angle sample in radians.
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn unlock_push_tilt(
    engine: *mut UnlockEngine,
    timestamp_ms: u64,
    radians: f64,
) -> UnlockStatus {
    if engine.is_null() {
        return UnlockStatus::NullPointer;
    }
    if !radians.is_finite() {
        return UnlockStatus::InvalidParameter;
    }

    let engine = &mut *engine;
    if !engine.monitor.is_running() {
        return UnlockStatus::NotRunning;
    }
    engine.monitor.on_tilt_sample(radians, timestamp_ms);
    UnlockStatus::Ok
}

/// Push one lock reading (non-zero = locked).
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn unlock_push_lock(
    engine: *mut UnlockEngine,
    timestamp_ms: u64,
    is_locked: i32,
) -> UnlockStatus {
    if engine.is_null() {
        return UnlockStatus::NullPointer;
    }

    let engine = &mut *engine;
    if !engine.monitor.is_running() {
        return UnlockStatus::NotRunning;
    }
    engine
        .monitor
        .on_lock_signal(LockSignal::from_is_locked(is_locked != 0), timestamp_ms);
    UnlockStatus::Ok
}

/// Report that the orientation sensor is missing for this session.
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn unlock_sensor_unavailable(engine: *mut UnlockEngine) -> UnlockStatus {
    if engine.is_null() {
        return UnlockStatus::NullPointer;
    }

    let engine = &mut *engine;
    if !engine.monitor.is_running() {
        return UnlockStatus::NotRunning;
    }
    engine.monitor.on_sensor_unavailable();
    UnlockStatus::Ok
}

unsafe fn drive_timer(
    engine: *mut UnlockEngine,
    produced: *mut i32,
    step: impl FnOnce(&mut UnlockMonitor) -> bool,
) -> UnlockStatus {
    if engine.is_null() {
        return UnlockStatus::NullPointer;
    }

    let engine = &mut *engine;
    if !engine.monitor.is_running() {
        return UnlockStatus::NotRunning;
    }
    let reported = step(&mut engine.monitor);
    if !produced.is_null() {
        *produced = i32::from(reported);
    }
    UnlockStatus::Ok
}

/// Emission timer fired.
///
/// On `Ok`, writes 1 to `produced` if a tilt report was emitted and 0 if
/// not. `produced` may be NULL.
///
/// # Safety
/// - `engine` must be a valid pointer.
/// - `produced` must be NULL or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn unlock_tick(
    engine: *mut UnlockEngine,
    timestamp_ms: u64,
    produced: *mut i32,
) -> UnlockStatus {
    drive_timer(engine, produced, |monitor| monitor.on_tick(timestamp_ms))
}

/// Tick only if the report interval has elapsed since the last report.
///
/// Same contract as `unlock_tick()`.
///
/// # Safety
/// - `engine` must be a valid pointer.
/// - `produced` must be NULL or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn unlock_poll(
    engine: *mut UnlockEngine,
    timestamp_ms: u64,
    produced: *mut i32,
) -> UnlockStatus {
    drive_timer(engine, produced, |monitor| monitor.poll(timestamp_ms))
}

// ============================================================================
// EVENT OUTPUT
// ============================================================================

/// Take the oldest queued event as a JSON string.
///
/// # Safety
/// - `engine` must be a valid pointer.
///
/// # Returns
/// - JSON string (MUST be freed with `unlock_free_string()`).
/// - NULL when no event is queued.
#[no_mangle]
pub unsafe extern "C" fn unlock_engine_next_event_json(engine: *mut UnlockEngine) -> *mut c_char {
    if engine.is_null() {
        return ptr::null_mut();
    }

    let engine = &*engine;
    let Some(record) = engine.events.as_ref().and_then(|rx| rx.try_recv().ok()) else {
        return ptr::null_mut();
    };

    match CString::new(record) {
        Ok(cstring) => cstring.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Free a string returned by `unlock_engine_next_event_json()`.
///
/// # Safety
/// - `ptr` must be a string returned by this library.
/// - Must not be called more than once for the same pointer.
#[no_mangle]
pub unsafe extern "C" fn unlock_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// STATUS QUERIES
// ============================================================================

/// Get the lock state (0 = unknown, 1 = locked, 2 = unlocked, -1 = NULL engine).
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn unlock_get_lock_state(engine: *const UnlockEngine) -> i32 {
    if engine.is_null() {
        return -1;
    }

    match (*engine).monitor.lock_state() {
        LockState::Unknown => 0,
        LockState::Locked => 1,
        LockState::Unlocked => 2,
    }
}

/// Get the number of alarms fired since creation.
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn unlock_get_alarm_count(engine: *const UnlockEngine) -> i64 {
    if engine.is_null() {
        return -1;
    }
    (*engine).monitor.alarm_count() as i64
}

/// Whether monitoring is running (1), stopped (0) or the engine is NULL (-1).
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn unlock_is_running(engine: *const UnlockEngine) -> i32 {
    if engine.is_null() {
        return -1;
    }
    i32::from((*engine).monitor.is_running())
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Get the library version string.
///
/// # Returns
/// - Static string, do NOT free.
#[no_mangle]
pub extern "C" fn unlock_version() -> *const c_char {
    static VERSION: &str = concat!("unlock-sensing/", env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config(window_capacity: u32) -> UnlockConfig {
        UnlockConfig {
            sample_interval_ms: 20,
            report_interval_ms: 100,
            window_duration_ms: 0,
            window_capacity,
            stability_threshold_rad: 0.0,
            dispersion: 0,
            level_triggered: 0,
        }
    }

    unsafe fn drain(engine: *mut UnlockEngine) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        loop {
            let ptr = unlock_engine_next_event_json(engine);
            if ptr.is_null() {
                return out;
            }
            let text = CStr::from_ptr(ptr).to_str().unwrap().to_string();
            unlock_free_string(ptr);
            out.push(serde_json::from_str(&text).unwrap());
        }
    }

    #[test]
    fn test_engine_lifecycle() {
        unsafe {
            let engine = unlock_engine_create(&config(0));
            assert!(!engine.is_null());
            assert_eq!(unlock_is_running(engine), 0);

            assert_eq!(unlock_engine_start(engine), UnlockStatus::Ok);
            assert_eq!(unlock_engine_start(engine), UnlockStatus::Ok);
            assert_eq!(unlock_is_running(engine), 1);

            assert_eq!(unlock_engine_stop(engine), UnlockStatus::Ok);
            assert_eq!(unlock_engine_stop(engine), UnlockStatus::Ok);
            assert_eq!(unlock_is_running(engine), 0);

            unlock_engine_destroy(engine);
        }
    }

    #[test]
    fn test_alarm_through_ffi() {
        unsafe {
            let engine = unlock_engine_create(&config(3));
            unlock_engine_start(engine);

            for i in 0..3 {
                assert_eq!(unlock_push_tilt(engine, i * 20, 0.0), UnlockStatus::Ok);
            }
            let mut produced = -1;
            assert_eq!(unlock_tick(engine, 60, &mut produced), UnlockStatus::Ok);
            assert_eq!(produced, 1);
            assert_eq!(unlock_push_lock(engine, 80, 0), UnlockStatus::Ok);
            assert_eq!(unlock_get_lock_state(engine), 2);
            assert_eq!(unlock_get_alarm_count(engine), 1);

            let events = drain(engine);
            let kinds: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
            assert_eq!(kinds, vec!["TILT_EVENT", "UNLOCK_EVENT", "ALARM_EVENT"]);
            assert!(events[2]["location"].is_null());

            unlock_engine_destroy(engine);
        }
    }

    #[test]
    fn test_events_survive_stop() {
        unsafe {
            let engine = unlock_engine_create(&config(1));
            unlock_engine_start(engine);
            unlock_push_lock(engine, 5, 1);
            unlock_engine_stop(engine);

            assert_eq!(unlock_push_lock(engine, 10, 0), UnlockStatus::NotRunning);
            let events = drain(engine);
            assert_eq!(events.len(), 1);
            assert_eq!(events[0]["type"], "LOCK_EVENT");

            unlock_engine_destroy(engine);
        }
    }

    #[test]
    fn test_timer_inputs_while_stopped() {
        unsafe {
            let engine = unlock_engine_create(&config(1));
            let mut produced = -1;
            assert_eq!(unlock_tick(engine, 0, &mut produced), UnlockStatus::NotRunning);
            assert_eq!(unlock_poll(engine, 0, &mut produced), UnlockStatus::NotRunning);
            assert_eq!(produced, -1);

            unlock_engine_start(engine);
            assert_eq!(unlock_poll(engine, 0, &mut produced), UnlockStatus::Ok);
            assert_eq!(produced, 0);
            unlock_push_tilt(engine, 10, 0.1);
            assert_eq!(unlock_tick(engine, 20, ptr::null_mut()), UnlockStatus::Ok);
            assert_eq!(unlock_tick(engine, 40, &mut produced), UnlockStatus::Ok);
            assert_eq!(produced, 1);

            unlock_engine_stop(engine);
            assert_eq!(unlock_tick(engine, 60, &mut produced), UnlockStatus::NotRunning);
            unlock_engine_destroy(engine);
        }
    }

    #[test]
    fn test_create_from_json() {
        unsafe {
            let json = CString::new(r#"{"tilt": {"window_capacity": 4}}"#).unwrap();
            let engine = unlock_engine_create_json(json.as_ptr());
            assert!(!engine.is_null());
            unlock_engine_destroy(engine);

            let bad = CString::new(r#"{"tilt": {"report_interval_ms": 0}}"#).unwrap();
            assert!(unlock_engine_create_json(bad.as_ptr()).is_null());
        }
    }

    #[test]
    fn test_invalid_parameters() {
        unsafe {
            let mut cfg = config(0);
            cfg.dispersion = 7;
            assert!(unlock_engine_create(&cfg).is_null());

            let engine = unlock_engine_create(&config(0));
            unlock_engine_start(engine);
            assert_eq!(unlock_push_tilt(engine, 0, f64::NAN), UnlockStatus::InvalidParameter);
            unlock_engine_destroy(engine);
        }
    }

    #[test]
    fn test_version() {
        let version = unlock_version();
        assert!(!version.is_null());

        unsafe {
            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(version_str.starts_with("unlock-sensing/"));
        }
    }

    #[test]
    fn test_null_safety() {
        unsafe {
            assert!(unlock_engine_create(ptr::null()).is_null());
            assert!(unlock_engine_create_json(ptr::null()).is_null());
            assert_eq!(unlock_engine_start(ptr::null_mut()), UnlockStatus::NullPointer);
            assert_eq!(unlock_push_tilt(ptr::null_mut(), 0, 0.0), UnlockStatus::NullPointer);
            assert_eq!(unlock_tick(ptr::null_mut(), 0, ptr::null_mut()), UnlockStatus::NullPointer);
            assert_eq!(unlock_poll(ptr::null_mut(), 0, ptr::null_mut()), UnlockStatus::NullPointer);
            assert_eq!(unlock_get_lock_state(ptr::null()), -1);
            assert!(unlock_engine_next_event_json(ptr::null_mut()).is_null());
            unlock_free_string(ptr::null_mut());
            unlock_engine_destroy(ptr::null_mut());
        }
    }
}
