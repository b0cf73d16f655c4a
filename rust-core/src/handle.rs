//! Shared, serialized access to a monitor.
//!
//! Sensor, timer and lock callbacks usually arrive on different host threads.
//! A [`MonitorHandle`] funnels all of them through one mutex so that the
//! window, tilt snapshot and lock state are only ever mutated by one callback
//! at a time. Every operation takes the lock, updates in-memory state,
//! optionally emits an event, and returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error};

use crate::error::{MonitorError, Result};
use crate::monitor::UnlockMonitor;
use crate::sink::{EventSink, JsonChannelSink};
use crate::types::{LockSignal, LockState, TiltState};

/// Cloneable, thread-safe handle to one monitor.
pub struct MonitorHandle<S: EventSink = JsonChannelSink> {
    inner: Arc<Mutex<UnlockMonitor<S>>>,
}

impl<S: EventSink> Clone for MonitorHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: EventSink> MonitorHandle<S> {
    /// Take ownership of a monitor.
    pub fn new(monitor: UnlockMonitor<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(monitor)),
        }
    }

    /// Run `f` with exclusive access to the monitor.
    pub fn with<R>(&self, f: impl FnOnce(&mut UnlockMonitor<S>) -> R) -> Result<R> {
        let mut guard = self.inner.lock().map_err(|_| MonitorError::LockPoisoned)?;
        Ok(f(&mut guard))
    }

    /// See [`UnlockMonitor::start`].
    pub fn start(&self) -> Result<bool> {
        self.with(|m| m.start())
    }

    /// See [`UnlockMonitor::stop`].
    pub fn stop(&self) -> Result<bool> {
        self.with(|m| m.stop())
    }

    /// See [`UnlockMonitor::on_tilt_sample`].
    pub fn on_tilt_sample(&self, radians: f64, now_ms: u64) -> Result<()> {
        self.with(|m| m.on_tilt_sample(radians, now_ms))
    }

    /// See [`UnlockMonitor::on_lock_signal`].
    pub fn on_lock_signal(&self, signal: impl Into<LockSignal>, now_ms: u64) -> Result<()> {
        let signal = signal.into();
        self.with(|m| m.on_lock_signal(signal, now_ms))
    }

    /// See [`UnlockMonitor::on_tick`].
    pub fn on_tick(&self, now_ms: u64) -> Result<bool> {
        self.with(|m| m.on_tick(now_ms))
    }

    /// See [`UnlockMonitor::poll`].
    pub fn poll(&self, now_ms: u64) -> Result<bool> {
        self.with(|m| m.poll(now_ms))
    }

    /// See [`UnlockMonitor::on_sensor_unavailable`].
    pub fn on_sensor_unavailable(&self) -> Result<bool> {
        self.with(|m| m.on_sensor_unavailable())
    }

    /// Current lock state.
    pub fn lock_state(&self) -> Result<LockState> {
        self.with(|m| m.lock_state())
    }

    /// Current tilt snapshot, `None` while unknown.
    ///
    /// Fails with [`MonitorError::SensorUnavailable`] once the orientation
    /// sensor has been reported missing for this session.
    pub fn tilt_state(&self) -> Result<Option<TiltState>> {
        self.with(|m| {
            if m.is_sensor_available() {
                Ok(m.tilt_state().copied())
            } else {
                Err(MonitorError::SensorUnavailable)
            }
        })?
    }

    /// Whether a session is active.
    pub fn is_running(&self) -> Result<bool> {
        self.with(|m| m.is_running())
    }
}

impl<S: EventSink + 'static> MonitorHandle<S> {
    /// Drive [`UnlockMonitor::poll`] from a background thread.
    ///
    /// The thread wakes every `interval`, reads `clock` and polls. It exits
    /// when the returned guard is dropped or the monitor lock is poisoned;
    /// dropping the guard wakes a parked thread immediately.
    pub fn spawn_ticker<C>(&self, interval: Duration, clock: C) -> TickerGuard
    where
        C: Fn() -> u64 + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = self.clone();
        let flag = Arc::clone(&stop);

        let thread = thread::spawn(move || {
            debug!(interval_ms = interval.as_millis() as u64, "ticker started");
            while !flag.load(Ordering::Acquire) {
                thread::park_timeout(interval);
                if flag.load(Ordering::Acquire) {
                    break;
                }
                if let Err(err) = handle.poll(clock()) {
                    error!(error = %err, "ticker stopping");
                    break;
                }
            }
            debug!("ticker exited");
        });

        TickerGuard {
            stop,
            thread: Some(thread),
        }
    }
}

/// Stops the background ticker when dropped.
#[derive(Debug)]
pub struct TickerGuard {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl TickerGuard {
    /// Stop the ticker and wait for its thread.
    pub fn shutdown(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            if thread.join().is_err() {
                error!("ticker thread panicked");
            }
        }
    }
}

impl Drop for TickerGuard {
    fn drop(&mut self) {
        self.halt();
    }
}
