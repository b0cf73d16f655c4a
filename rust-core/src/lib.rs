//! Unlock Sensing Engine Library
//!
//! A background monitor that watches device tilt and lock transitions and
//! raises an alarm when a device is left unlocked, lying flat and perfectly
//! still: the signature of a phone set down and forgotten.
//!
//! # Design Philosophy
//!
//! - **Abstract inputs**: the engine sees timestamped roll samples and a
//!   boolean lock signal. Acquiring them is the host's job.
//! - **Fixed memory**: O(1) work per sample over a fixed-capacity window.
//! - **One owner**: all mutable state lives in one [`UnlockMonitor`]; hosts
//!   with concurrent callbacks share it through a [`MonitorHandle`].
//! - **Best-effort output**: events go to an [`EventSink`]; with no listener
//!   they are dropped, never queued or replayed.
//!
//! # Example
//!
//! ```
//! use unlock_sensing::{MonitorConfig, RecordingSink, UnlockMonitor, EventKind};
//!
//! let mut config = MonitorConfig::default();
//! config.tilt.window_capacity = Some(10);
//!
//! let mut monitor = UnlockMonitor::with_sink(config, RecordingSink::new()).unwrap();
//! monitor.start();
//! for i in 0..10 {
//!     monitor.on_tilt_sample(0.0, i * 50);
//! }
//! monitor.on_tick(500);
//! monitor.on_lock_signal(false, 550);
//!
//! let kinds: Vec<_> = monitor.sink().events().iter().map(|e| e.kind).collect();
//! assert_eq!(kinds, [EventKind::TiltReport, EventKind::UnlockChanged, EventKind::Alarm]);
//! ```

pub mod alarm;
pub mod cadence;
pub mod collaborators;
pub mod error;
pub mod ffi;
pub mod handle;
pub mod lock;
pub mod monitor;
pub mod sink;
pub mod tilt;
pub mod types;
pub mod window;


// Re-export commonly used types
pub use alarm::{evaluate, AlarmCondition, AlarmConfig, AlarmEvaluator, AlarmThresholds, RefirePolicy};
pub use cadence::Cadence;
pub use collaborators::{AlarmNotifier, LatestFix, LocationFix, LocationProvider, NoLocation};
pub use error::{MonitorError, Result};
pub use handle::{MonitorHandle, TickerGuard};
pub use lock::{LockStateTracker, LockTransition};
pub use monitor::{MonitorConfig, UnlockMonitor};
pub use sink::{EventEncoder, EventSink, JsonChannelSink, JsonEncoder, RecordingSink, SinkStats};
pub use tilt::{TiltAnalyzer, TiltConfig, TiltReport};
pub use types::{EventKind, LockSignal, LockState, MonitorEvent, TiltBand, TiltSample, TiltState};
pub use window::{DispersionMetric, SampleWindow, WindowSnapshot};
