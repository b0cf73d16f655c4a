//! Event output boundary.
//!
//! Producers push [`MonitorEvent`]s into an [`EventSink`]; a single external
//! listener drains them. Delivery is best effort and at most once: with no
//! listener attached, events are dropped rather than queued, and nothing is
//! ever retried or replayed.
//!
//! The production sink, [`JsonChannelSink`], encodes each event into one
//! self-contained JSON record and hands it to a bounded `mpsc` receiver
//! owned by the host bridge. A listener that falls behind loses the newest
//! records once its queue is full; the queue never grows past its bound.
//! An encoding failure drops that event, is logged and counted, and never
//! stops later events.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use tracing::{debug, error};

use crate::error::Result;
use crate::types::MonitorEvent;

/// Records a listener may leave undrained (25 s of tilt reports at 10 Hz).
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Largest listener queue accepted by configuration.
pub const MAX_QUEUE_CAPACITY: usize = 65_536;

/// Destination for monitor events.
pub trait EventSink: Send {
    /// Push one event. Must not block.
    fn emit(&mut self, event: MonitorEvent);

    /// Whether a consumer is currently attached.
    fn has_listener(&self) -> bool {
        true
    }
}

/// Delivery counters for a sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Records handed to a listener.
    pub delivered: u64,
    /// Events dropped because nobody was listening.
    pub dropped_no_listener: u64,
    /// Events dropped because the listener's queue was full.
    pub dropped_queue_full: u64,
    /// Events dropped because they could not be encoded.
    pub encode_failures: u64,
}

/// Turns an event into a wire record.
pub trait EventEncoder: Send {
    /// Encode one event.
    fn encode(&self, event: &MonitorEvent) -> Result<String>;
}

/// Compact JSON, one object per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl EventEncoder for JsonEncoder {
    fn encode(&self, event: &MonitorEvent) -> Result<String> {
        Ok(serde_json::to_string(event)?)
    }
}

/// Single-consumer, bounded channel of JSON records.
#[derive(Debug)]
pub struct JsonChannelSink<E: EventEncoder = JsonEncoder> {
    sender: Option<SyncSender<String>>,
    queue_capacity: usize,
    encoder: E,
    stats: SinkStats,
}

impl JsonChannelSink<JsonEncoder> {
    /// Create a sink with no listener attached.
    pub fn new() -> Self {
        Self::with_encoder(JsonEncoder)
    }

    /// Create a sink whose listener queue holds at most `queue_capacity`
    /// records (clamped to `1..=MAX_QUEUE_CAPACITY`).
    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self::with_encoder(JsonEncoder).queue_capacity(queue_capacity)
    }
}

impl Default for JsonChannelSink<JsonEncoder> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EventEncoder> JsonChannelSink<E> {
    /// Create a sink with a custom encoder.
    pub fn with_encoder(encoder: E) -> Self {
        Self {
            sender: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            encoder,
            stats: SinkStats::default(),
        }
    }

    /// Set the queue bound used by the next [`attach`](Self::attach).
    pub fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity.clamp(1, MAX_QUEUE_CAPACITY);
        self
    }

    /// Attach a listener and return its receiving end.
    ///
    /// Replaces any previous listener; the old receiver keeps whatever was
    /// already delivered to it but gets nothing new.
    pub fn attach(&mut self) -> Receiver<String> {
        let (tx, rx) = mpsc::sync_channel(self.queue_capacity);
        self.sender = Some(tx);
        rx
    }

    /// Detach the current listener. Records already sent stay readable on
    /// its receiver.
    pub fn detach(&mut self) {
        self.sender = None;
    }

    /// Delivery counters.
    pub fn stats(&self) -> SinkStats {
        self.stats
    }
}

impl<E: EventEncoder> EventSink for JsonChannelSink<E> {
    fn emit(&mut self, event: MonitorEvent) {
        let Some(sender) = self.sender.as_ref() else {
            self.stats.dropped_no_listener += 1;
            debug!(kind = event.kind.wire_name(), "no listener attached; event dropped");
            return;
        };

        let record = match self.encoder.encode(&event) {
            Ok(record) => record,
            Err(err) => {
                self.stats.encode_failures += 1;
                error!(kind = event.kind.wire_name(), error = %err, "failed to encode event; dropped");
                return;
            }
        };

        match sender.try_send(record) {
            Ok(()) => self.stats.delivered += 1,
            Err(TrySendError::Full(_)) => {
                self.stats.dropped_queue_full += 1;
                debug!(
                    kind = event.kind.wire_name(),
                    dropped = self.stats.dropped_queue_full,
                    "listener queue full; event dropped"
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                // Receiver hung up: behave as if the listener detached.
                self.sender = None;
                self.stats.dropped_no_listener += 1;
                debug!(kind = event.kind.wire_name(), "listener gone; event dropped");
            }
        }
    }

    fn has_listener(&self) -> bool {
        self.sender.is_some()
    }
}

/// In-memory sink that keeps every event, in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Vec<MonitorEvent>,
}

impl RecordingSink {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far.
    pub fn events(&self) -> &[MonitorEvent] {
        &self.events
    }

    /// Take all recorded events, leaving the recorder empty.
    pub fn drain(&mut self) -> Vec<MonitorEvent> {
        std::mem::take(&mut self.events)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: MonitorEvent) {
        self.events.push(event);
    }
}
