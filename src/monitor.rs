//! Monitor Session Plumbing
//!
//! Shared session state mutated by the capture callback and read by the
//! main loop, plus the collaborator seams the loop is driven through:
//! a monotonic clock, a display sink and a key-press source. The loop
//! itself lives on `DefenseSystem`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::trace;

use crate::config::DetectionConfig;
use crate::models::{DefenseStats, ThreatDetection};
use crate::tracker::{DeviceTable, TrackedDevice};

/// Monotonic time source, in milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Production clock measuring from construction time
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Structured view handed to the display adapter on each refresh
pub struct MonitorView<'a> {
    pub stats: &'a DefenseStats,
    /// Tracked devices, most recently seen first
    pub devices: &'a [TrackedDevice],
    pub active_threats: usize,
    pub total_threats: u32,
}

/// Rendering surface for the engine's structured events. The engine
/// never formats screens itself; adapters decide how (and whether) to
/// show things.
pub trait DisplaySink {
    /// One-line status change
    fn status(&mut self, line: &str);
    /// A newly appended detection
    fn alert(&mut self, detection: &ThreatDetection);
    /// Periodic snapshot of the whole session
    fn refresh(&mut self, view: &MonitorView<'_>);
}

/// Key-press source polled once per loop iteration
pub trait InputSource {
    fn escape_pressed(&mut self) -> bool;
}

/// Handle for stopping a running monitor from another context
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub(crate) fn new(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }

    /// Request the monitor loop to exit at its next iteration
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-session state shared between the capture callback and the main
/// loop. The owner wraps it in a mutex; nothing here blocks.
pub struct SessionState {
    pub table: DeviceTable,
    /// Append-only within a session, bounded by the configured cap
    pub active_threats: Vec<ThreatDetection>,
    pub stats: DefenseStats,
    dropped_threats: u32,
    max_active_threats: usize,
}

impl SessionState {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            table: DeviceTable::new(config),
            active_threats: Vec::new(),
            stats: DefenseStats::default(),
            dropped_threats: 0,
            max_active_threats: config.max_active_threats,
        }
    }

    /// Append a detection, silently dropping past the cap
    pub fn push_threat(&mut self, detection: ThreatDetection) {
        if self.active_threats.len() >= self.max_active_threats {
            self.dropped_threats += 1;
            trace!("active threat list full, dropping detection");
            return;
        }
        self.active_threats.push(detection);
    }

    pub fn dropped_threats(&self) -> u32 {
        self.dropped_threats
    }

    /// Reset everything for a new session
    pub fn clear(&mut self) {
        self.table.clear();
        self.active_threats.clear();
        self.stats = DefenseStats::default();
        self.dropped_threats = 0;
    }
}
