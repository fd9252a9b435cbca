//! # Runtime events emitted by the supervisor.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Tunnel events**: tunnel opened / closed
//! - **Worker lifecycle events**: starting, stopped, transport failure, backoff, fatal
//! - **Shutdown events**: interrupt observed, worker closed, shutdown complete
//!
//! The [`Event`] struct carries additional metadata such as timestamps, attempt
//! numbers, reasons and backoff delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use shipvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::BackoffScheduled)
//!     .with_attempt(3)
//!     .with_failures(3)
//!     .with_delay(Duration::from_secs(8))
//!     .with_reason("connection refused");
//!
//! assert_eq!(ev.kind, EventKind::BackoffScheduled);
//! assert_eq!(ev.delay, Some(Duration::from_secs(8)));
//! assert_eq!(ev.reason.as_deref(), Some("connection refused"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Tunnel events ===
    /// Tunnel established, before the first worker.
    ///
    /// Sets:
    /// - `reason`: tunnel endpoint description
    TunnelOpened,

    /// Tunnel closed (emitted once, only if a tunnel was opened).
    TunnelClosed,

    // === Worker lifecycle events ===
    /// A fresh worker is being created for an attempt.
    ///
    /// Sets:
    /// - `attempt`: attempt number (1-based, per supervisor)
    WorkerStarting,

    /// Worker run returned cleanly; a new worker follows immediately.
    ///
    /// Sets:
    /// - `attempt`: attempt number
    WorkerStopped,

    /// Transport failed during creation or run of a worker.
    ///
    /// Sets:
    /// - `attempt`: attempt number
    /// - `reason`: transport error message
    TransportFailed,

    /// Respawn scheduled after a transport failure.
    ///
    /// Sets:
    /// - `attempt`: attempt that failed
    /// - `failures`: counted consecutive failures (capped)
    /// - `delay`: sleep before the next worker
    /// - `reason`: transport error message
    BackoffScheduled,

    /// Worker failed fatally; supervision ends with an error.
    ///
    /// Sets:
    /// - `attempt`: attempt number
    /// - `reason`: error message
    WorkerFatal,

    // === Shutdown events ===
    /// Interrupt observed; teardown begins.
    ///
    /// Sets:
    /// - `reason`: phase the interrupt arrived in (`running`, `backoff`, `starting`)
    ShutdownRequested,

    /// Active worker closed because of the interrupt.
    ///
    /// Sets:
    /// - `attempt`: attempt number of the closed worker
    WorkerClosed,

    /// Teardown finished; the process can exit.
    ShutdownComplete,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Attempt number (starting from 1).
    pub attempt: Option<u64>,
    /// Counted consecutive transport failures.
    pub failures: Option<u32>,
    /// Backoff delay before the next worker.
    pub delay: Option<Duration>,
    /// Human-readable reason (errors, endpoints, phases).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            attempt: None,
            failures: None,
            delay: None,
            reason: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an attempt number.
    #[inline]
    pub fn with_attempt(mut self, n: u64) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches the counted failure streak.
    #[inline]
    pub fn with_failures(mut self, n: u32) -> Self {
        self.failures = Some(n);
        self
    }

    /// Attaches a backoff delay.
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay = Some(d);
        self
    }
}
