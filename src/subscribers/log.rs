//! # LogWriter: event narrator
//!
//! A subscriber that turns supervisor [`Event`]s into `tracing` lines.
//! The binary always installs it; library users may attach their own instead.
//!
//! ## Example output
//! ```text
//! INFO proxying transport through ssh tunnel endpoint=127.0.0.1:6379
//! INFO starting worker attempt=1
//! WARN caught transport exception, respawning in 3 seconds attempt=1 failures=1 reason=...
//! INFO shutting down phase=running
//! INFO worker closed attempt=2
//! INFO tunnel closed
//! INFO shutdown complete
//! ```

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::TunnelOpened => {
                info!(endpoint = reason, "proxying transport through ssh tunnel");
            }
            EventKind::TunnelClosed => {
                info!("tunnel closed");
            }
            EventKind::WorkerStarting => {
                info!(attempt = e.attempt, "starting worker");
            }
            EventKind::WorkerStopped => {
                debug!(attempt = e.attempt, "worker stopped cleanly, starting a fresh one");
            }
            EventKind::TransportFailed => {
                debug!(attempt = e.attempt, reason, "transport failed");
            }
            EventKind::BackoffScheduled => {
                let secs = e.delay.map(|d| d.as_secs()).unwrap_or_default();
                warn!(
                    attempt = e.attempt,
                    failures = e.failures,
                    reason,
                    "caught transport exception, respawning in {secs} seconds"
                );
            }
            EventKind::WorkerFatal => {
                error!(attempt = e.attempt, reason, "worker failed fatally");
            }
            EventKind::ShutdownRequested => {
                info!(phase = reason, "shutting down");
            }
            EventKind::WorkerClosed => {
                info!(attempt = e.attempt, "worker closed");
            }
            EventKind::ShutdownComplete => {
                info!("shutdown complete");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
