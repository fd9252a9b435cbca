//! # Run a single worker attempt.
//!
//! Creates one [`Worker`] through the factory, drives it, and folds whatever
//! happens into a tagged [`Attempt`]:
//!
//! ```text
//! factory.create() ── Err(Transport) ─────────────► Attempt::TransportFailure
//!        │          ── Err(Fatal) ─────────────────► Attempt::Fatal
//!        │          ── interrupt ──────────────────► Attempt::Interrupted { worker: None }
//!        ▼
//! worker.run()     ── Ok(()) ──────────────────────► Attempt::Completed
//!                  ── Err(Transport) ──────────────► Attempt::TransportFailure
//!                  ── Err(Fatal) ──────────────────► Attempt::Fatal
//!                  ── interrupt (run dropped) ─────► Attempt::Interrupted { worker: Some(_) }
//! ```
//!
//! ## Rules
//! - The interrupt is polled **first** (`biased`), so a cancelled token always wins
//! - An interrupted worker is handed back **unclosed**; the supervisor closes it
//! - Publishes `WorkerStopped` / `TransportFailed` / `WorkerFatal` for terminal results

use tokio_util::sync::CancellationToken;

use crate::{
    config::Settings,
    error::{TransportError, WorkerError},
    events::{Event, EventKind},
    subscribers::SubscriberSet,
    tunnel::Tunnel,
    worker::{Worker, WorkerFactory},
};

/// Tagged result of one supervised attempt.
pub(crate) enum Attempt {
    /// Worker run returned normally.
    Completed,
    /// Transport failed during creation or run.
    TransportFailure(TransportError),
    /// Interrupt observed; `worker` is the still-open worker, if one was created.
    Interrupted { worker: Option<Box<dyn Worker>> },
    /// Non-recoverable failure.
    Fatal(WorkerError),
}

/// Executes a single attempt, publishing its terminal event to `events`.
pub(crate) async fn run_once(
    workers: &dyn WorkerFactory,
    settings: &Settings,
    tunnel: &Tunnel,
    shutdown: &CancellationToken,
    attempt: u64,
    events: &SubscriberSet,
) -> Attempt {
    let created = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return Attempt::Interrupted { worker: None },
        res = workers.create(settings, tunnel) => res,
    };
    let mut worker = match created {
        Ok(worker) => worker,
        Err(e) => return classify(e, attempt, events),
    };

    let res = tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        res = worker.run() => Some(res),
    };

    match res {
        None => Attempt::Interrupted {
            worker: Some(worker),
        },
        Some(Ok(())) => {
            events.emit(Event::new(EventKind::WorkerStopped).with_attempt(attempt));
            Attempt::Completed
        }
        Some(Err(e)) => classify(e, attempt, events),
    }
}

fn classify(err: WorkerError, attempt: u64, events: &SubscriberSet) -> Attempt {
    match err {
        WorkerError::Transport(e) => {
            events.emit(
                Event::new(EventKind::TransportFailed)
                    .with_attempt(attempt)
                    .with_reason(e.to_string()),
            );
            Attempt::TransportFailure(e)
        }
        fatal => {
            events.emit(
                Event::new(EventKind::WorkerFatal)
                    .with_attempt(attempt)
                    .with_reason(fatal.to_string()),
            );
            Attempt::Fatal(fatal)
        }
    }
}
