//! # Supervisor: keeps one worker alive, backs off on transport failures.
//!
//! The [`Supervisor`] owns the backoff counter, the optional tunnel and the
//! currently active worker. It runs worker attempts strictly one after another
//! until an interrupt (the shutdown token) or a fatal error ends supervision.
//!
//! ## State machine
//! ```text
//!             tunnel = tunnels.create()                     (once)
//!                      │
//!                      ▼
//!   ┌────────────► Starting ── workers.create() ──► Running ── run() ──┐
//!   │                                                 │               │
//!   │   Ok(())  (no reset of failure_count) ◄─────────┘               │
//!   │                                                                 │
//!   │   TransportFailure:                                             │
//!   │     failure_count = min(failure_count + 1, max_failure)         │
//!   │     delay = respawn_delay ^ failure_count                       │
//!   └──── BackoffWait ◄── sleep(delay) ◄──────────────────────────────┘
//!
//!   interrupt in Running      ─► ShuttingDown: close worker, close tunnel
//!   interrupt in BackoffWait  ─► ShuttingDown: close tunnel
//!   Fatal                     ─► close tunnel, Err(SupervisorError::Worker)
//! ```
//!
//! ## Rules
//! - At most one worker exists at a time; none is created after the interrupt
//! - The tunnel is established before the first worker and closed exactly once,
//!   after the last worker stopped, on every exit path
//! - An interrupted worker is closed exactly once
//! - Every transition is published as an [`Event`]; the subscriber queues are
//!   drained before [`Supervisor::run`] returns
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use shipvisor::{CommandWorkerFactory, LogWriter, Settings, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut settings = Settings::with_defaults();
//!     settings.set("worker_command", "tail-shipper --transport redis");
//!
//!     let workers = Arc::new(CommandWorkerFactory::from_settings(&settings)?);
//!     let sup = Supervisor::builder(settings, workers)
//!         .with_subscribers(vec![Arc::new(LogWriter::new())])
//!         .build()?;
//!
//!     let shutdown = CancellationToken::new();
//!     let done = sup.run(shutdown).await?;
//!     println!("stopped after {} attempts", done.attempts);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::{task, time};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    config::{Settings, SupervisorConfig},
    core::runner::{Attempt, run_once},
    error::{SupervisorError, WorkerError},
    events::{Event, EventKind},
    policies::BackoffState,
    subscribers::{Subscribe, SubscriberSet},
    tunnel::{Tunnel, TunnelFactory},
    worker::{Worker, WorkerFactory},
};

use super::builder::SupervisorBuilder;

/// Supervisor phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Starting,
    Running,
    BackoffWait,
    ShuttingDown,
}

/// Where the interrupt was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// Before any worker was created (tunnel setup).
    BeforeStart,
    /// While a worker was being created or was running.
    WhileRunning,
    /// During the backoff sleep; the pending respawn was abandoned.
    DuringBackoff,
}

impl ShutdownCause {
    /// Short label used in events and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownCause::BeforeStart => "starting",
            ShutdownCause::WhileRunning => "running",
            ShutdownCause::DuringBackoff => "backoff",
        }
    }
}

/// Summary of a user-requested shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shutdown {
    /// Phase the interrupt arrived in.
    pub cause: ShutdownCause,
    /// Workers created over the supervisor lifetime.
    pub attempts: u64,
    /// Counted consecutive transport failures at shutdown.
    pub failure_count: u32,
    /// Whether a tunnel was open and has been closed.
    pub tunnel_closed: bool,
}

/// Why the worker loop ended.
enum LoopExit {
    Interrupted {
        cause: ShutdownCause,
        worker: Option<Box<dyn Worker>>,
    },
    Fatal(WorkerError),
}

/// Keeps a single worker alive, respawning it with exponential backoff.
pub struct Supervisor {
    cfg: SupervisorConfig,
    settings: Arc<Settings>,
    backoff: BackoffState,
    workers: Arc<dyn WorkerFactory>,
    tunnels: Arc<dyn TunnelFactory>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    phase: Phase,
    attempts: u64,
}

impl Supervisor {
    /// Starts building a supervisor around a worker factory.
    pub fn builder(settings: Settings, workers: Arc<dyn WorkerFactory>) -> SupervisorBuilder {
        SupervisorBuilder::new(settings, workers)
    }

    pub(crate) fn new_internal(
        cfg: SupervisorConfig,
        settings: Arc<Settings>,
        workers: Arc<dyn WorkerFactory>,
        tunnels: Arc<dyn TunnelFactory>,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        Self {
            backoff: cfg.backoff(),
            cfg,
            settings,
            workers,
            tunnels,
            subscribers,
            phase: Phase::Starting,
            attempts: 0,
        }
    }

    /// Validated supervisor settings.
    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// Supervises workers until `shutdown` is cancelled or a fatal error occurs.
    ///
    /// Returns `Ok(Shutdown)` for every interrupt-driven exit. Tunnel and fatal
    /// worker errors are returned as `Err`; the tunnel is closed first.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<Shutdown, SupervisorError> {
        let events = SubscriberSet::new(self.subscribers.clone());
        let res = self.supervise(&shutdown, &events).await;
        events.shutdown().await;
        res
    }

    async fn supervise(
        &mut self,
        shutdown: &CancellationToken,
        events: &SubscriberSet,
    ) -> Result<Shutdown, SupervisorError> {
        let tunnel = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            res = self.tunnels.create(&self.settings) => Some(res?),
        };
        let Some(tunnel) = tunnel else {
            return Ok(self.finish(ShutdownCause::BeforeStart, None, Tunnel::None, events).await);
        };
        if let Some(endpoint) = tunnel.endpoint() {
            events.emit(Event::new(EventKind::TunnelOpened).with_reason(endpoint.to_string()));
        }

        match self.supervise_workers(&tunnel, shutdown, events).await {
            LoopExit::Interrupted { cause, worker } => {
                Ok(self.finish(cause, worker, tunnel, events).await)
            }
            LoopExit::Fatal(err) => {
                self.transition(Phase::ShuttingDown);
                if tunnel.close().await {
                    events.emit(Event::new(EventKind::TunnelClosed));
                }
                Err(SupervisorError::Worker(err))
            }
        }
    }

    /// The respawn loop. Only returns on interrupt or fatal error.
    async fn supervise_workers(
        &mut self,
        tunnel: &Tunnel,
        shutdown: &CancellationToken,
        events: &SubscriberSet,
    ) -> LoopExit {
        loop {
            self.transition(Phase::Starting);
            if shutdown.is_cancelled() {
                return LoopExit::Interrupted {
                    cause: ShutdownCause::WhileRunning,
                    worker: None,
                };
            }

            self.attempts += 1;
            let attempt = self.attempts;
            events.emit(Event::new(EventKind::WorkerStarting).with_attempt(attempt));

            self.transition(Phase::Running);
            let outcome = run_once(
                self.workers.as_ref(),
                &self.settings,
                tunnel,
                shutdown,
                attempt,
                events,
            )
            .await;

            match outcome {
                Attempt::Completed => {
                    // a worker that never pends must not starve the interrupt
                    task::yield_now().await;
                    continue;
                }
                Attempt::Interrupted { worker } => {
                    return LoopExit::Interrupted {
                        cause: ShutdownCause::WhileRunning,
                        worker,
                    };
                }
                Attempt::Fatal(err) => return LoopExit::Fatal(err),
                Attempt::TransportFailure(err) => {
                    let delay = self.backoff.record_failure();
                    self.transition(Phase::BackoffWait);
                    events.emit(
                        Event::new(EventKind::BackoffScheduled)
                            .with_attempt(attempt)
                            .with_failures(self.backoff.failure_count())
                            .with_delay(delay)
                            .with_reason(err.to_string()),
                    );

                    let sleep = time::sleep(delay);
                    tokio::pin!(sleep);
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => {
                            return LoopExit::Interrupted {
                                cause: ShutdownCause::DuringBackoff,
                                worker: None,
                            };
                        }
                        _ = &mut sleep => {}
                    }
                }
            }
        }
    }

    /// Interrupt teardown: worker first, then tunnel.
    async fn finish(
        &mut self,
        cause: ShutdownCause,
        worker: Option<Box<dyn Worker>>,
        tunnel: Tunnel,
        events: &SubscriberSet,
    ) -> Shutdown {
        self.transition(Phase::ShuttingDown);
        events.emit(Event::new(EventKind::ShutdownRequested).with_reason(cause.as_str()));

        if let Some(mut worker) = worker {
            worker.close().await;
            events.emit(Event::new(EventKind::WorkerClosed).with_attempt(self.attempts));
        }

        let tunnel_closed = tunnel.close().await;
        if tunnel_closed {
            events.emit(Event::new(EventKind::TunnelClosed));
        }

        events.emit(Event::new(EventKind::ShutdownComplete));
        Shutdown {
            cause,
            attempts: self.attempts,
            failure_count: self.backoff.failure_count(),
            tunnel_closed,
        }
    }

    fn transition(&mut self, next: Phase) {
        if self.phase != next {
            debug!(from = ?self.phase, to = ?next, attempt = self.attempts, "supervisor phase");
            self.phase = next;
        }
    }
}
