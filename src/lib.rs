//! # shipvisor
//!
//! **Shipvisor** is the supervision core of a log-shipping agent.
//!
//! It keeps a single long-running worker (the engine that tails files and
//! forwards events to a transport) alive for the lifetime of the process,
//! respawns it with exponential backoff when the transport fails, and manages
//! an optional ssh tunnel that proxies the transport traffic.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  Settings (immutable snapshot)
//!      │
//!      ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor (one per process)                                     │
//! │  - BackoffState (failure_count, max_failure, base_delay)          │
//! │  - Tunnel (None | Active), created once, closed once              │
//! │  - current Worker (at most one)                                   │
//! └──────┬──────────────────────┬───────────────────────────┬─────────┘
//!        ▼                      ▼                           │ emit(Event)
//!  TunnelFactory          WorkerFactory                     ▼
//!  (ssh -L ...)           (fresh worker per attempt)   SubscriberSet
//!                               │                           │
//!                               ▼                           ▼
//!                         Worker::run()                 LogWriter (tracing)
//! ```
//!
//! ### Lifecycle
//! ```text
//! tunnel = tunnels.create(settings)          (Tunnel::None if not configured)
//!
//! loop {
//!   ├─► attempt += 1, publish WorkerStarting
//!   ├─► run_once(): workers.create() + worker.run(), raced against the shutdown token
//!   │       ├─ Ok                ─► publish WorkerStopped, respawn immediately
//!   │       ├─ Transport failure ─► failure_count = min(failure_count + 1, max_failure)
//!   │       │                       delay = respawn_delay ^ failure_count
//!   │       │                       publish BackoffScheduled, sleep(delay) (cancellable)
//!   │       ├─ Fatal             ─► close tunnel, return Err
//!   │       └─ Interrupt         ─► close worker, close tunnel, return Ok(Shutdown)
//! }
//! ```
//!
//! ## Features
//! | Area              | Description                                             | Key types / traits                         |
//! |-------------------|---------------------------------------------------------|--------------------------------------------|
//! | **Supervision**   | Respawn loop, backoff, shutdown ordering.               | [`Supervisor`], [`Shutdown`]               |
//! | **Policies**      | Capped exponential respawn delay.                       | [`BackoffState`]                           |
//! | **Workers**       | Worker contract and a child-process implementation.     | [`Worker`], [`WorkerFactory`], [`CommandWorker`] |
//! | **Tunnel**        | Optional ssh port forwarding.                           | [`Tunnel`], [`TunnelFactory`], [`SshTunnel`] |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, alerts).  | [`Subscribe`], [`LogWriter`]               |
//! | **Errors**        | Typed errors for config, tunnel, transport, workers.    | [`SupervisorError`], [`WorkerError`]       |
//! | **Configuration** | String settings snapshot, parsed and validated lazily.  | [`Settings`], [`SupervisorConfig`]         |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//! use shipvisor::{
//!     Settings, ShutdownCause, Supervisor, Tunnel, Worker, WorkerError, WorkerFactory,
//! };
//!
//! struct Idle(CancellationToken);
//!
//! #[async_trait]
//! impl Worker for Idle {
//!     async fn run(&mut self) -> Result<(), WorkerError> {
//!         // pretend to ship until someone hits Ctrl-C
//!         self.0.cancel();
//!         std::future::pending().await
//!     }
//!     async fn close(&mut self) {}
//! }
//!
//! struct Factory(CancellationToken);
//!
//! #[async_trait]
//! impl WorkerFactory for Factory {
//!     async fn create(&self, _: &Settings, _: &Tunnel) -> Result<Box<dyn Worker>, WorkerError> {
//!         Ok(Box::new(Idle(self.0.clone())))
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let shutdown = CancellationToken::new();
//!     let sup = Supervisor::builder(Settings::with_defaults(), Arc::new(Factory(shutdown.clone())))
//!         .build()?;
//!
//!     let done = sup.run(shutdown).await?;
//!     assert_eq!(done.cause, ShutdownCause::WhileRunning);
//!     assert_eq!(done.attempts, 1);
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod policies;
mod subscribers;
mod tunnel;
mod worker;

pub mod process;

// ---- Public re-exports ----

pub use config::{MAX_FAILURE, RESPAWN_DELAY, Settings, SupervisorConfig, TRANSPORT};
pub use crate::core::{Shutdown, ShutdownCause, ShutdownSignals, Supervisor, SupervisorBuilder};
pub use error::{
    ConfigError, ProcessError, SupervisorError, TransportError, TunnelError, WorkerError,
};
pub use events::{Event, EventKind};
pub use policies::BackoffState;
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use tunnel::{
    NoTunnel, SshTunnel, SshTunnelConfig, SshTunnelFactory, Tunnel, TunnelFactory, TunnelHandle,
};
pub use worker::{
    CommandWorker, CommandWorkerConfig, CommandWorkerFactory, Worker, WorkerFactory,
};
