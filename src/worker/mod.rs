//! # Worker handles and their factory.
//!
//! A [`Worker`] is one run of the tailing/shipping engine. The supervisor asks
//! the [`WorkerFactory`] for a fresh worker on every attempt and drops it after
//! its run returns; a worker is never reused.
//!
//! ```text
//! WorkerFactory::create(settings, tunnel)
//!     ├─ Err(Transport) ──► treated like a transport failure during run
//!     ├─ Err(Fatal)     ──► supervision ends
//!     └─ Ok(worker)
//!          └─► worker.run()
//!                ├─ Ok(())          clean stop, respawn immediately
//!                ├─ Err(Transport)  respawn after backoff
//!                ├─ Err(Fatal)      supervision ends
//!                └─ (interrupt)     run future dropped, worker.close() called once
//! ```

mod command;

use async_trait::async_trait;

use crate::{config::Settings, error::WorkerError, tunnel::Tunnel};

pub use command::{CommandWorker, CommandWorkerConfig, CommandWorkerFactory};

/// One supervised run of the shipping engine.
#[async_trait]
pub trait Worker: Send + 'static {
    /// Drives the engine until it stops or fails.
    ///
    /// The supervisor may drop this future at any await point when an interrupt
    /// arrives, and then calls [`Worker::close`].
    async fn run(&mut self) -> Result<(), WorkerError>;

    /// Aborts an in-progress run. Best effort: never fails, safe at any time
    /// after creation.
    async fn close(&mut self);
}

/// Creates a fresh [`Worker`] per attempt.
#[async_trait]
pub trait WorkerFactory: Send + Sync + 'static {
    /// Builds a worker that reaches the transport directly or through `tunnel`.
    async fn create(
        &self,
        settings: &Settings,
        tunnel: &Tunnel,
    ) -> Result<Box<dyn Worker>, WorkerError>;
}
