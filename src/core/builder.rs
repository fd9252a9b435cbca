use std::sync::Arc;

use crate::{
    config::{Settings, SupervisorConfig},
    error::ConfigError,
    subscribers::Subscribe,
    tunnel::{SshTunnelFactory, TunnelFactory},
    worker::WorkerFactory,
};

use super::supervisor::Supervisor;

/// Builder for constructing a [`Supervisor`].
///
/// Defaults: ssh tunnel factory (no tunnel unless configured), no subscribers.
pub struct SupervisorBuilder {
    settings: Settings,
    workers: Arc<dyn WorkerFactory>,
    tunnels: Arc<dyn TunnelFactory>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given settings and worker factory.
    pub fn new(settings: Settings, workers: Arc<dyn WorkerFactory>) -> Self {
        Self {
            settings,
            workers,
            tunnels: Arc::new(SshTunnelFactory::default()),
            subscribers: Vec::new(),
        }
    }

    /// Replaces the tunnel factory.
    pub fn with_tunnels(mut self, tunnels: Arc<dyn TunnelFactory>) -> Self {
        self.tunnels = tunnels;
        self
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive supervisor events through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Validates the supervisor settings and builds the supervisor.
    ///
    /// Fails fast on non-numeric or out-of-range `max_failure` / `respawn_delay`.
    pub fn build(self) -> Result<Supervisor, ConfigError> {
        let cfg = SupervisorConfig::from_settings(&self.settings)?;
        Ok(Supervisor::new_internal(
            cfg,
            Arc::new(self.settings),
            self.workers,
            self.tunnels,
            self.subscribers,
        ))
    }
}
