//! # Command-backed worker.
//!
//! Runs the shipping engine as a child process (`sh -c <worker_command>`) and maps
//! its exit status onto the worker contract:
//!
//! | exit status                 | meaning            |
//! |-----------------------------|--------------------|
//! | `0`                         | clean stop         |
//! | `transport_exit_code` (75)  | transport failure  |
//! | anything else, or a signal  | fatal              |
//!
//! The child sees `SHIPVISOR_TRANSPORT` and, when a tunnel is active,
//! `SHIPVISOR_TUNNEL_ADDR`. With a tunnel, the factory first probes the tunnel
//! endpoint; an unreachable endpoint is a transport failure raised at creation.
//!
//! On Unix the shell leads its own process group; `close` kills the whole group,
//! so engines forked by pipelines or wrapper scripts stop with it.

use std::net::SocketAddr;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time;
use tracing::{debug, warn};

use super::{Worker, WorkerFactory};
use crate::config::{Settings, TRANSPORT};
use crate::error::{ConfigError, TransportError, WorkerError};
use crate::tunnel::Tunnel;

/// `EX_TEMPFAIL` from `sysexits.h`.
const DEFAULT_TRANSPORT_EXIT_CODE: i32 = 75;
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Settings of the command-backed worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandWorkerConfig {
    /// Shell command line of the shipping engine.
    pub command: String,
    /// Transport name exported to the engine.
    pub transport: String,
    /// Exit code the engine uses to report a transport failure.
    pub transport_exit_code: i32,
    /// Connect timeout for the tunnel endpoint probe.
    pub probe_timeout: Duration,
}

impl CommandWorkerConfig {
    /// Reads `worker_command`, `transport`, `transport_exit_code` and
    /// `tunnel_probe_timeout_ms`.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let command = settings
            .get("worker_command")
            .ok_or_else(|| ConfigError::Missing {
                key: "worker_command".to_string(),
            })?
            .to_string();

        let transport_exit_code = match settings.parse_u64("transport_exit_code")? {
            None => DEFAULT_TRANSPORT_EXIT_CODE,
            Some(code) if code <= 255 => code as i32,
            Some(code) => {
                return Err(ConfigError::InvalidNumber {
                    key: "transport_exit_code".to_string(),
                    value: code.to_string(),
                });
            }
        };

        let probe_timeout = settings
            .parse_u64("tunnel_probe_timeout_ms")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_PROBE_TIMEOUT);

        Ok(Self {
            command,
            transport: settings.get(TRANSPORT).unwrap_or("stdout").to_string(),
            transport_exit_code,
            probe_timeout,
        })
    }

    fn shell(&self) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(&self.command);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(&self.command);
            #[cfg(unix)]
            cmd.process_group(0);
            cmd
        }
    }

    fn classify(&self, status: ExitStatus) -> Result<(), WorkerError> {
        match status.code() {
            Some(0) => Ok(()),
            Some(code) if code == self.transport_exit_code => Err(TransportError::new(
                &self.transport,
                format!("worker exited with code {code}"),
            )
            .into()),
            Some(code) => Err(WorkerError::fatal(format!("worker exited with code {code}"))),
            None => Err(WorkerError::fatal(format!("worker terminated: {status}"))),
        }
    }
}

/// Worker running the shipping engine as a child process.
#[derive(Debug)]
pub struct CommandWorker {
    cfg: CommandWorkerConfig,
    command: Option<Command>,
    child: Option<Child>,
}

impl CommandWorker {
    /// Prepares a worker; the process is spawned by [`Worker::run`].
    pub fn new(cfg: CommandWorkerConfig, tunnel: Option<SocketAddr>) -> Self {
        let mut command = cfg.shell();
        command
            .env("SHIPVISOR_TRANSPORT", &cfg.transport)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(addr) = tunnel {
            command.env("SHIPVISOR_TUNNEL_ADDR", addr.to_string());
        }
        Self {
            cfg,
            command: Some(command),
            child: None,
        }
    }
}

#[async_trait]
impl Worker for CommandWorker {
    async fn run(&mut self) -> Result<(), WorkerError> {
        let mut command = self
            .command
            .take()
            .ok_or_else(|| WorkerError::fatal("worker already ran"))?;
        let child = command
            .spawn()
            .map_err(|e| WorkerError::fatal(format!("cannot spawn worker: {e}")))?;
        debug!(pid = child.id(), command = %self.cfg.command, "worker process spawned");

        let child = self.child.insert(child);
        let status = child
            .wait()
            .await
            .map_err(|e| WorkerError::fatal(format!("cannot wait for worker: {e}")))?;
        self.child = None;
        self.cfg.classify(status)
    }

    async fn close(&mut self) {
        self.command = None;
        let Some(mut child) = self.child.take() else {
            return;
        };
        kill_tree(&mut child);
        if let Err(e) = child.wait().await {
            warn!(error = %e, "failed to reap worker process");
        }
    }
}

/// Kills the worker's process group, so engines started by the shell go too.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => {}
        Err(errno) => {
            debug!(pid, error = %errno, "worker process group already gone");
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "worker process already gone");
            }
        }
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "worker process already gone");
    }
}

/// Factory producing [`CommandWorker`]s.
#[derive(Clone, Debug)]
pub struct CommandWorkerFactory {
    cfg: CommandWorkerConfig,
}

impl CommandWorkerFactory {
    /// Creates a factory from an already validated config.
    pub fn new(cfg: CommandWorkerConfig) -> Self {
        Self { cfg }
    }

    /// Validates the worker settings and creates a factory.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        CommandWorkerConfig::from_settings(settings).map(Self::new)
    }

    async fn probe(&self, addr: SocketAddr) -> Result<(), TransportError> {
        match time::timeout(self.cfg.probe_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(TransportError::new(
                &self.cfg.transport,
                format!("tunnel endpoint {addr} unreachable: {e}"),
            )),
            Err(_) => Err(TransportError::new(
                &self.cfg.transport,
                format!(
                    "tunnel endpoint {addr} did not answer within {:?}",
                    self.cfg.probe_timeout
                ),
            )),
        }
    }
}

#[async_trait]
impl WorkerFactory for CommandWorkerFactory {
    async fn create(
        &self,
        _settings: &Settings,
        tunnel: &Tunnel,
    ) -> Result<Box<dyn Worker>, WorkerError> {
        let endpoint = tunnel.endpoint();
        if let Some(addr) = endpoint {
            self.probe(addr).await?;
        }
        Ok(Box::new(CommandWorker::new(self.cfg.clone(), endpoint)))
    }
}
