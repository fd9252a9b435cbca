//! # ssh port-forwarding tunnel.
//!
//! Runs `ssh -L` as a child process for the lifetime of the supervisor:
//!
//! ```text
//! ssh -n -N -o BatchMode=yes -i <ssh_key_file>
//!     -L <ssh_tunnel_port>:<ssh_remote_host>:<ssh_remote_port>
//!     [ssh_options...] <ssh_tunnel>
//! ```
//!
//! Workers then reach the transport at `127.0.0.1:<ssh_tunnel_port>`.
//!
//! ## Settings
//! | key                    | meaning                                       |
//! |------------------------|-----------------------------------------------|
//! | `ssh_key_file`         | identity file (`-i`)                          |
//! | `ssh_tunnel`           | `user@host` to connect to                     |
//! | `ssh_tunnel_port`      | local forwarded port                          |
//! | `ssh_remote_host`      | transport host as seen from `ssh_tunnel`      |
//! | `ssh_remote_port`      | transport port                                |
//! | `ssh_options`          | extra ssh arguments, space separated          |
//! | `ssh_binary`           | ssh executable (default `ssh`)                |
//! | `ssh_startup_grace_ms` | how long the child must survive at startup    |
//!
//! The five first keys go together: none set means no tunnel, a partial set is
//! reported with a warning and also means no tunnel.

use std::net::SocketAddr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::time;
use tracing::{debug, warn};

use super::{Tunnel, TunnelFactory, TunnelHandle};
use crate::config::Settings;
use crate::error::{ConfigError, TunnelError};

const REQUIRED: [&str; 5] = [
    "ssh_key_file",
    "ssh_tunnel",
    "ssh_tunnel_port",
    "ssh_remote_host",
    "ssh_remote_port",
];

const DEFAULT_GRACE: Duration = Duration::from_millis(1000);
const CLOSE_WAIT: Duration = Duration::from_secs(5);

/// Parsed ssh tunnel settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshTunnelConfig {
    /// ssh executable.
    pub binary: String,
    /// Identity file.
    pub key_file: String,
    /// `user@host` of the jump host.
    pub tunnel: String,
    /// Local forwarded port.
    pub local_port: u16,
    /// Transport host as seen from the jump host.
    pub remote_host: String,
    /// Transport port.
    pub remote_port: u16,
    /// Extra ssh arguments.
    pub options: Vec<String>,
    /// Minimum lifetime of the child before the tunnel counts as established.
    pub startup_grace: Duration,
}

impl SshTunnelConfig {
    /// Reads the tunnel settings.
    ///
    /// Returns `Ok(None)` when the tunnel is not (fully) configured.
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>, ConfigError> {
        let present = REQUIRED.iter().filter(|k| settings.contains(k)).count();
        if present == 0 {
            return Ok(None);
        }
        if present < REQUIRED.len() {
            let missing: Vec<&str> = REQUIRED
                .iter()
                .copied()
                .filter(|k| !settings.contains(k))
                .collect();
            warn!(?missing, "incomplete ssh tunnel settings, not using a tunnel");
            return Ok(None);
        }

        let text = |key: &str| settings.get(key).unwrap_or_default().to_string();
        let grace = settings
            .parse_u64("ssh_startup_grace_ms")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_GRACE);

        Ok(Some(Self {
            binary: settings.get("ssh_binary").unwrap_or("ssh").to_string(),
            key_file: text("ssh_key_file"),
            tunnel: text("ssh_tunnel"),
            local_port: parse_port(settings, "ssh_tunnel_port")?,
            remote_host: text("ssh_remote_host"),
            remote_port: parse_port(settings, "ssh_remote_port")?,
            options: settings
                .get("ssh_options")
                .map(|o| o.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            startup_grace: grace,
        }))
    }

    /// Local endpoint workers connect to.
    pub fn endpoint(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], self.local_port))
    }

    /// Arguments passed to the ssh executable.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-n".to_string(),
            "-N".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-i".to_string(),
            self.key_file.clone(),
            "-L".to_string(),
            format!(
                "{}:{}:{}",
                self.local_port, self.remote_host, self.remote_port
            ),
        ];
        args.extend(self.options.iter().cloned());
        args.push(self.tunnel.clone());
        args
    }

    /// Builds the ssh command.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.args());
        cmd
    }
}

fn parse_port(settings: &Settings, key: &str) -> Result<u16, ConfigError> {
    let value = settings.require_u64(key, 1)?;
    u16::try_from(value).map_err(|_| ConfigError::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Tunnel backed by a running ssh child process.
#[derive(Debug)]
pub struct SshTunnel {
    child: Child,
    endpoint: SocketAddr,
}

impl SshTunnel {
    /// Starts the configured ssh tunnel.
    pub async fn open(cfg: &SshTunnelConfig) -> Result<Self, TunnelError> {
        Self::start(cfg.command(), cfg.endpoint(), cfg.startup_grace).await
    }

    /// Spawns `command` and requires it to stay alive for `grace`.
    ///
    /// The child is killed if the tunnel is dropped without being closed.
    pub async fn start(
        mut command: Command,
        endpoint: SocketAddr,
        grace: Duration,
    ) -> Result<Self, TunnelError> {
        let program = command.as_std().get_program().to_string_lossy().into_owned();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|source| TunnelError::Spawn { program, source })?;
        debug!(pid = child.id(), %endpoint, "tunnel process spawned");

        time::sleep(grace).await;
        match child.try_wait() {
            Ok(None) => Ok(Self { child, endpoint }),
            Ok(Some(status)) => Err(TunnelError::Exited {
                grace,
                status: status.to_string(),
            }),
            Err(e) => Err(TunnelError::Exited {
                grace,
                status: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl TunnelHandle for SshTunnel {
    fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    async fn close(mut self: Box<Self>) {
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "tunnel process already gone");
        }
        match time::timeout(CLOSE_WAIT, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "tunnel process reaped"),
            Ok(Err(e)) => warn!(error = %e, "failed to reap tunnel process"),
            Err(_) => warn!(wait = ?CLOSE_WAIT, "tunnel process did not exit in time"),
        }
    }
}

/// Default tunnel factory: ssh when configured, otherwise none.
///
/// [`SshTunnelFactory::default`] reads the settings when the tunnel is created;
/// [`SshTunnelFactory::from_settings`] validates them up front and keeps the result.
#[derive(Debug, Default, Clone)]
pub struct SshTunnelFactory {
    validated: Option<Option<SshTunnelConfig>>,
}

impl SshTunnelFactory {
    /// Validates the tunnel settings now instead of at tunnel creation.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            validated: Some(SshTunnelConfig::from_settings(settings)?),
        })
    }
}

#[async_trait]
impl TunnelFactory for SshTunnelFactory {
    async fn create(&self, settings: &Settings) -> Result<Tunnel, TunnelError> {
        let cfg = match &self.validated {
            Some(cfg) => cfg.clone(),
            None => SshTunnelConfig::from_settings(settings)?,
        };
        match cfg {
            None => Ok(Tunnel::None),
            Some(cfg) => {
                let tunnel = SshTunnel::open(&cfg).await?;
                Ok(Tunnel::Active(Box::new(tunnel)))
            }
        }
    }
}
