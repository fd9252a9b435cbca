//! Error types used by the shipvisor runtime, its tunnel and its workers.
//!
//! - [`ConfigError`]: invalid or missing settings; fatal before supervision starts.
//! - [`TunnelError`]: the ssh tunnel could not be established; fatal.
//! - [`TransportError`]: the transport connection failed; the only recoverable kind.
//! - [`WorkerError`]: what a worker (or its factory) reports: transport or fatal.
//! - [`SupervisorError`]: what makes [`Supervisor::run`](crate::Supervisor::run) give up.
//!
//! Every enum provides `as_label` for stable snake_case labels in logs.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced while building a configuration snapshot.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Setting value is not an integer.
    #[error("setting `{key}` must be an integer, got {value:?}")]
    InvalidNumber {
        /// Setting name.
        key: String,
        /// Raw value as read.
        value: String,
    },

    /// Setting value is an integer but outside the accepted range.
    #[error("setting `{key}` must be at least {min}, got {value}")]
    OutOfRange {
        /// Setting name.
        key: String,
        /// Parsed value.
        value: u64,
        /// Smallest accepted value.
        min: u64,
    },

    /// Required setting is absent.
    #[error("setting `{key}` is required")]
    Missing {
        /// Setting name.
        key: String,
    },

    /// Override given on the command line is not `key=value`.
    #[error("malformed override {raw:?}, expected key=value")]
    MalformedOverride {
        /// Raw override text.
        raw: String,
    },

    /// Config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML (or not a table of scalars).
    #[error("cannot parse config file {path}: {reason}")]
    Parse {
        /// Path of the file.
        path: String,
        /// Parser message.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use shipvisor::ConfigError;
    ///
    /// let err = ConfigError::Missing { key: "worker_command".into() };
    /// assert_eq!(err.as_label(), "config_missing");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::InvalidNumber { .. } => "config_invalid_number",
            ConfigError::OutOfRange { .. } => "config_out_of_range",
            ConfigError::Missing { .. } => "config_missing",
            ConfigError::MalformedOverride { .. } => "config_malformed_override",
            ConfigError::Read { .. } => "config_read",
            ConfigError::Parse { .. } => "config_parse",
        }
    }
}

/// # Errors produced while establishing the ssh tunnel.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TunnelError {
    /// Tunnel settings are present but invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The tunnel process could not be started.
    #[error("failed to spawn tunnel process `{program}`: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The tunnel process exited during its startup grace period.
    #[error("tunnel process exited within {grace:?}: {status}")]
    Exited {
        /// Startup grace that was not survived.
        grace: Duration,
        /// Exit status description.
        status: String,
    },
}

impl TunnelError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            TunnelError::Config(_) => "tunnel_config",
            TunnelError::Spawn { .. } => "tunnel_spawn",
            TunnelError::Exited { .. } => "tunnel_exited",
        }
    }
}

/// # Transport failure.
///
/// The connection to the shipping backend could not be made or was lost.
/// Always recoverable: the supervisor respawns the worker after a backoff.
#[derive(Error, Debug, Clone)]
#[error("transport {transport} unavailable: {reason}")]
pub struct TransportError {
    /// Transport name (`redis`, `zmq`, `stdout`, ...).
    pub transport: String,
    /// Human-readable cause.
    pub reason: String,
}

impl TransportError {
    /// Creates a transport error for the named transport.
    pub fn new(transport: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            transport: transport.into(),
            reason: reason.into(),
        }
    }
}

/// # Errors reported by a worker or a worker factory.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Transport connection failed; the supervisor retries with backoff.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Non-recoverable failure; never retried.
    #[error("fatal worker error: {reason}")]
    Fatal {
        /// The underlying error message.
        reason: String,
    },
}

impl WorkerError {
    /// Shorthand for [`WorkerError::Fatal`].
    pub fn fatal(reason: impl Into<String>) -> Self {
        WorkerError::Fatal {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Transport(_) => "worker_transport",
            WorkerError::Fatal { .. } => "worker_fatal",
        }
    }

    /// Indicates whether the supervisor retries after this error.
    ///
    /// # Example
    /// ```
    /// use shipvisor::{TransportError, WorkerError};
    ///
    /// let lost = WorkerError::from(TransportError::new("redis", "connection refused"));
    /// assert!(lost.is_retryable());
    ///
    /// let fatal = WorkerError::fatal("bad file glob");
    /// assert!(!fatal.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkerError::Transport(_))
    }
}

/// # Errors of the process wrapper (pid file, daemonization).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The pid file names a process that is still alive.
    #[error("already running as pid {pid} (pid file {path})")]
    AlreadyRunning {
        /// Live pid found in the file.
        pid: i32,
        /// Path of the pid file.
        path: String,
    },

    /// The pid file could not be read or written.
    #[error("pid file {path}: {source}")]
    PidFile {
        /// Path of the pid file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Detaching from the terminal failed or is unsupported.
    #[error("cannot daemonize: {reason}")]
    Daemonize {
        /// Failure description.
        reason: String,
    },
}

impl ProcessError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessError::AlreadyRunning { .. } => "process_already_running",
            ProcessError::PidFile { .. } => "process_pid_file",
            ProcessError::Daemonize { .. } => "process_daemonize",
        }
    }
}

/// # Errors that end supervision.
///
/// User interruption is **not** an error; it is reported as
/// [`Shutdown`](crate::Shutdown) instead.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Configuration was rejected before the loop started.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Tunnel could not be established; no worker was started.
    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    /// Worker failed fatally.
    #[error(transparent)]
    Worker(WorkerError),

    /// OS signal handlers could not be installed.
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::Config(e) => e.as_label(),
            SupervisorError::Tunnel(e) => e.as_label(),
            SupervisorError::Worker(e) => e.as_label(),
            SupervisorError::Signals(_) => "signals",
        }
    }
}
