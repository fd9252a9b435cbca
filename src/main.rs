//! shipvisor binary.
//!
//! ```text
//! shipvisor -c /etc/shipvisor.toml --worker-command "tail-shipper" [-d -P /run/shipvisor.pid]
//! ```
//!
//! Exit status: 0 after an interrupt (SIGINT/SIGTERM/SIGQUIT), 1 on any error.

mod cli;

use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use shipvisor::process::{self, PidFile};
use shipvisor::{
    CommandWorkerFactory, ConfigError, LogWriter, ProcessError, ShutdownSignals, SshTunnelFactory,
    Supervisor, SupervisorError,
};

use crate::cli::Cli;

#[derive(Error, Debug)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error("cannot start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl AppError {
    fn as_label(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.as_label(),
            AppError::Process(e) => e.as_label(),
            AppError::Supervisor(e) => e.as_label(),
            AppError::Runtime(_) => "runtime",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("shipvisor: cannot open log file: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, label = e.as_label(), "shipvisor stopped");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) -> std::io::Result<()> {
    let level = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let fmt = tracing_subscriber::fmt().with_env_filter(filter);

    match &cli.logfile {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            fmt.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => fmt.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), AppError> {
    let settings = cli.settings()?;
    let workers = CommandWorkerFactory::from_settings(&settings)?;
    let tunnels = SshTunnelFactory::from_settings(&settings)?;
    let supervisor = Supervisor::builder(settings, Arc::new(workers))
        .with_tunnels(Arc::new(tunnels))
        .with_subscribers(vec![Arc::new(LogWriter::new())])
        .build()?;

    let pid_path = cli.pid_file.as_ref().map(PidFile::resolve).transpose()?;
    if cli.daemonize {
        process::daemonize()?;
    }
    let _pid_file = pid_path.map(PidFile::create).transpose()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;

    runtime.block_on(async move {
        let shutdown = CancellationToken::new();
        let signals = ShutdownSignals::register().map_err(SupervisorError::Signals)?;
        let _listener = signals.cancel_on_signal(shutdown.clone());

        let cfg = supervisor.config();
        info!(
            max_failure = cfg.max_failure,
            respawn_delay = cfg.respawn_delay,
            transport = %cfg.transport,
            "supervising worker"
        );
        let done = supervisor.run(shutdown).await?;
        info!(
            cause = done.cause.as_str(),
            attempts = done.attempts,
            "supervisor stopped"
        );
        Ok::<(), AppError>(())
    })
}
