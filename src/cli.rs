//! Command line definition.
//!
//! Every supervisor-related flag is an override on top of the config file:
//! values stay strings here and are parsed (and rejected) by the library.

use std::path::PathBuf;

use clap::Parser;
use shipvisor::{ConfigError, MAX_FAILURE, RESPAWN_DELAY, Settings, TRANSPORT};

#[derive(Parser, Debug)]
#[command(name = "shipvisor")]
#[command(about = "Keeps a log-shipping worker alive, respawning it with backoff on transport failures")]
#[command(version)]
pub struct Cli {
    /// TOML config file
    #[arg(short = 'c', long, env = "SHIPVISOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cap on counted consecutive transport failures
    #[arg(long, value_name = "N")]
    pub max_failure: Option<String>,

    /// Base of the respawn delay in seconds (delay = base ^ failures)
    #[arg(long, value_name = "SECONDS")]
    pub respawn_delay: Option<String>,

    /// Transport the worker ships to (redis, zmq, rabbitmq, udp, stdout, ...)
    #[arg(short = 't', long)]
    pub transport: Option<String>,

    /// Shell command running the shipping engine
    #[arg(long)]
    pub worker_command: Option<String>,

    /// Any other setting, as key=value (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    pub logfile: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(long)]
    pub debug: bool,

    /// Detach from the terminal before supervising
    #[arg(short = 'd', long)]
    pub daemonize: bool,

    /// Write the supervisor pid to this file
    #[arg(short = 'P', long)]
    pub pid_file: Option<PathBuf>,
}

impl Cli {
    /// Builds the settings snapshot: defaults, then config file, then flags.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let mut settings = Settings::with_defaults();
        if let Some(path) = &self.config {
            settings.load_file(path)?;
        }

        let flags = [
            (MAX_FAILURE, &self.max_failure),
            (RESPAWN_DELAY, &self.respawn_delay),
            (TRANSPORT, &self.transport),
            ("worker_command", &self.worker_command),
        ];
        for (key, value) in flags {
            if let Some(value) = value {
                settings.set(key, value.as_str());
            }
        }
        for raw in &self.overrides {
            settings.apply_override(raw)?;
        }
        Ok(settings)
    }
}
