//! # Cross-platform OS signal handling.
//!
//! Turns termination signals into cancellation of the supervisor's shutdown token.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//! - `SIGQUIT` (quit signal, often used for core dumps or hard stop)
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::windows::ctrl_c`]
//!
//! Handlers are registered eagerly by [`ShutdownSignals::register`], so a
//! registration failure surfaces at startup instead of at the first signal.
//! If the signal streams close, the listener stops without cancelling.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Registered termination signal listeners.
pub struct ShutdownSignals {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigquit: tokio::signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl ShutdownSignals {
    /// Installs the signal listeners. Must be called inside a tokio runtime.
    #[cfg(unix)]
    pub fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
            sigquit: signal(SignalKind::quit())?,
        })
    }

    /// Installs the signal listeners. Must be called inside a tokio runtime.
    #[cfg(windows)]
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    /// Waits for the next termination signal and returns its name.
    ///
    /// Returns `None` once no further signal can be delivered.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> Option<&'static str> {
        tokio::select! {
            Some(()) = self.sigint.recv()  => Some("SIGINT"),
            Some(()) = self.sigterm.recv() => Some("SIGTERM"),
            Some(()) = self.sigquit.recv() => Some("SIGQUIT"),
            else => None,
        }
    }

    /// Waits for the next termination signal and returns its name.
    ///
    /// Returns `None` once no further signal can be delivered.
    #[cfg(windows)]
    pub async fn recv(&mut self) -> Option<&'static str> {
        self.ctrl_c.recv().await.map(|()| "Ctrl-C")
    }

    /// Cancels `token` on the first signal.
    ///
    /// The listener keeps running so later signals are logged instead of
    /// killing the process mid-teardown.
    pub fn cancel_on_signal(mut self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let Some(first) = self.recv().await else {
                warn!("signal streams closed, interrupts will not be delivered");
                return;
            };
            info!(signal = first, "interrupt received");
            token.cancel();
            while let Some(again) = self.recv().await {
                info!(signal = again, "shutdown already in progress");
            }
        })
    }
}
