//! # Optional secure tunnel in front of the transport.
//!
//! The supervisor asks a [`TunnelFactory`] for a [`Tunnel`] exactly once, before
//! the first worker is created. The result is a sum type:
//!
//! ```text
//! Tunnel::None              no tunnel configured; workers talk to the transport directly
//! Tunnel::Active(handle)    workers reach the transport through handle.endpoint()
//! ```
//!
//! ## Rules
//! - Absence of tunnel settings yields `Tunnel::None`, never an error
//! - Workers only **read** the tunnel (its endpoint); they never close it
//! - [`Tunnel::close`] consumes the tunnel, so it can be closed at most once
//! - The supervisor closes it on every exit path once it was created

mod ssh;

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::{config::Settings, error::TunnelError};

pub use ssh::{SshTunnel, SshTunnelConfig, SshTunnelFactory};

/// An established tunnel connection.
#[async_trait]
pub trait TunnelHandle: Send + Sync + 'static {
    /// Local address workers connect to instead of the transport.
    fn endpoint(&self) -> SocketAddr;

    /// Tears the tunnel down. Best effort: never fails, never panics.
    async fn close(self: Box<Self>);
}

/// Optional tunnel owned by the supervisor.
pub enum Tunnel {
    /// No tunnel configured.
    None,
    /// Established tunnel.
    Active(Box<dyn TunnelHandle>),
}

impl Tunnel {
    /// Returns `true` for [`Tunnel::Active`].
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, Tunnel::Active(_))
    }

    /// Local endpoint of an active tunnel.
    pub fn endpoint(&self) -> Option<SocketAddr> {
        match self {
            Tunnel::None => None,
            Tunnel::Active(handle) => Some(handle.endpoint()),
        }
    }

    /// Closes the tunnel if active. Returns `true` if a close was issued.
    pub async fn close(self) -> bool {
        match self {
            Tunnel::None => false,
            Tunnel::Active(handle) => {
                handle.close().await;
                true
            }
        }
    }
}

impl std::fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tunnel::None => f.write_str("Tunnel::None"),
            Tunnel::Active(handle) => write!(f, "Tunnel::Active({})", handle.endpoint()),
        }
    }
}

/// Decides whether a tunnel is needed and establishes it.
#[async_trait]
pub trait TunnelFactory: Send + Sync + 'static {
    /// Returns [`Tunnel::None`] when the settings ask for no tunnel.
    async fn create(&self, settings: &Settings) -> Result<Tunnel, TunnelError>;
}

/// Factory that never creates a tunnel.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTunnel;

#[async_trait]
impl TunnelFactory for NoTunnel {
    async fn create(&self, _settings: &Settings) -> Result<Tunnel, TunnelError> {
        Ok(Tunnel::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TunnelHandle for Counting {
        fn endpoint(&self) -> SocketAddr {
            SocketAddr::from(([127, 0, 0, 1], 6379))
        }
        async fn close(self: Box<Self>) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn closing_none_is_a_no_op() {
        let tunnel = NoTunnel.create(&Settings::new()).await.unwrap();
        assert!(!tunnel.is_active());
        assert_eq!(tunnel.endpoint(), None);
        assert!(!tunnel.close().await);
    }

    #[tokio::test]
    async fn closing_active_closes_handle_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let tunnel = Tunnel::Active(Box::new(Counting {
            closes: closes.clone(),
        }));
        assert!(tunnel.is_active());
        assert_eq!(tunnel.endpoint().map(|a| a.port()), Some(6379));
        assert!(tunnel.close().await);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
