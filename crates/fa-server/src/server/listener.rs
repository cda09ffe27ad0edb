//! Server endpoint listener

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use fa_core::error::{FaError, RelayError};
use fa_core::relay::Relay;
use fa_core::tls::TrustMaterial;

use super::handler::TunnelAcceptor;
use crate::discovery::AgentLocator;

/// The running server endpoint
pub struct ServerEndpoint {
    relay: Relay,
    local_addr: SocketAddr,
}

impl ServerEndpoint {
    /// Bind the TLS listener on `interface` and `port`
    ///
    /// `interface` may be a hostname, an IPv4 or a bare IPv6 address.
    pub async fn bind(
        interface: &str,
        port: u16,
        trust: &TrustMaterial,
        agents: Arc<dyn AgentLocator>,
    ) -> Result<Self, FaError> {
        let bind_err = |source| FaError::Bind {
            target: format!("{}:{}", interface, port),
            source,
        };
        let listener = TcpListener::bind((interface, port))
            .await
            .map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let acceptor = TunnelAcceptor::new(trust.acceptor()?, agents);
        let mut relay = Relay::new();
        relay
            .registry_mut()
            .add_tcp_listener(local_addr.to_string(), listener, Arc::new(acceptor));

        tracing::info!("Server listening on {}", local_addr);
        Ok(Self { relay, local_addr })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Relay until a fatal error occurs
    pub async fn run(&mut self) -> Result<(), RelayError> {
        self.relay.run().await
    }
}
