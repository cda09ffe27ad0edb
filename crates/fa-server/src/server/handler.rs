//! Tunnel accept handler
//!
//! Completes the TLS handshake, reads the protocol tag and wires the tunnel
//! to the matching agent. Nothing is registered unless every step succeeds.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_rustls::TlsAcceptor;

use fa_core::error::RelayError;
use fa_core::relay::{Acceptor, Incoming, Registry};
use fa_protocol::{read_tag, ProtocolTag};

use crate::discovery::AgentLocator;

/// Accept handler for the TLS listener
pub struct TunnelAcceptor {
    tls: TlsAcceptor,
    agents: Arc<dyn AgentLocator>,
}

impl TunnelAcceptor {
    pub fn new(tls: TlsAcceptor, agents: Arc<dyn AgentLocator>) -> Self {
        Self { tls, agents }
    }
}

#[async_trait]
impl Acceptor for TunnelAcceptor {
    async fn accept(&self, incoming: Incoming, registry: &mut Registry) -> Result<(), RelayError> {
        let Incoming::Tcp(tcp) = incoming else {
            return Err(RelayError::Transport(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "tunnels are only accepted over TCP",
            )));
        };
        let peer = tcp.peer_addr()?;
        tcp.set_nodelay(true)?;

        let mut tunnel = self
            .tls
            .accept(tcp)
            .await
            .map_err(RelayError::Handshake)?;

        let tag = match read_tag(&mut tunnel).await {
            Ok(tag) => tag,
            Err(e) => {
                tracing::warn!("Dropping tunnel from {}: {}", peer, e);
                return Err(e.into());
            }
        };
        tracing::info!("Accepted {} tunnel from {}", tag, peer);

        match tag {
            ProtocolTag::Ssh => {
                let agent = self.agents.ssh_agent().await?;
                let id = registry.add_request_reply(tunnel, agent);
                tracing::debug!("SSH tunnel {} relaying to agent", id);
            }
            ProtocolTag::Gpg => {
                let agent = self.agents.gpg_agent().await?;
                let (tunnel_id, agent_id) = registry.add_pair(tunnel, agent);
                tracing::debug!("GPG tunnel {} paired with agent {}", tunnel_id, agent_id);
            }
        }
        Ok(())
    }
}
