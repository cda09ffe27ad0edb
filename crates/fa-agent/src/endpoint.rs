//! Client endpoint
//!
//! Owns the relay and the two emulated agent sockets. The socket files live
//! exactly as long as the endpoint.

use std::path::Path;
use std::sync::Arc;

use fa_core::config::AgentConfig;
use fa_core::error::{FaError, RelayError};
use fa_core::relay::Relay;
use fa_core::socket::{self, SocketFileGuard};
use fa_core::tls::TrustMaterial;
use fa_protocol::ProtocolTag;

use crate::tunnel::TunnelDialer;

/// The running client endpoint
pub struct ClientEndpoint {
    relay: Relay,
    guards: Vec<SocketFileGuard>,
}

impl ClientEndpoint {
    /// Bind both agent sockets under the configured socket directory
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(config: &AgentConfig, trust: &TrustMaterial) -> Result<Self, FaError> {
        let socket_dir = config.socket_dir();
        let (host, port) = config.server_endpoint();

        let mut relay = Relay::new();
        let mut guards = Vec::with_capacity(ProtocolTag::ALL.len());

        for tag in ProtocolTag::ALL {
            let path = socket_dir.join(tag.socket_name());
            let (listener, guard) = socket::bind_unix(&path).map_err(|source| {
                FaError::Bind {
                    target: path.display().to_string(),
                    source,
                }
            })?;
            let dialer = TunnelDialer::new(host.clone(), port, tag, trust)?;

            relay
                .registry_mut()
                .add_unix_listener(tag.to_string(), listener, Arc::new(dialer));
            guards.push(guard);
        }

        tracing::info!("Forwarding agent sockets in {:?} to {}:{}", socket_dir, host, port);
        Ok(Self { relay, guards })
    }

    /// Paths of the emulated agent sockets
    pub fn socket_paths(&self) -> Vec<&Path> {
        self.guards.iter().map(|guard| guard.path()).collect()
    }

    /// Relay until a fatal error occurs
    pub async fn run(&mut self) -> Result<(), RelayError> {
        self.relay.run().await
    }
}
