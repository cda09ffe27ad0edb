//! Outbound tunnel dialer
//!
//! Every local connection gets its own tunnel: TCP connect, TLS handshake,
//! protocol tag, then the pair is handed to the relay.

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use fa_core::error::{RelayError, TlsError};
use fa_core::relay::{Acceptor, Incoming, Registry};
use fa_core::tls::{self, TrustMaterial};
use fa_protocol::{write_tag, ProtocolTag};

/// Accept handler for one emulated agent socket
pub struct TunnelDialer {
    host: String,
    port: u16,
    tag: ProtocolTag,
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl TunnelDialer {
    /// Create a dialer announcing `tag` to the server at `host:port`
    pub fn new(
        host: impl Into<String>,
        port: u16,
        tag: ProtocolTag,
        trust: &TrustMaterial,
    ) -> Result<Self, TlsError> {
        let host = host.into();
        let server_name = tls::server_name(&host)?;
        Ok(Self {
            connector: trust.connector()?,
            host,
            port,
            tag,
            server_name,
        })
    }

    /// Open one tunnel and announce the protocol
    pub async fn dial(&self) -> Result<TlsStream<TcpStream>, RelayError> {
        tracing::debug!("Dialing {}:{} for {}", self.host, self.port, self.tag);
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).await?;
        tcp.set_nodelay(true)?;

        let mut tunnel = self
            .connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(RelayError::Handshake)?;

        write_tag(&mut tunnel, self.tag).await?;
        Ok(tunnel)
    }
}

#[async_trait]
impl Acceptor for TunnelDialer {
    async fn accept(&self, incoming: Incoming, registry: &mut Registry) -> Result<(), RelayError> {
        let tunnel = self.dial().await?;
        let (local, remote) = registry.add_pair(incoming.into_boxed(), tunnel);
        tracing::info!(
            "Forwarding {} session {} -> {}:{} ({})",
            self.tag,
            local,
            self.host,
            self.port,
            remote
        );
        Ok(())
    }
}
