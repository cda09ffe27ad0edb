//! GPG agent discovery
//!
//! `S.gpg-agent` is either the agent's Unix socket or, for agents that
//! emulate sockets over TCP, a small bootstrap file: the decimal port on the
//! first line followed by a nonce that must be sent before anything else.

use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UnixStream};

use fa_core::relay::BoxedDuplex;

use super::DiscoveryError;

/// Contents of a GPG agent bootstrap file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bootstrap {
    pub port: u16,
    pub nonce: Vec<u8>,
}

impl Bootstrap {
    /// Parse `<port>\n<nonce>`
    pub fn parse(data: &[u8]) -> Result<Self, String> {
        let newline = data
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| "missing newline after port".to_string())?;

        let port = std::str::from_utf8(&data[..newline])
            .map_err(|_| "port is not text".to_string())?
            .trim()
            .parse::<u16>()
            .map_err(|e| format!("invalid port: {e}"))?;

        Ok(Self {
            port,
            nonce: data[newline + 1..].to_vec(),
        })
    }
}

/// Connect to the GPG agent in `gnupg_home`
pub async fn connect_gpg_agent(gnupg_home: &Path) -> Result<BoxedDuplex, DiscoveryError> {
    let path = gnupg_home.join("S.gpg-agent");
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|source| DiscoveryError::Bootstrap {
            path: path.clone(),
            source,
        })?;

    if metadata.file_type().is_socket() {
        let stream = UnixStream::connect(&path)
            .await
            .map_err(|source| DiscoveryError::Connect {
                target: path.display().to_string(),
                source,
            })?;
        tracing::debug!("Using GPG agent socket {:?}", path);
        return Ok(Box::new(stream));
    }

    let data = tokio::fs::read(&path)
        .await
        .map_err(|source| DiscoveryError::Bootstrap {
            path: path.clone(),
            source,
        })?;
    let bootstrap = Bootstrap::parse(&data).map_err(|reason| DiscoveryError::Malformed {
        path: path.clone(),
        reason,
    })?;

    let target = format!("127.0.0.1:{}", bootstrap.port);
    let connect_err = |source| DiscoveryError::Connect {
        target: target.clone(),
        source,
    };
    let mut stream = TcpStream::connect(("127.0.0.1", bootstrap.port))
        .await
        .map_err(connect_err)?;
    stream.write_all(&bootstrap.nonce).await.map_err(connect_err)?;
    stream.flush().await.map_err(connect_err)?;

    tracing::debug!("Connected to GPG agent at {} via {:?}", target, path);
    Ok(Box::new(stream))
}
