//! Locating the real local agents
//!
//! Discovery runs once per tunnel, after the tag has been read, so an agent
//! that was restarted in the meantime is picked up by the next tunnel.

mod gpg;
mod ssh;

pub use gpg::{connect_gpg_agent, Bootstrap};
pub use ssh::connect_ssh_agent;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use fa_core::config::ServerConfig;
use fa_core::error::RelayError;
use fa_core::relay::BoxedDuplex;

/// Real agent could not be found or reached
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// None of the candidate SSH agent sockets accepted a connection
    #[error("No SSH agent reachable (tried {tried:?})")]
    NoSshAgent { tried: Vec<PathBuf> },

    /// GPG agent socket or bootstrap file could not be read
    #[error("Failed to read GPG agent bootstrap {path}: {source}")]
    Bootstrap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Bootstrap file does not hold `<port>\n<nonce>`
    #[error("Malformed GPG agent bootstrap {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// The agent endpoint refused the connection or the nonce
    #[error("Failed to connect to agent at {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<DiscoveryError> for RelayError {
    fn from(err: DiscoveryError) -> Self {
        RelayError::Discovery(Box::new(err))
    }
}

/// Finds the local agent for each protocol
#[async_trait]
pub trait AgentLocator: Send + Sync {
    /// Channel to the SSH agent
    async fn ssh_agent(&self) -> Result<BoxedDuplex, DiscoveryError>;

    /// Channel to the GPG agent, already past its nonce handshake
    async fn gpg_agent(&self) -> Result<BoxedDuplex, DiscoveryError>;
}

/// Agents of the current user on this machine
#[derive(Debug, Clone)]
pub struct SystemAgents {
    gnupg_home: PathBuf,
    ssh_auth_sock: Option<PathBuf>,
    ensure_agent: bool,
}

impl SystemAgents {
    pub fn new(gnupg_home: PathBuf, ssh_auth_sock: Option<PathBuf>, ensure_agent: bool) -> Self {
        Self {
            gnupg_home,
            ssh_auth_sock,
            ensure_agent,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.gnupg_home(),
            config.ssh_auth_sock(),
            config.ensure_agent,
        )
    }

    /// Ask gpg-agent to start if it is not running yet. Failures are ignored.
    async fn ensure_running(&self) {
        if !self.ensure_agent {
            return;
        }

        let status = tokio::process::Command::new("gpg-connect-agent")
            .arg("/bye")
            .env("GNUPGHOME", &self.gnupg_home)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::debug!("gpg-connect-agent exited with {}", status),
            Err(e) => tracing::debug!("Could not run gpg-connect-agent: {}", e),
        }
    }
}

#[async_trait]
impl AgentLocator for SystemAgents {
    async fn ssh_agent(&self) -> Result<BoxedDuplex, DiscoveryError> {
        self.ensure_running().await;
        let stream = connect_ssh_agent(self.ssh_auth_sock.as_deref(), &self.gnupg_home).await?;
        Ok(Box::new(stream))
    }

    async fn gpg_agent(&self) -> Result<BoxedDuplex, DiscoveryError> {
        self.ensure_running().await;
        connect_gpg_agent(&self.gnupg_home).await
    }
}
