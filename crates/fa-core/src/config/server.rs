//! Server endpoint configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::DEFAULT_PORT;

/// Configuration for `forwagent server`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind the TLS listener to
    pub interface: String,

    /// Port to bind the TLS listener to
    pub port: u16,

    /// GnuPG home holding the real agent's sockets (`$GNUPGHOME` or `~/.gnupg`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gnupg_home: Option<PathBuf>,

    /// SSH agent socket (`$SSH_AUTH_SOCK` when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_auth_sock: Option<PathBuf>,

    /// Run `gpg-connect-agent /bye` before each discovery to start the agent
    pub ensure_agent: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            interface: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            gnupg_home: None,
            ssh_auth_sock: None,
            ensure_agent: true,
        }
    }
}

impl ServerConfig {
    /// Interface and port to bind, as a pair so IPv6 literals need no brackets
    pub fn bind_endpoint(&self) -> (&str, u16) {
        (self.interface.as_str(), self.port)
    }

    /// Resolved GnuPG home directory
    pub fn gnupg_home(&self) -> PathBuf {
        self.gnupg_home
            .clone()
            .unwrap_or_else(super::default_gnupg_dir)
    }

    /// Resolved SSH agent socket, if any is known
    pub fn ssh_auth_sock(&self) -> Option<PathBuf> {
        self.ssh_auth_sock.clone().or_else(|| {
            std::env::var_os("SSH_AUTH_SOCK")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        })
    }
}
