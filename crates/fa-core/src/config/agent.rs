//! Agent (client endpoint) configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::DEFAULT_PORT;

/// Configuration for `forwagent agent`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Server host to dial for every tunnel
    pub interface: String,

    /// Server port to dial for every tunnel
    pub port: u16,

    /// Directory the emulated agent sockets are created in.
    ///
    /// Defaults to the GnuPG home so unmodified tools find them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            interface: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            socket_dir: None,
        }
    }
}

impl AgentConfig {
    /// Directory for the local listening sockets
    pub fn socket_dir(&self) -> PathBuf {
        self.socket_dir
            .clone()
            .unwrap_or_else(super::default_gnupg_dir)
    }

    /// `(host, port)` of the server endpoint
    pub fn server_endpoint(&self) -> (String, u16) {
        (self.interface.clone(), self.port)
    }
}
