//! `forwagent server`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use fa_core::config::ServerConfig;
use fa_server::{ServerEndpoint, SystemAgents};

use super::{load_startup, shutdown_signal};
use crate::output::print_success;

/// Command-line values that take precedence over `[server]`
#[derive(Debug, Default)]
pub struct ServerOverrides {
    pub interface: Option<String>,
    pub port: Option<u16>,
}

impl ServerOverrides {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(interface) = self.interface {
            config.interface = interface;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
    }
}

/// Run the server endpoint until interrupted
pub async fn server_command(
    config_dir: &Path,
    config_path: Option<&PathBuf>,
    overrides: ServerOverrides,
) -> Result<()> {
    let startup = load_startup(config_dir, config_path)?;
    let mut config = startup.config.server;
    overrides.apply(&mut config);

    let agents = Arc::new(SystemAgents::from_config(&config));
    let (interface, port) = config.bind_endpoint();
    let mut endpoint = ServerEndpoint::bind(interface, port, &startup.trust, agents)
        .await
        .context("Failed to start server endpoint")?;

    print_success(&format!("Listening on {}", endpoint.local_addr()));

    tokio::select! {
        result = endpoint.run() => result.context("Relay stopped")?,
        _ = shutdown_signal() => {}
    }

    tracing::info!("Server stopped");
    Ok(())
}
