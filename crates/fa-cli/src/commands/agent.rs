//! `forwagent agent`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use fa_agent::ClientEndpoint;
use fa_core::config::AgentConfig;

use super::{load_startup, shutdown_signal};
use crate::output::print_success;

/// Command-line values that take precedence over `[agent]`
#[derive(Debug, Default)]
pub struct AgentOverrides {
    pub interface: Option<String>,
    pub port: Option<u16>,
    pub socket_dir: Option<PathBuf>,
}

impl AgentOverrides {
    fn apply(self, config: &mut AgentConfig) {
        if let Some(interface) = self.interface {
            config.interface = interface;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(socket_dir) = self.socket_dir {
            config.socket_dir = Some(socket_dir);
        }
    }
}

/// Run the client endpoint until interrupted
pub async fn agent_command(
    config_dir: &Path,
    config_path: Option<&PathBuf>,
    overrides: AgentOverrides,
) -> Result<()> {
    let startup = load_startup(config_dir, config_path)?;
    let mut config = startup.config.agent;
    overrides.apply(&mut config);

    let mut endpoint = ClientEndpoint::bind(&config, &startup.trust)
        .context("Failed to start client endpoint")?;

    for path in endpoint.socket_paths() {
        print_success(&format!("Listening on {}", path.display()));
    }

    tokio::select! {
        result = endpoint.run() => result.context("Relay stopped")?,
        _ = shutdown_signal() => {}
    }

    tracing::info!("Agent stopped");
    Ok(())
}
