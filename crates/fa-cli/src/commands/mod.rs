//! CLI command implementations

mod agent;
mod fingerprint;
mod init;
mod server;

pub use agent::{agent_command, AgentOverrides};
pub use fingerprint::fingerprint_command;
pub use init::init_command;
pub use server::{server_command, ServerOverrides};

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use fa_core::config::{self, ConfigFile, TrustPaths};
use fa_core::tls::TrustMaterial;

/// Everything an endpoint needs before it can bind
pub(crate) struct Startup {
    pub config: ConfigFile,
    pub trust: TrustMaterial,
}

/// Load configuration and trust material, failing before any socket exists
pub(crate) fn load_startup(config_dir: &Path, config_path: Option<&PathBuf>) -> Result<Startup> {
    config::ensure_config_dir(config_dir)?;

    let path = config_path
        .cloned()
        .unwrap_or_else(|| config_dir.join(config::CONFIG_FILE));
    let config = ConfigFile::load_or_default(&path)
        .with_context(|| format!("Failed to load configuration from {:?}", path))?;

    let trust = TrustMaterial::load(&TrustPaths::in_dir(config_dir))
        .with_context(|| "Failed to load TLS key material (run 'forwagent init')")?;

    Ok(Startup { config, trust })
}

/// Resolve once Ctrl+C or SIGTERM arrives
pub async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}
