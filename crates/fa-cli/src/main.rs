//! forwagent CLI
//!
//! Single binary for both ends of agent forwarding:
//! - Agent (emulates the local agent sockets, dials the server)
//! - Server (accepts tunnels, talks to the real agents)
//! - Key management (init, fingerprint)

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fa_core::config;
use forwagent::commands::{self, AgentOverrides, ServerOverrides};

#[derive(Parser)]
#[command(name = "forwagent")]
#[command(author, version, about = "Forward SSH and GPG agents over mutual TLS")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the configuration directory, key and certificate
    Init,

    /// Emulate the local agent sockets and forward them to a server
    Agent {
        /// Server host to connect to
        #[arg(short, long)]
        interface: Option<String>,
        /// Server port to connect to (default: 4711)
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory to create S.gpg-agent and S.gpg-agent.ssh in
        #[arg(short, long)]
        socket_dir: Option<PathBuf>,
    },

    /// Accept tunnels and relay them to the real local agents
    Server {
        /// Interface to listen on
        #[arg(short, long)]
        interface: Option<String>,
        /// Port to listen on (default: 4711)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the fingerprint of the local certificate
    Fingerprint,
}

fn init_logging(verbose: u8, log_file: Option<&PathBuf>) -> Result<()> {
    let log_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
    );

    let (file_layer, stderr_layer) = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), None)
        }
        None => {
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr);
            (None, Some(layer))
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_ref())?;

    let config_dir = config::default_config_dir();
    let config_path = cli.config.as_ref();

    let command = match cli.command {
        Some(cmd) => cmd,
        None => {
            Cli::command().print_help()?;
            return Ok(());
        }
    };

    match command {
        Commands::Init => commands::init_command(&config_dir),
        Commands::Fingerprint => commands::fingerprint_command(&config_dir),
        Commands::Agent {
            interface,
            port,
            socket_dir,
        } => {
            let overrides = AgentOverrides {
                interface,
                port,
                socket_dir,
            };
            commands::agent_command(&config_dir, config_path, overrides).await
        }
        Commands::Server { interface, port } => {
            let overrides = ServerOverrides { interface, port };
            commands::server_command(&config_dir, config_path, overrides).await
        }
    }
}
