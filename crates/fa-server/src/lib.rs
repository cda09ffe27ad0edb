//! fa-server: Server endpoint for forwagent
//!
//! Runs on the machine holding the real agents. Accepts mutually
//! authenticated tunnels, reads the protocol tag and connects each tunnel to
//! the matching local agent.

pub mod discovery;
pub mod server;

pub use discovery::{AgentLocator, DiscoveryError, SystemAgents};
pub use server::{ServerEndpoint, TunnelAcceptor};
