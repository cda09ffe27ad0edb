//! fa-agent: Client endpoint for forwagent
//!
//! Runs on the machine where the tools that need the agents live. It binds
//! the two well-known agent socket paths and, for every local connection,
//! dials the server endpoint over mutual TLS, announces the protocol with a
//! 3-byte tag and hands both ends to the relay.

pub mod endpoint;
pub mod tunnel;

pub use endpoint::ClientEndpoint;
pub use tunnel::TunnelDialer;
