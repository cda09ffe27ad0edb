//! fa-core: Relay engine, mutual TLS and configuration for forwagent
//!
//! This crate provides the pieces shared by the agent (client) and server
//! endpoints: the single-threaded relay engine that owns every forwarded
//! connection, the pinned-peer TLS contexts, and configuration loading.

pub mod config;
pub mod error;
pub mod relay;
pub mod setup;
pub mod socket;
pub mod tls;

pub use error::{ConfigError, FaError, RelayError, TlsError};
pub use relay::{Acceptor, ConnId, Incoming, Registry, Relay};
pub use setup::{init, SetupResult};
pub use tls::{Fingerprint, TrustBundle, TrustMaterial};
