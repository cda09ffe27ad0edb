//! Core error types for forwagent

use fa_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for forwagent
///
/// Endpoint setup returns this; everything it can fail on converts into it.
#[derive(Error, Debug)]
pub enum FaError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// TLS context error
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// Relay error
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// A listening endpoint could not be bound
    #[error("Failed to bind {target}: {source}")]
    Bind {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors. All of these are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration directory does not exist
    #[error("Configuration directory missing: {0} (run 'forwagent init' to initialize)")]
    MissingDir(PathBuf),

    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// A bootstrap artifact could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Key file holds no private key
    #[error("No private key found in {0}")]
    NoPrivateKey(PathBuf),

    /// Certificate file holds no certificate
    #[error("No certificate found in {0}")]
    NoCertificate(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors building a TLS context from trust material
#[derive(Error, Debug)]
pub enum TlsError {
    /// rustls rejected the configuration (bad key, unsupported versions, ...)
    #[error("Invalid TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),

    /// Host could not be turned into a TLS server name
    #[error("Invalid server name: {0}")]
    ServerName(String),
}

/// A fault raised while handling one registered connection.
///
/// Everything except [`RelayError::Config`] is contained at the handler
/// boundary: the engine logs it, tears down the affected pair and keeps
/// running.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Read, write or connect failure on a forwarded connection
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// TLS handshake or peer certificate rejected
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    /// Short or unknown protocol tag
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Real local agent could not be found or reached
    #[error("Agent discovery failed: {0}")]
    Discovery(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Configuration fault discovered while running
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A handler panicked
    #[error("Handler panicked: {0}")]
    Panic(String),
}

impl RelayError {
    /// Whether this fault should stop the engine
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_faults_are_fatal() {
        let transport = RelayError::Transport(std::io::ErrorKind::BrokenPipe.into());
        let protocol = RelayError::Protocol(ProtocolError::UnknownTag(*b"XYZ"));
        let config = RelayError::Config(ConfigError::Invalid("bad".into()));

        assert!(!transport.is_fatal());
        assert!(!protocol.is_fatal());
        assert!(config.is_fatal());
    }

    #[test]
    fn test_component_errors_convert_to_fa_error() {
        let err: FaError = ConfigError::NoCertificate(PathBuf::from("cert.pem")).into();
        assert!(matches!(err, FaError::Config(ConfigError::NoCertificate(_))));
        assert!(err.to_string().contains("cert.pem"));

        let err: FaError = TlsError::ServerName("bad host".into()).into();
        assert!(matches!(err, FaError::Tls(_)));

        let err: FaError = RelayError::Panic("boom".into()).into();
        assert!(matches!(err, FaError::Relay(RelayError::Panic(_))));

        let err: FaError = ProtocolError::UnknownTag(*b"ABC").into();
        assert!(matches!(err, FaError::Protocol(_)));

        let err: FaError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(matches!(err, FaError::Io(_)));
    }

    #[test]
    fn test_missing_dir_mentions_init() {
        let err = ConfigError::MissingDir(PathBuf::from("/nowhere/.forwagent"));
        assert!(err.to_string().contains("forwagent init"));
    }
}
