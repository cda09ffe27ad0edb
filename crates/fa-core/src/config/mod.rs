//! Configuration management for forwagent

mod agent;
mod server;

pub use agent::AgentConfig;
pub use server::ServerConfig;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the private key inside the configuration directory
pub const KEY_FILE: &str = "key.pem";
/// File name of the own certificate inside the configuration directory
pub const CERT_FILE: &str = "cert.pem";
/// File name of the trust bundle inside the configuration directory
pub const TRUSTED_FILE: &str = "trusted.pem";

/// Optional settings file inside the configuration directory
pub const CONFIG_FILE: &str = "config.toml";

/// Default port shared by both roles
pub const DEFAULT_PORT: u16 = 4711;

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".forwagent")
}

/// Get the GnuPG home directory (`$GNUPGHOME`, else `~/.gnupg`)
pub fn default_gnupg_dir() -> PathBuf {
    std::env::var_os("GNUPGHOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".gnupg")
        })
}

/// Fail with [`ConfigError::MissingDir`] unless `dir` is an existing directory
pub fn ensure_config_dir(dir: &Path) -> Result<(), ConfigError> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(ConfigError::MissingDir(dir.to_path_buf()))
    }
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Settings for `forwagent agent`
    pub agent: AgentConfig,
    /// Settings for `forwagent server`
    pub server: ServerConfig,
}

impl ConfigFile {
    /// Load `path` if it exists, otherwise fall back to defaults.
    ///
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match load_config(path) {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) => {
                tracing::debug!("No config at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }
}

/// Paths of the three bootstrap artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPaths {
    /// PEM private key
    pub key: PathBuf,
    /// PEM certificate presented to peers
    pub cert: PathBuf,
    /// PEM bundle of pinned peer certificates
    pub trusted: PathBuf,
}

impl TrustPaths {
    /// Standard artifact locations inside a configuration directory
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            key: dir.join(KEY_FILE),
            cert: dir.join(CERT_FILE),
            trusted: dir.join(TRUSTED_FILE),
        }
    }
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigFile::load_or_default(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.agent.port, DEFAULT_PORT);
        assert_eq!(config.server.interface, "127.0.0.1");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 9000\n").unwrap();

        let config = ConfigFile::load_or_default(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.interface, "127.0.0.1");
        assert_eq!(config.agent.port, DEFAULT_PORT);
        assert!(config.server.ensure_agent);
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();

        assert!(matches!(
            ConfigFile::load_or_default(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ConfigFile::default();
        config.agent.interface = "10.0.0.2".to_string();
        config.agent.socket_dir = Some(PathBuf::from("/run/user/1000/gnupg"));
        save_config(&path, &config).unwrap();

        let loaded: ConfigFile = load_config(&path).unwrap();
        assert_eq!(loaded.agent.interface, "10.0.0.2");
        assert_eq!(
            loaded.agent.socket_dir,
            Some(PathBuf::from("/run/user/1000/gnupg"))
        );
    }

    #[test]
    fn test_ensure_config_dir() {
        let dir = TempDir::new().unwrap();
        assert!(ensure_config_dir(dir.path()).is_ok());
        assert!(matches!(
            ensure_config_dir(&dir.path().join("missing")),
            Err(ConfigError::MissingDir(_))
        ));
    }

    #[test]
    fn test_trust_paths() {
        let paths = TrustPaths::in_dir(Path::new("/home/u/.forwagent"));
        assert_eq!(paths.key, PathBuf::from("/home/u/.forwagent/key.pem"));
        assert_eq!(paths.cert, PathBuf::from("/home/u/.forwagent/cert.pem"));
        assert_eq!(paths.trusted, PathBuf::from("/home/u/.forwagent/trusted.pem"));
    }
}
