//! SSH agent discovery

use std::path::Path;

use tokio::net::UnixStream;

use super::DiscoveryError;

/// Connect to the SSH agent
///
/// Tries `ssh_auth_sock` first, then gpg-agent's SSH socket in `gnupg_home`.
pub async fn connect_ssh_agent(
    ssh_auth_sock: Option<&Path>,
    gnupg_home: &Path,
) -> Result<UnixStream, DiscoveryError> {
    let mut tried = Vec::new();
    let candidates = ssh_auth_sock
        .map(Path::to_path_buf)
        .into_iter()
        .chain(std::iter::once(gnupg_home.join("S.gpg-agent.ssh")));

    for path in candidates {
        match UnixStream::connect(&path).await {
            Ok(stream) => {
                tracing::debug!("Using SSH agent at {:?}", path);
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!("SSH agent not reachable at {:?}: {}", path, e);
                tried.push(path);
            }
        }
    }

    Err(DiscoveryError::NoSshAgent { tried })
}
