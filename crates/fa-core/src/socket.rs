//! Unix socket file lifecycle
//!
//! The agent endpoint publishes its sockets under fixed names. A file left
//! behind by a crashed run would make `bind` fail, so it is removed first,
//! and the guard removes it again when the endpoint shuts down.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tokio::net::UnixListener;

/// Remove a socket file
///
/// Returns `Ok(())` even if the file doesn't exist.
pub fn remove_socket_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Guard that removes a socket file when dropped
pub struct SocketFileGuard {
    path: PathBuf,
}

impl SocketFileGuard {
    /// Path of the guarded socket
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketFileGuard {
    fn drop(&mut self) {
        if let Err(e) = remove_socket_file(&self.path) {
            tracing::warn!("Failed to remove socket {:?}: {}", self.path, e);
        } else {
            tracing::debug!("Removed socket {:?}", self.path);
        }
    }
}

/// Bind a Unix listener at `path`, replacing any stale file
///
/// Must be called from within a tokio runtime.
pub fn bind_unix(path: &Path) -> io::Result<(UnixListener, SocketFileGuard)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    remove_socket_file(path)?;

    let listener = UnixListener::bind(path)?;
    tracing::info!("Listening on {:?}", path);

    Ok((
        listener,
        SocketFileGuard {
            path: path.to_path_buf(),
        },
    ))
}
