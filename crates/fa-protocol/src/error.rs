//! Protocol error types

use thiserror::Error;

/// Errors that can occur while exchanging the tunnel preamble
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Peer closed before sending a full tag
    #[error("Short protocol tag: got {got} of {expected} bytes")]
    ShortTag { got: usize, expected: usize },

    /// Tag bytes did not match any known protocol
    #[error("Unknown protocol tag: {0:?}")]
    UnknownTag([u8; 3]),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
