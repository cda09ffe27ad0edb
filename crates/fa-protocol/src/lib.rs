//! fa-protocol: Tunnel preamble for forwagent
//!
//! Every tunnel carries exactly one agent session. Immediately after the TLS
//! handshake the dialing side writes a 3-byte [`ProtocolTag`]; everything
//! after it is opaque agent payload.

pub mod error;
pub mod tag;

pub use error::ProtocolError;
pub use tag::{read_tag, write_tag, ProtocolTag, TAG_LEN};

/// Upper bound on a single relay read.
pub const BUF_SIZE: usize = 4096;
