//! Relay engine
//!
//! One loop owns every forwarded connection. Each registered connection has
//! a stable [`ConnId`] and exactly one handler: forward to a peer, answer
//! through a request/reply agent channel, or accept new connections.

mod engine;
mod registry;

pub use engine::Relay;
pub use registry::Registry;

use std::fmt;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};

use crate::error::RelayError;

/// A bidirectional byte stream the relay can own
pub trait Duplex: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Duplex for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased [`Duplex`]
pub type BoxedDuplex = Box<dyn Duplex>;

/// Stable identity of a registered connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A connection accepted by a registered listener
#[derive(Debug)]
pub enum Incoming {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Incoming {
    /// Erase the transport type
    pub fn into_boxed(self) -> BoxedDuplex {
        match self {
            Incoming::Unix(stream) => Box::new(stream),
            Incoming::Tcp(stream) => Box::new(stream),
        }
    }
}

/// What a listener does with each accepted connection
///
/// Runs inside the relay loop with exclusive access to the registry; a
/// successful accept usually ends by registering a pair. Returning
/// [`RelayError::Config`] stops the engine, any other error only drops
/// the connection being accepted.
#[async_trait]
pub trait Acceptor: Send + Sync {
    async fn accept(&self, incoming: Incoming, registry: &mut Registry) -> Result<(), RelayError>;
}
