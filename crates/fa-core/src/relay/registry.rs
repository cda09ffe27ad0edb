//! Forwarding registry

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use fa_protocol::BUF_SIZE;
use futures::{FutureExt, Stream, StreamExt};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, UnixListener};
use tokio_stream::wrappers::{TcpListenerStream, UnixListenerStream};
use tokio_stream::StreamMap;
use tokio_util::io::ReaderStream;

use super::{Acceptor, BoxedDuplex, ConnId, Duplex, Incoming};

/// Readiness event produced by a registered source
pub(crate) enum Event {
    /// Bytes read from a connection, at most [`BUF_SIZE`]
    Data(io::Result<Bytes>),
    /// The connection reached end of stream
    Closed,
    /// A listener accepted a connection
    Incoming(io::Result<Incoming>),
}

type Source = Pin<Box<dyn Stream<Item = Event> + Send>>;
type Writer = WriteHalf<BoxedDuplex>;

pub(crate) enum Handler {
    /// Mirror bytes into the write half of `peer`
    Forward { peer: ConnId, out: Writer },
    /// Send each chunk to `agent` and return exactly one reply chunk
    RequestReply { agent: BoxedDuplex, out: Writer },
    /// Hand accepted connections to `acceptor`
    Accept {
        acceptor: Arc<dyn Acceptor>,
        label: String,
    },
}

/// Every connection the relay currently owns
///
/// A connection has at most one reader: its source in the stream map.
/// Writers live inside the handler of whichever connection feeds them.
#[derive(Default)]
pub struct Registry {
    sources: StreamMap<ConnId, Source>,
    handlers: HashMap<ConnId, Handler>,
    next_id: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> ConnId {
        self.next_id += 1;
        ConnId::new(self.next_id)
    }

    /// Register a listener; each accepted connection is given to `acceptor`
    pub fn add_listener<S>(
        &mut self,
        label: impl Into<String>,
        incoming: S,
        acceptor: Arc<dyn Acceptor>,
    ) -> ConnId
    where
        S: Stream<Item = io::Result<Incoming>> + Send + 'static,
    {
        let id = self.allocate();
        let label = label.into();
        tracing::debug!("Registered listener {} as {}", label, id);
        self.sources.insert(id, Box::pin(incoming.map(Event::Incoming)));
        self.handlers.insert(id, Handler::Accept { acceptor, label });
        id
    }

    /// Register a Unix domain socket listener
    pub fn add_unix_listener(
        &mut self,
        label: impl Into<String>,
        listener: UnixListener,
        acceptor: Arc<dyn Acceptor>,
    ) -> ConnId {
        let incoming = UnixListenerStream::new(listener).map(|res| res.map(Incoming::Unix));
        self.add_listener(label, incoming, acceptor)
    }

    /// Register a TCP listener
    pub fn add_tcp_listener(
        &mut self,
        label: impl Into<String>,
        listener: TcpListener,
        acceptor: Arc<dyn Acceptor>,
    ) -> ConnId {
        let incoming = TcpListenerStream::new(listener).map(|res| res.map(Incoming::Tcp));
        self.add_listener(label, incoming, acceptor)
    }

    /// Register two connections as a forwarding pair
    pub fn add_pair(&mut self, a: impl Duplex, b: impl Duplex) -> (ConnId, ConnId) {
        let (a_id, b_id) = (self.allocate(), self.allocate());
        let (a_read, a_write) = tokio::io::split(Box::new(a) as BoxedDuplex);
        let (b_read, b_write) = tokio::io::split(Box::new(b) as BoxedDuplex);

        self.sources.insert(a_id, reader(a_read));
        self.sources.insert(b_id, reader(b_read));
        self.handlers.insert(
            a_id,
            Handler::Forward {
                peer: b_id,
                out: b_write,
            },
        );
        self.handlers.insert(
            b_id,
            Handler::Forward {
                peer: a_id,
                out: a_write,
            },
        );

        tracing::debug!("Registered pair {} <-> {}", a_id, b_id);
        (a_id, b_id)
    }

    /// Register a tunnel whose chunks are answered through `agent`
    ///
    /// Only the tunnel is polled; the agent channel is read once per chunk.
    pub fn add_request_reply(&mut self, tunnel: impl Duplex, agent: impl Duplex) -> ConnId {
        let id = self.allocate();
        let (read, write) = tokio::io::split(Box::new(tunnel) as BoxedDuplex);

        self.sources.insert(id, reader(read));
        self.handlers.insert(
            id,
            Handler::RequestReply {
                agent: Box::new(agent),
                out: write,
            },
        );

        tracing::debug!("Registered request/reply tunnel {}", id);
        id
    }

    pub fn contains(&self, id: ConnId) -> bool {
        self.handlers.contains_key(&id)
    }

    /// Number of registered connections, listeners included
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// The other half of a forwarding pair
    pub fn peer_of(&self, id: ConnId) -> Option<ConnId> {
        match self.handlers.get(&id) {
            Some(Handler::Forward { peer, .. }) => Some(*peer),
            _ => None,
        }
    }

    pub fn is_listener(&self, id: ConnId) -> bool {
        matches!(self.handlers.get(&id), Some(Handler::Accept { .. }))
    }

    pub(crate) fn acceptor(&self, id: ConnId) -> Option<(Arc<dyn Acceptor>, String)> {
        match self.handlers.get(&id) {
            Some(Handler::Accept { acceptor, label }) => Some((acceptor.clone(), label.clone())),
            _ => None,
        }
    }

    pub(crate) fn handler_mut(&mut self, id: ConnId) -> Option<&mut Handler> {
        self.handlers.get_mut(&id)
    }

    /// Deregister `id` and, if it is half of a pair, its peer
    ///
    /// Writers are shut down on a best-effort basis; dropping the halves
    /// closes the underlying connections.
    pub async fn close(&mut self, id: ConnId) {
        let Some(handler) = self.deregister(id) else {
            return;
        };

        match handler {
            Handler::Forward { peer, mut out } => {
                let _ = out.shutdown().await;
                if let Some(Handler::Forward { out: mut back, .. }) = self.deregister(peer) {
                    let _ = back.shutdown().await;
                }
                tracing::debug!("Closed pair {} <-> {}", id, peer);
            }
            Handler::RequestReply {
                mut agent,
                mut out,
            } => {
                let _ = out.shutdown().await;
                let _ = agent.shutdown().await;
                tracing::debug!("Closed request/reply tunnel {}", id);
            }
            Handler::Accept { label, .. } => {
                tracing::debug!("Closed listener {}", label);
            }
        }
    }

    fn deregister(&mut self, id: ConnId) -> Option<Handler> {
        self.sources.remove(&id);
        self.handlers.remove(&id)
    }

    /// Wait until at least one source is ready, then drain every event that
    /// is ready without waiting
    ///
    /// Returns an empty batch once no sources are left.
    pub(crate) async fn next_batch(&mut self) -> Vec<(ConnId, Event)> {
        let mut batch = Vec::new();
        match self.sources.next().await {
            Some(first) => batch.push(first),
            None => return batch,
        }

        for _ in 1..self.sources.len() {
            match self.sources.next().now_or_never() {
                Some(Some(item)) => batch.push(item),
                _ => break,
            }
        }
        batch
    }
}

fn reader(read: ReadHalf<BoxedDuplex>) -> Source {
    Box::pin(
        ReaderStream::with_capacity(read, BUF_SIZE)
            .map(Event::Data)
            .chain(futures::stream::once(async { Event::Closed })),
    )
}
