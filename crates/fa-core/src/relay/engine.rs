//! Relay loop

use std::any::Any;
use std::panic::AssertUnwindSafe;

use bytes::{Bytes, BytesMut};
use fa_protocol::BUF_SIZE;
use futures::FutureExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::registry::{Event, Handler};
use super::{ConnId, Registry};
use crate::error::RelayError;

/// Single-threaded relay engine
///
/// Each turn waits for at least one registered connection to become ready,
/// then dispatches every event in that batch. Connections closed earlier in
/// a batch are skipped; connections registered during a batch are first
/// polled on the next turn.
#[derive(Default)]
pub struct Relay {
    registry: Registry,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Run until no sources remain or a fatal error occurs
    pub async fn run(&mut self) -> Result<(), RelayError> {
        tracing::info!("Relay started with {} registered handles", self.registry.len());
        while self.turn().await? {}
        tracing::info!("Relay stopped: nothing left to poll");
        Ok(())
    }

    /// Wait for one batch of events and dispatch it
    ///
    /// Returns `Ok(false)` once the registry has no sources left. Only
    /// fatal errors are returned; everything else is logged and the
    /// affected connection torn down.
    pub async fn turn(&mut self) -> Result<bool, RelayError> {
        let batch = self.registry.next_batch().await;
        if batch.is_empty() {
            return Ok(false);
        }

        for (id, event) in batch {
            if !self.registry.contains(id) {
                continue;
            }

            let outcome = AssertUnwindSafe(self.dispatch(id, event))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(RelayError::Panic(panic_message(payload))));

            match outcome {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    tracing::error!("Fatal error on {}: {}", id, e);
                    return Err(e);
                }
                Err(e) => {
                    let listener = self.registry.is_listener(id);
                    report_fault(id, &e, listener);
                    if !listener {
                        self.registry.close(id).await;
                    }
                }
            }
        }

        Ok(true)
    }

    async fn dispatch(&mut self, id: ConnId, event: Event) -> Result<(), RelayError> {
        match event {
            Event::Data(Ok(chunk)) => self.forward(id, chunk).await,
            Event::Data(Err(e)) => Err(RelayError::Transport(e)),
            Event::Closed => {
                self.registry.close(id).await;
                Ok(())
            }
            Event::Incoming(Ok(incoming)) => {
                let Some((acceptor, label)) = self.registry.acceptor(id) else {
                    return Ok(());
                };
                tracing::debug!("Accepted connection on {}", label);
                acceptor.accept(incoming, &mut self.registry).await
            }
            Event::Incoming(Err(e)) => {
                tracing::warn!("Accept error on {}: {}", id, e);
                Ok(())
            }
        }
    }

    /// Deliver one chunk read from `id`
    async fn forward(&mut self, id: ConnId, chunk: Bytes) -> Result<(), RelayError> {
        let reply_closed = match self.registry.handler_mut(id) {
            Some(Handler::Forward { out, .. }) => {
                out.write_all(&chunk).await?;
                out.flush().await?;
                false
            }
            Some(Handler::RequestReply { agent, out }) => {
                agent.write_all(&chunk).await?;
                agent.flush().await?;

                let mut reply = BytesMut::with_capacity(BUF_SIZE);
                let n = agent.read_buf(&mut reply).await?;
                if n == 0 {
                    true
                } else {
                    out.write_all(&reply).await?;
                    out.flush().await?;
                    false
                }
            }
            Some(Handler::Accept { .. }) | None => false,
        };

        if reply_closed {
            tracing::debug!("Agent closed its channel for {}", id);
            self.registry.close(id).await;
        }
        Ok(())
    }
}

/// Log a contained fault; listeners stay registered, anything else is torn down
fn report_fault(id: ConnId, err: &RelayError, listener: bool) {
    match err {
        RelayError::Panic(_) => tracing::error!("{} on {}", err, id),
        _ if listener => tracing::warn!("Accept on {} failed: {}", id, err),
        _ => tracing::warn!("Tearing down {}: {}", id, err),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::relay::{Acceptor, Incoming};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::io::duplex;
    use tokio::net::{TcpListener, TcpStream};

    #[tokio::test]
    async fn test_pair_forwards_both_directions() {
        let mut relay = Relay::new();
        let (local, mut local_far) = duplex(1024);
        let (tunnel, mut tunnel_far) = duplex(1024);
        relay.registry_mut().add_pair(local, tunnel);

        let handle = tokio::spawn(async move { relay.run().await });

        local_far.write_all(b"request").await.unwrap();
        let mut buf = [0u8; 7];
        tunnel_far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"request");

        tunnel_far.write_all(b"reply").await.unwrap();
        let mut buf = [0u8; 5];
        local_far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"reply");

        drop(local_far);
        let mut rest = Vec::new();
        tunnel_far.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_large_payload_preserves_order() {
        let mut relay = Relay::new();
        let (local, mut local_far) = duplex(64 * 1024);
        let (tunnel, mut tunnel_far) = duplex(64 * 1024);
        relay.registry_mut().add_pair(local, tunnel);

        let handle = tokio::spawn(async move { relay.run().await });

        let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            local_far.write_all(&payload).await.unwrap();
            local_far.shutdown().await.unwrap();
            local_far
        });

        let mut received = Vec::new();
        tunnel_far.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, expected);

        drop(writer.await.unwrap());
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_eof_on_either_side_tears_down_pair() {
        let mut relay = Relay::new();
        let (local, local_far) = duplex(64);
        let (tunnel, mut tunnel_far) = duplex(64);
        let (a, b) = relay.registry_mut().add_pair(local, tunnel);

        drop(local_far);
        assert!(relay.turn().await.unwrap());

        assert!(!relay.registry().contains(a));
        assert!(!relay.registry().contains(b));
        let mut buf = [0u8; 1];
        assert_eq!(tunnel_far.read(&mut buf).await.unwrap(), 0);
        assert!(!relay.turn().await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_peer_in_same_batch_is_skipped() {
        let mut relay = Relay::new();
        let (local, local_far) = duplex(64);
        let (tunnel, tunnel_far) = duplex(64);
        relay.registry_mut().add_pair(local, tunnel);

        drop(local_far);
        drop(tunnel_far);
        tokio::task::yield_now().await;

        assert!(relay.turn().await.unwrap());
        assert!(relay.registry().is_empty());
    }

    #[tokio::test]
    async fn test_request_reply_returns_one_chunk_per_request() {
        let mut relay = Relay::new();
        let (tunnel, mut tunnel_far) = duplex(1024);
        let (agent, mut agent_far) = duplex(1024);
        relay.registry_mut().add_request_reply(tunnel, agent);

        let fake_agent = tokio::spawn(async move {
            let mut buf = [0u8; 4];
            agent_far.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"\x00\x00\x00\x0b");
            agent_far.write_all(b"\x00\x00\x00\x0c").await.unwrap();
            agent_far
        });

        let handle = tokio::spawn(async move { relay.run().await });

        tunnel_far.write_all(b"\x00\x00\x00\x0b").await.unwrap();
        let mut reply = [0u8; 4];
        tunnel_far.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"\x00\x00\x00\x0c");

        drop(fake_agent.await.unwrap());
        drop(tunnel_far);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_request_reply_closes_when_agent_hangs_up() {
        let mut relay = Relay::new();
        let (tunnel, mut tunnel_far) = duplex(1024);
        let (agent, agent_far) = duplex(1024);
        let id = relay.registry_mut().add_request_reply(tunnel, agent);
        drop(agent_far);

        tunnel_far.write_all(b"ping").await.unwrap();
        assert!(relay.turn().await.unwrap());

        assert!(!relay.registry().contains(id));
        let mut buf = [0u8; 1];
        assert_eq!(tunnel_far.read(&mut buf).await.unwrap(), 0);
    }

    struct CountingAcceptor {
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl Acceptor for CountingAcceptor {
        async fn accept(
            &self,
            _incoming: Incoming,
            _registry: &mut Registry,
        ) -> Result<(), RelayError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return Err(RelayError::Handshake(std::io::Error::other("bad cert")));
            }
            Ok(())
        }
    }

    struct PanickingAcceptor;

    #[async_trait]
    impl Acceptor for PanickingAcceptor {
        async fn accept(
            &self,
            _incoming: Incoming,
            _registry: &mut Registry,
        ) -> Result<(), RelayError> {
            panic!("acceptor exploded");
        }
    }

    struct MisconfiguredAcceptor;

    #[async_trait]
    impl Acceptor for MisconfiguredAcceptor {
        async fn accept(
            &self,
            _incoming: Incoming,
            _registry: &mut Registry,
        ) -> Result<(), RelayError> {
            Err(ConfigError::Invalid("trust bundle vanished".into()).into())
        }
    }

    async fn listen(
        relay: &mut Relay,
        acceptor: Arc<dyn Acceptor>,
    ) -> (ConnId, std::net::SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let id = relay
            .registry_mut()
            .add_tcp_listener("test", listener, acceptor);
        (id, addr)
    }

    #[tokio::test]
    async fn test_listener_survives_failed_accept() {
        let mut relay = Relay::new();
        let acceptor = Arc::new(CountingAcceptor {
            calls: AtomicUsize::new(0),
            fail_first: true,
        });
        let (id, addr) = listen(&mut relay, acceptor.clone()).await;

        let _first = TcpStream::connect(addr).await.unwrap();
        assert!(relay.turn().await.unwrap());
        let _second = TcpStream::connect(addr).await.unwrap();
        assert!(relay.turn().await.unwrap());

        assert_eq!(acceptor.calls.load(Ordering::SeqCst), 2);
        assert!(relay.registry().is_listener(id));
    }

    #[tokio::test]
    async fn test_panicking_acceptor_is_contained() {
        let mut relay = Relay::new();
        let (id, addr) = listen(&mut relay, Arc::new(PanickingAcceptor)).await;

        let _client = TcpStream::connect(addr).await.unwrap();
        assert!(relay.turn().await.unwrap());

        assert!(relay.registry().is_listener(id));
    }

    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogCapture {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    /// Capture WARN and above, the CLI's default level, for this thread
    fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
        let capture = LogCapture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    #[tokio::test]
    async fn test_panic_is_logged_as_error() {
        let (logs, _guard) = capture_logs();
        let mut relay = Relay::new();
        let (_, addr) = listen(&mut relay, Arc::new(PanickingAcceptor)).await;

        let _client = TcpStream::connect(addr).await.unwrap();
        assert!(relay.turn().await.unwrap());

        let out = logs.contents();
        assert!(out.contains("ERROR"), "{out}");
        assert!(out.contains("acceptor exploded"), "{out}");
    }

    #[tokio::test]
    async fn test_transport_fault_is_logged_as_warning() {
        let (logs, _guard) = capture_logs();
        let mut relay = Relay::new();
        let (tunnel, mut tunnel_far) = duplex(1024);
        let (agent, agent_far) = duplex(1024);
        let id = relay.registry_mut().add_request_reply(tunnel, agent);
        drop(agent_far);

        tunnel_far.write_all(b"ping").await.unwrap();
        assert!(relay.turn().await.unwrap());

        assert!(!relay.registry().contains(id));
        let out = logs.contents();
        assert!(out.contains("WARN"), "{out}");
        assert!(out.contains(&format!("Tearing down {id}")), "{out}");
    }

    #[tokio::test]
    async fn test_clean_eof_is_not_logged_as_fault() {
        let (logs, _guard) = capture_logs();
        let mut relay = Relay::new();
        let (local, local_far) = duplex(64);
        let (tunnel, _tunnel_far) = duplex(64);
        relay.registry_mut().add_pair(local, tunnel);

        drop(local_far);
        assert!(relay.turn().await.unwrap());

        assert!(relay.registry().is_empty());
        assert_eq!(logs.contents(), "");
    }

    #[tokio::test]
    async fn test_config_error_stops_relay() {
        let mut relay = Relay::new();
        let (_, addr) = listen(&mut relay, Arc::new(MisconfiguredAcceptor)).await;

        let _client = TcpStream::connect(addr).await.unwrap();
        let err = relay.run().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
