//! In-process transport.
//!
//! [`MemoryTransport`] hands every dial to a [`MemoryServer`] as a
//! [`MemoryPeer`], which can script the server side of the protocol:
//! handshake, events, acks, heartbeats, rejections and drops. Dials can
//! be refused to simulate an unreachable endpoint.
//!
//! # Example
//!
//! ```ignore
//! let (transport, mut server) = MemoryTransport::new();
//! let manager = ConnectionManager::builder().transport(transport).build()?;
//!
//! manager.connect();
//! let mut peer = server.accept().await.expect("dial");
//! peer.complete_handshake("sid-1").await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::AckId;
use crate::protocol::{EnginePacket, Handshake, Packet, PacketType};

use super::{Link, LinkEvent, Transport};

// ============================================================================
// Constants
// ============================================================================

/// Default server ping interval (ms).
pub const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;

/// Default server ping timeout (ms).
pub const DEFAULT_PING_TIMEOUT_MS: u64 = 20_000;

// ============================================================================
// Shared State
// ============================================================================

#[derive(Debug)]
struct Shared {
    dials: AtomicUsize,
    refuse_all: AtomicBool,
    refuse_next: AtomicUsize,
    last_url: Mutex<Option<Url>>,
}

impl Shared {
    /// Consumes one refusal if any are configured.
    fn should_refuse(&self) -> bool {
        if self.refuse_all.load(Ordering::SeqCst) {
            return true;
        }

        self.refuse_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// Client half: implements [`Transport`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryTransport {
    /// Creates a connected transport/server pair.
    #[must_use]
    pub fn new() -> (Self, MemoryServer) {
        let shared = Arc::new(Shared {
            dials: AtomicUsize::new(0),
            refuse_all: AtomicBool::new(false),
            refuse_next: AtomicUsize::new(0),
            last_url: Mutex::new(None),
        });
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();

        let transport = Self {
            shared: Arc::clone(&shared),
            peers: peers_tx,
        };
        let server = MemoryServer {
            shared,
            peers: peers_rx,
        };

        (transport, server)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, url: &Url) -> Result<Link> {
        let dial = self.shared.dials.fetch_add(1, Ordering::SeqCst) + 1;
        *self.shared.last_url.lock() = Some(url.clone());

        if self.shared.should_refuse() {
            debug!(dial, "Memory dial refused");
            return Err(Error::connection("connection refused"));
        }

        let (to_server_tx, to_server_rx) = mpsc::unbounded_channel();
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            url: url.clone(),
            to_client: to_client_tx,
            from_client: to_server_rx,
        };

        self.peers
            .send(peer)
            .map_err(|_| Error::connection("memory server is gone"))?;

        debug!(dial, "Memory dial accepted");
        Ok(Link::new(to_server_tx, to_client_rx))
    }
}

// ============================================================================
// MemoryServer
// ============================================================================

/// Server half: receives one [`MemoryPeer`] per successful dial.
#[derive(Debug)]
pub struct MemoryServer {
    shared: Arc<Shared>,
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryServer {
    /// Waits for the next successful dial.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    /// Returns a dial that already happened, if any.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peers.try_recv().ok()
    }

    /// Total dials, refused ones included.
    #[inline]
    #[must_use]
    pub fn dial_count(&self) -> usize {
        self.shared.dials.load(Ordering::SeqCst)
    }

    /// URL of the most recent dial.
    #[must_use]
    pub fn last_url(&self) -> Option<Url> {
        self.shared.last_url.lock().clone()
    }

    /// Refuses every dial while `refuse` is set.
    pub fn refuse_all(&self, refuse: bool) {
        self.shared.refuse_all.store(refuse, Ordering::SeqCst);
    }

    /// Refuses the next `count` dials.
    pub fn refuse_next(&self, count: usize) {
        self.shared.refuse_next.store(count, Ordering::SeqCst);
    }
}

// ============================================================================
// MemoryPeer
// ============================================================================

/// Server side of one memory link.
#[derive(Debug)]
pub struct MemoryPeer {
    url: Url,
    to_client: mpsc::UnboundedSender<LinkEvent>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// URL the client dialed.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Sends a raw frame to the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the client dropped the link.
    pub fn send_frame(&self, frame: impl Into<String>) -> Result<()> {
        self.to_client
            .send(LinkEvent::Frame(frame.into()))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Sends the Engine.IO `open` packet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the client dropped the link.
    pub fn send_open(&self, handshake: Handshake) -> Result<()> {
        self.send_frame(EnginePacket::Open(handshake).encode())
    }

    /// Confirms the namespace connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the client dropped the link.
    pub fn accept_namespace(&self, namespace: &str, sid: &str) -> Result<()> {
        let packet = Packet::connect(namespace, Some(serde_json::json!({ "sid": sid })));
        self.send_frame(packet.to_frame())
    }

    /// Refuses the namespace connection with `CONNECT_ERROR`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the client dropped the link.
    pub fn reject_namespace(&self, namespace: &str, message: &str) -> Result<()> {
        self.send_frame(Packet::connect_error(namespace, message).to_frame())
    }

    /// Runs the server side of a default-namespace handshake.
    ///
    /// Returns the auth payload sent by the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the client closes the link or sends anything
    /// other than a namespace `CONNECT`.
    pub async fn complete_handshake(&mut self, sid: &str) -> Result<Option<Value>> {
        self.send_open(Handshake {
            sid: format!("engine-{sid}"),
            upgrades: Vec::new(),
            ping_interval: DEFAULT_PING_INTERVAL_MS,
            ping_timeout: DEFAULT_PING_TIMEOUT_MS,
            max_payload: 1_000_000,
        })?;

        let frame = self.recv().await.ok_or(Error::ConnectionClosed)?;
        let body = match EnginePacket::decode(&frame)? {
            EnginePacket::Message(body) => body,
            other => return Err(Error::protocol(format!("expected CONNECT, got {other:?}"))),
        };
        let packet = Packet::decode(&body)?;
        if packet.packet_type != PacketType::Connect {
            return Err(Error::protocol(format!("expected CONNECT, got {body}")));
        }

        self.accept_namespace(&packet.namespace, sid)?;
        Ok(packet.data)
    }

    /// Broadcasts an event to the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the client dropped the link.
    pub fn emit(&self, name: &str, payload: Value) -> Result<()> {
        self.send_frame(Packet::event("/", name, payload, None).to_frame())
    }

    /// Acknowledges a client event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the client dropped the link.
    pub fn ack(&self, ack_id: AckId, args: Vec<Value>) -> Result<()> {
        self.send_frame(Packet::ack("/", ack_id, args).to_frame())
    }

    /// Sends an Engine.IO ping.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the client dropped the link.
    pub fn ping(&self) -> Result<()> {
        self.send_frame(EnginePacket::Ping.encode())
    }

    /// Disconnects the client from the default namespace (`io server disconnect`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the client dropped the link.
    pub fn server_disconnect(&self) -> Result<()> {
        self.send_frame(Packet::disconnect("/").to_frame())
    }

    /// Closes the link cleanly.
    pub fn close(self) {
        let _ = self.to_client.send(LinkEvent::Closed);
    }

    /// Fails the link.
    pub fn fail(self, message: &str) {
        let _ = self.to_client.send(LinkEvent::Failed(message.to_string()));
    }

    /// Waits for the next frame from the client; `None` once it dropped the link.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Returns a frame the client already sent, if any.
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Waits for the next client packet and decodes it.
    ///
    /// Heartbeat replies are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] once the client dropped the link,
    /// or a protocol error for undecodable frames.
    pub async fn recv_packet(&mut self) -> Result<Packet> {
        loop {
            let frame = self.recv().await.ok_or(Error::ConnectionClosed)?;
            match EnginePacket::decode(&frame)? {
                EnginePacket::Message(body) => return Packet::decode(&body),
                EnginePacket::Pong => continue,
                other => {
                    return Err(Error::protocol(format!("unexpected engine packet {other:?}")));
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("ws://localhost:3001/socket.io/?EIO=4&transport=websocket").expect("url")
    }

    #[tokio::test]
    async fn test_dial_reaches_server() {
        let (transport, mut server) = MemoryTransport::new();
        let mut link = transport.open(&url()).await.expect("open");
        let mut peer = server.accept().await.expect("peer");

        assert_eq!(server.dial_count(), 1);
        assert_eq!(peer.url().path(), "/socket.io/");

        link.send("40".into()).expect("send");
        assert_eq!(peer.recv().await.as_deref(), Some("40"));

        peer.ping().expect("ping");
        assert_eq!(link.recv().await, LinkEvent::Frame("2".into()));
    }

    #[tokio::test]
    async fn test_refuse_next_counts_down() {
        let (transport, mut server) = MemoryTransport::new();
        server.refuse_next(2);

        assert!(transport.open(&url()).await.is_err());
        assert!(transport.open(&url()).await.is_err());
        assert!(transport.open(&url()).await.is_ok());

        assert_eq!(server.dial_count(), 3);
        assert!(server.try_accept().is_some());
    }

    #[tokio::test]
    async fn test_refuse_all() {
        let (transport, server) = MemoryTransport::new();
        server.refuse_all(true);

        for _ in 0..3 {
            assert!(matches!(
                transport.open(&url()).await,
                Err(Error::Connection { .. })
            ));
        }
        assert_eq!(server.dial_count(), 3);
        assert_eq!(server.last_url(), Some(url()));
    }

    #[tokio::test]
    async fn test_close_is_observed_by_link() {
        let (transport, mut server) = MemoryTransport::new();
        let mut link = transport.open(&url()).await.expect("open");
        let peer = server.accept().await.expect("peer");

        peer.close();
        assert_eq!(link.recv().await, LinkEvent::Closed);
    }

    #[test]
    fn test_reject_namespace_frame() {
        let (to_client, mut rx) = mpsc::unbounded_channel();
        let (_tx, from_client) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            url: url(),
            to_client,
            from_client,
        };

        peer.reject_namespace("/", "Not authorized").expect("send");
        assert_eq!(
            rx.try_recv().expect("frame"),
            LinkEvent::Frame(r#"44{"message":"Not authorized"}"#.into())
        );
    }
}
