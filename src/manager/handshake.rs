//! Connect attempt: dial, Engine.IO open, namespace join.
//!
//! ```text
//! client                               server
//!   │ ── dial ───────────────────────────► │
//!   │ ◄────────────── 0{"sid",pingInterval}│  engine open
//!   │ ── 40/ns,{auth} ───────────────────► │  namespace CONNECT
//!   │ ◄──────────────────── 40/ns,{"sid"}  │  joined
//!   │ ◄──────────────────── 44/ns,{message}│  or rejected
//! ```
//!
//! The whole exchange runs under the configured connect timeout.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::{EnginePacket, Handshake, Packet, PacketType};
use crate::transport::{Link, LinkEvent, Transport};

// ============================================================================
// Established
// ============================================================================

/// Outcome of a successful connect attempt.
#[derive(Debug)]
pub(crate) struct Established {
    /// The open link.
    pub link: Link,
    /// Engine.IO session parameters.
    pub handshake: Handshake,
    /// Socket session id.
    pub sid: SessionId,
}

// ============================================================================
// Attempt
// ============================================================================

/// Parameters for one connect attempt.
#[derive(Clone)]
pub(crate) struct Attempt {
    pub transport: Arc<dyn Transport>,
    pub url: Url,
    pub namespace: String,
    pub auth: Option<Value>,
    pub connect_timeout: Duration,
}

impl Attempt {
    /// Runs the attempt to completion or timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the deadline passes
    /// - [`Error::ConnectRejected`] if the server refuses the namespace
    /// - [`Error::WebSocket`] / [`Error::Connection`] / [`Error::ConnectionClosed`] on transport failure
    /// - [`Error::Protocol`] on unexpected frames
    pub async fn run(self) -> Result<Established> {
        let limit = self.connect_timeout;
        timeout(limit, self.establish())
            .await
            .map_err(|_| Error::connection_timeout(limit.as_millis() as u64))?
    }

    async fn establish(self) -> Result<Established> {
        debug!(url = %self.url, namespace = %self.namespace, "Dialing");
        let mut link = self.transport.open(&self.url).await?;

        let handshake = await_open(&mut link).await?;
        debug!(engine_sid = %handshake.sid, ping_interval = handshake.ping_interval, "Engine session open");

        link.send(Packet::connect(self.namespace.clone(), self.auth).to_frame())?;

        let sid = await_namespace(&mut link, &self.namespace).await?;

        Ok(Established {
            link,
            handshake,
            sid,
        })
    }
}

// ============================================================================
// Steps
// ============================================================================

async fn next_frame(link: &mut Link) -> Result<String> {
    match link.recv().await {
        LinkEvent::Frame(frame) => Ok(frame),
        LinkEvent::Closed => Err(Error::ConnectionClosed),
        LinkEvent::Failed(message) => Err(Error::connection(message)),
    }
}

async fn await_open(link: &mut Link) -> Result<Handshake> {
    loop {
        let frame = next_frame(link).await?;
        match EnginePacket::decode(&frame)? {
            EnginePacket::Open(handshake) => return Ok(handshake),
            EnginePacket::Noop => continue,
            EnginePacket::Close => return Err(Error::ConnectionClosed),
            other => {
                return Err(Error::protocol(format!(
                    "expected engine open, got {other:?}"
                )));
            }
        }
    }
}

async fn await_namespace(link: &mut Link, namespace: &str) -> Result<SessionId> {
    loop {
        let frame = next_frame(link).await?;
        let body = match EnginePacket::decode(&frame)? {
            EnginePacket::Message(body) => body,
            EnginePacket::Ping => {
                link.send(EnginePacket::Pong.encode())?;
                continue;
            }
            EnginePacket::Close => return Err(Error::ConnectionClosed),
            EnginePacket::Noop | EnginePacket::Pong | EnginePacket::Upgrade => continue,
            EnginePacket::Open(_) => {
                return Err(Error::protocol("duplicate engine open"));
            }
        };

        let packet = Packet::decode(&body)?;
        if packet.namespace != namespace {
            trace!(namespace = %packet.namespace, "Ignoring packet for other namespace");
            continue;
        }

        match packet.packet_type {
            PacketType::Connect => {
                let sid = packet
                    .connect_sid()
                    .ok_or_else(|| Error::protocol("CONNECT without sid"))?;
                return Ok(SessionId::new(sid));
            }
            PacketType::ConnectError => {
                let message = packet
                    .connect_error_message()
                    .unwrap_or_else(|| "connect error".to_string());
                return Err(Error::connect_rejected(message));
            }
            other => {
                trace!(?other, "Ignoring packet before namespace join");
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

    use serde_json::json;

    use crate::transport::MemoryTransport;

    fn attempt(transport: MemoryTransport, auth: Option<Value>) -> Attempt {
        Attempt {
            transport: Arc::new(transport),
            url: Url::parse("ws://localhost:3001/socket.io/?EIO=4&transport=websocket")
                .expect("url"),
            namespace: "/".to_string(),
            auth,
            connect_timeout: Duration::from_secs(20),
        }
    }

    #[tokio::test]
    async fn test_establish_success() {
        let (transport, mut server) = MemoryTransport::new();
        let task = tokio::spawn(attempt(transport, Some(json!({"token": "t"}))).run());

        let mut peer = server.accept().await.expect("dial");
        let auth = peer.complete_handshake("sid-1").await.expect("handshake");
        assert_eq!(auth, Some(json!({"token": "t"})));

        let established = task.await.expect("join").expect("established");
        assert_eq!(established.sid.as_str(), "sid-1");
        assert_eq!(established.handshake.ping_interval, 25_000);
    }

    #[tokio::test]
    async fn test_establish_rejected() {
        let (transport, mut server) = MemoryTransport::new();
        let task = tokio::spawn(attempt(transport, None).run());

        let mut peer = server.accept().await.expect("dial");
        peer.send_open(Handshake {
            sid: "e".into(),
            upgrades: Vec::new(),
            ping_interval: 25_000,
            ping_timeout: 20_000,
            max_payload: 1_000_000,
        })
        .expect("open");
        let connect = peer.recv_packet().await.expect("connect");
        assert_eq!(connect.packet_type, PacketType::Connect);
        peer.reject_namespace("/", "unauthorized").expect("reject");

        let err = task.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::ConnectRejected { ref message } if message == "unauthorized"));
    }

    #[tokio::test]
    async fn test_establish_refused() {
        let (transport, server) = MemoryTransport::new();
        server.refuse_next(1);

        let err = attempt(transport, None).run().await.unwrap_err();
        assert!(err.is_connection_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_establish_times_out_without_open() {
        let (transport, mut server) = MemoryTransport::new();
        let task = tokio::spawn(attempt(transport, None).run());

        let _peer = server.accept().await.expect("dial");
        let err = task.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::ConnectionTimeout { timeout_ms: 20_000 }));
    }

    #[tokio::test]
    async fn test_establish_link_closed_before_open() {
        let (transport, mut server) = MemoryTransport::new();
        let task = tokio::spawn(attempt(transport, None).run());

        let peer = server.accept().await.expect("dial");
        peer.close();

        let err = task.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }
}
