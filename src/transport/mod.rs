//! Transport layer.
//!
//! A [`Transport`] dials the endpoint and hands back a [`Link`]: a pair
//! of channels carrying raw text frames. The connection manager speaks
//! Engine.IO/Socket.IO over the link and never touches the socket
//! itself.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐   Link (mpsc)   ┌──────────────┐   WebSocket   ┌────────┐
//! │ Manager event loop │◄───────────────►│  Frame pump  │◄─────────────►│ Server │
//! └────────────────────┘                 └──────────────┘               └────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | tokio-tungstenite client transport |
//! | `memory` | In-process transport with a scriptable server end |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Submodules
// ============================================================================

/// In-process transport for tests and embedding.
pub mod memory;

/// WebSocket client transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::{MemoryPeer, MemoryServer, MemoryTransport};
pub use websocket::WebSocketTransport;

// ============================================================================
// Transport
// ============================================================================

/// Opens links to the real-time endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Dials `url` and returns an open link.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be reached.
    async fn open(&self, url: &Url) -> Result<Link>;
}

// ============================================================================
// LinkEvent
// ============================================================================

/// Something that happened on the far side of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A text frame arrived.
    Frame(String),
    /// The link closed cleanly.
    Closed,
    /// The link failed.
    Failed(String),
}

// ============================================================================
// Link
// ============================================================================

/// An open, frame-oriented connection.
///
/// Dropping the link closes it.
#[derive(Debug)]
pub struct Link {
    /// Frames to the server.
    outgoing: mpsc::UnboundedSender<String>,
    /// Frames and close notifications from the server.
    incoming: mpsc::UnboundedReceiver<LinkEvent>,
}

impl Link {
    /// Creates a link from its channel ends.
    #[inline]
    #[must_use]
    pub fn new(
        outgoing: mpsc::UnboundedSender<String>,
        incoming: mpsc::UnboundedReceiver<LinkEvent>,
    ) -> Self {
        Self { outgoing, incoming }
    }

    /// Queues a frame for sending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the far side is gone.
    pub fn send(&self, frame: String) -> Result<()> {
        self.outgoing
            .send(frame)
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Waits for the next event. A dropped sender reads as [`LinkEvent::Closed`].
    pub async fn recv(&mut self) -> LinkEvent {
        self.incoming.recv().await.unwrap_or(LinkEvent::Closed)
    }

    /// Returns `true` if the far side has stopped reading.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outgoing.is_closed()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_link_send_and_recv() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let mut link = Link::new(out_tx, in_rx);

        link.send("2".to_string()).expect("send");
        assert_eq!(out_rx.recv().await.as_deref(), Some("2"));

        in_tx.send(LinkEvent::Frame("3".to_string())).expect("push");
        assert_eq!(link.recv().await, LinkEvent::Frame("3".to_string()));
    }

    #[tokio::test]
    async fn test_link_reports_closed_when_far_side_drops() {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<LinkEvent>();
        let mut link = Link::new(out_tx, in_rx);

        drop(in_tx);
        assert_eq!(link.recv().await, LinkEvent::Closed);

        drop(out_rx);
        assert!(link.is_closed());
        assert!(matches!(link.send("4".into()), Err(Error::ConnectionClosed)));
    }
}
