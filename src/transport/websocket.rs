//! WebSocket client transport.
//!
//! Dials the endpoint with tokio-tungstenite and spawns a frame pump
//! task that bridges the socket to the [`Link`] channels.
//!
//! # Frame Pump
//!
//! The pump task handles:
//!
//! - Incoming text frames → [`LinkEvent::Frame`]
//! - Close frames and stream end → [`LinkEvent::Closed`]
//! - Socket errors → [`LinkEvent::Failed`]
//! - Outgoing frames from the manager
//! - Closing the socket once the link is dropped

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::{Link, LinkEvent, Transport};

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Transport over a single WebSocket. No polling fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Creates the transport.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &Url) -> Result<Link> {
        let (ws_stream, response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .inspect_err(|e| debug!(%url, error = %e, "WebSocket connect failed"))
            .map_err(Error::from)?;

        debug!(%url, status = %response.status(), "WebSocket connected");

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_frame_pump(ws_stream, out_rx, in_tx));

        Ok(Link::new(out_tx, in_rx))
    }
}

// ============================================================================
// Frame Pump
// ============================================================================

/// Bridges a WebSocket to link channels until either side closes.
async fn run_frame_pump<S>(
    ws_stream: WebSocketStream<S>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    incoming: mpsc::UnboundedSender<LinkEvent>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if incoming.send(LinkEvent::Frame(text.to_string())).is_err() {
                            debug!("Link dropped while reading");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }

                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "WebSocket closed by remote");
                        let _ = incoming.send(LinkEvent::Closed);
                        break;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        let _ = incoming.send(LinkEvent::Failed(e.to_string()));
                        break;
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        let _ = incoming.send(LinkEvent::Closed);
                        break;
                    }

                    // Engine.IO runs its own heartbeat; ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            frame = outgoing.recv() => {
                match frame {
                    Some(frame) => {
                        trace!(%frame, "Sending frame");
                        if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                            warn!(error = %e, "Failed to send frame");
                            let _ = incoming.send(LinkEvent::Failed(e.to_string()));
                            break;
                        }
                    }

                    None => {
                        debug!("Link dropped, closing WebSocket");
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }

    debug!("Frame pump terminated");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_refused_keeps_websocket_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let url = Url::parse(&format!("ws://127.0.0.1:{port}/socket.io/")).expect("url");
        let result = WebSocketTransport::new().open(&url).await;

        let err = result.expect_err("nobody listening");
        assert!(matches!(err, Error::WebSocket(_)), "got {err:?}");
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("upgrade");

            ws.send(Message::Text("0{}".into())).await.expect("send");
            let reply = ws.next().await.expect("frame").expect("ok");
            ws.close(None).await.expect("close");
            reply.into_text().expect("text").to_string()
        });

        let url = Url::parse(&format!("ws://127.0.0.1:{port}/socket.io/")).expect("url");
        let mut link = WebSocketTransport::new().open(&url).await.expect("open");

        assert_eq!(link.recv().await, LinkEvent::Frame("0{}".to_string()));
        link.send("40".to_string()).expect("send");

        assert_eq!(server.await.expect("join"), "40");
        assert_eq!(link.recv().await, LinkEvent::Closed);
    }
}
