//! Typed event contract.
//!
//! Client → server events are [`ClientEvent`]; server → client
//! broadcasts parse into [`ServerEvent`]. Lifecycle names are reserved
//! and delivered by the manager itself.
//!
//! # Events
//!
//! | Name | Direction | Payload |
//! |------|-----------|---------|
//! | `newDocument` | both | [`Document`] |
//! | `updateDocument` | both | [`Document`] |
//! | `deleteDocuments` | both | `[DocumentId]` |
//! | `connect` | lifecycle | `null` |
//! | `disconnect` | lifecycle | reason string |
//! | `connect_error` | lifecycle | `{ "message": … }` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::{Value, json};

use crate::error::Result;
use crate::identifiers::DocumentId;

use super::document::Document;

// ============================================================================
// Event Names
// ============================================================================

/// Lifecycle: link established.
pub const CONNECT: &str = "connect";

/// Lifecycle: link lost or closed.
pub const DISCONNECT: &str = "disconnect";

/// Lifecycle: connect attempt failed.
pub const CONNECT_ERROR: &str = "connect_error";

/// Document created.
pub const NEW_DOCUMENT: &str = "newDocument";

/// Document changed.
pub const UPDATE_DOCUMENT: &str = "updateDocument";

/// Documents removed.
pub const DELETE_DOCUMENTS: &str = "deleteDocuments";

/// Names that cannot be emitted by the application.
pub const RESERVED_EVENTS: &[&str] = &[
    CONNECT,
    CONNECT_ERROR,
    DISCONNECT,
    "disconnecting",
    "newListener",
    "removeListener",
];

/// Returns `true` if `name` is reserved for lifecycle events.
#[inline]
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_EVENTS.contains(&name)
}

// ============================================================================
// DisconnectReason
// ============================================================================

/// Why a link went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// Server sent a namespace `DISCONNECT`.
    IoServerDisconnect,
    /// Local `disconnect()`.
    IoClientDisconnect,
    /// Transport closed (engine `close`, WebSocket close, stream end).
    TransportClose,
    /// Transport failed.
    TransportError,
    /// No heartbeat within the negotiated window.
    PingTimeout,
    /// Server sent something undecodable.
    ParseError,
}

impl DisconnectReason {
    /// Returns the Socket.IO reason string.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IoServerDisconnect => "io server disconnect",
            Self::IoClientDisconnect => "io client disconnect",
            Self::TransportClose => "transport close",
            Self::TransportError => "transport error",
            Self::PingTimeout => "ping timeout",
            Self::ParseError => "parse error",
        }
    }

    /// Returns `true` if the manager should go through the retry policy.
    ///
    /// A server disconnect reconnects immediately and a client
    /// disconnect never reconnects, so only transport-level losses count.
    #[inline]
    #[must_use]
    pub const fn is_transport_loss(&self) -> bool {
        !matches!(self, Self::IoServerDisconnect | Self::IoClientDisconnect)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ClientEvent
// ============================================================================

/// Events the dashboard sends to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A document was uploaded.
    NewDocument(Document),
    /// A document was edited.
    UpdateDocument(Document),
    /// Documents were deleted.
    DeleteDocuments(Vec<DocumentId>),
}

impl ClientEvent {
    /// Returns the wire event name.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NewDocument(_) => NEW_DOCUMENT,
            Self::UpdateDocument(_) => UPDATE_DOCUMENT,
            Self::DeleteDocuments(_) => DELETE_DOCUMENTS,
        }
    }

    /// Serializes the payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn payload(&self) -> Result<Value> {
        let value = match self {
            Self::NewDocument(doc) | Self::UpdateDocument(doc) => serde_json::to_value(doc)?,
            Self::DeleteDocuments(ids) => serde_json::to_value(ids)?,
        };
        Ok(value)
    }
}

// ============================================================================
// ServerEvent
// ============================================================================

/// Parsed inbound events.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Another client uploaded a document.
    DocumentCreated(Document),
    /// Another client edited a document.
    DocumentUpdated(Document),
    /// Another client deleted documents.
    DocumentsDeleted(Vec<DocumentId>),
    /// Anything else, or a known name with an unexpected payload.
    Unknown {
        /// Event name.
        name: String,
        /// Raw payload.
        payload: Value,
    },
}

impl ServerEvent {
    /// Parses an inbound event by name.
    #[must_use]
    pub fn parse(name: &str, payload: &Value) -> Self {
        let parsed = match name {
            NEW_DOCUMENT => serde_json::from_value(payload.clone())
                .ok()
                .map(Self::DocumentCreated),
            UPDATE_DOCUMENT => serde_json::from_value(payload.clone())
                .ok()
                .map(Self::DocumentUpdated),
            DELETE_DOCUMENTS => serde_json::from_value(payload.clone())
                .ok()
                .map(Self::DocumentsDeleted),
            _ => None,
        };

        parsed.unwrap_or_else(|| Self::Unknown {
            name: name.to_string(),
            payload: payload.clone(),
        })
    }
}

/// Payload delivered to `connect_error` listeners.
#[inline]
#[must_use]
pub(crate) fn connect_error_payload(message: &str) -> Value {
    json!({ "message": message })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved("connect"));
        assert!(is_reserved("disconnect"));
        assert!(is_reserved("connect_error"));
        assert!(!is_reserved("newDocument"));
    }

    #[test]
    fn test_disconnect_reason_strings() {
        assert_eq!(DisconnectReason::IoServerDisconnect.as_str(), "io server disconnect");
        assert_eq!(DisconnectReason::PingTimeout.to_string(), "ping timeout");
    }

    #[test]
    fn test_transport_loss_classification() {
        assert!(!DisconnectReason::IoServerDisconnect.is_transport_loss());
        assert!(!DisconnectReason::IoClientDisconnect.is_transport_loss());
        assert!(DisconnectReason::TransportClose.is_transport_loss());
        assert!(DisconnectReason::PingTimeout.is_transport_loss());
    }

    #[test]
    fn test_client_event_payloads() {
        let delete = ClientEvent::DeleteDocuments(vec!["1".into(), "2".into()]);
        assert_eq!(delete.name(), "deleteDocuments");
        assert_eq!(delete.payload().expect("payload"), json!(["1", "2"]));

        let create = ClientEvent::NewDocument(Document::new("5", "a.pdf"));
        assert_eq!(create.name(), "newDocument");
        assert_eq!(create.payload().expect("payload")["name"], "a.pdf");
    }

    #[test]
    fn test_server_event_parse_known() {
        let doc = Document::new("3", "b.pdf");
        let payload = serde_json::to_value(&doc).expect("serialize");

        match ServerEvent::parse("updateDocument", &payload) {
            ServerEvent::DocumentUpdated(parsed) => assert_eq!(parsed.id.as_str(), "3"),
            other => panic!("unexpected event: {other:?}"),
        }

        assert_eq!(
            ServerEvent::parse("deleteDocuments", &json!(["7"])),
            ServerEvent::DocumentsDeleted(vec!["7".into()])
        );
    }

    #[test]
    fn test_server_event_bad_payload_is_unknown() {
        let event = ServerEvent::parse("newDocument", &json!({ "id": 1 }));
        assert!(matches!(event, ServerEvent::Unknown { ref name, .. } if name == "newDocument"));

        let other = ServerEvent::parse("typing", &json!({ "user": "ana" }));
        assert!(matches!(other, ServerEvent::Unknown { .. }));
    }
}
