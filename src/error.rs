//! Error types for the real-time connection layer.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! Fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use docshare_realtime::{ConnectionManager, Result};
//!
//! async fn example(manager: &ConnectionManager) -> Result<()> {
//!     let reply = manager
//!         .emit_with_ack("updateDocument", &doc, Duration::from_secs(5))
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! Connection failures are normally absorbed by the manager's retry
//! policy; they surface here only from configuration, acknowledgement
//! requests, and the transport itself.
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::ConnectRejected`], [`Error::NotConnected`] |
//! | Protocol | [`Error::Protocol`], [`Error::ReservedEvent`], [`Error::AckTimeout`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::AckId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when manager configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connect attempt did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Link closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Server refused the namespace connection (`CONNECT_ERROR`).
    #[error("Connection rejected by server: {message}")]
    ConnectRejected {
        /// Message supplied by the server.
        message: String,
    },

    /// Operation requires a live connection.
    #[error("Not connected")]
    NotConnected,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed or unsupported packet.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Attempt to emit a name the protocol reserves for lifecycle events.
    #[error("\"{name}\" is a reserved event name")]
    ReservedEvent {
        /// The reserved name.
        name: String,
    },

    /// Server did not acknowledge an event in time.
    #[error("Acknowledgement {ack_id} timed out after {timeout_ms}ms")]
    AckTimeout {
        /// The ack id that timed out.
        ack_id: AckId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket handshake or I/O failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Endpoint URL could not be parsed.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a connect-rejected error.
    #[inline]
    pub fn connect_rejected(message: impl Into<String>) -> Self {
        Self::ConnectRejected {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a reserved event error.
    #[inline]
    pub fn reserved_event(name: impl Into<String>) -> Self {
        Self::ReservedEvent { name: name.into() }
    }

    /// Creates an ack timeout error.
    #[inline]
    pub fn ack_timeout(ack_id: AckId, timeout_ms: u64) -> Self {
        Self::AckTimeout { ack_id, timeout_ms }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::ConnectRejected { .. }
                | Self::NotConnected
                | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_reserved_event_display() {
        let err = Error::reserved_event("connect");
        assert_eq!(err.to_string(), "\"connect\" is a reserved event name");
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("x").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::connect_rejected("unauthorized").is_connection_error());
        assert!(!Error::config("x").is_connection_error());
        assert!(!Error::protocol("x").is_connection_error());
    }

    #[test]
    fn test_from_url_error() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = url_err.into();
        assert!(matches!(err, Error::Url(_)));
    }
}
