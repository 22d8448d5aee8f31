//! Docshare Realtime - Socket.IO connection manager for the document dashboard.
//!
//! This library keeps one persistent connection to the dashboard's
//! real-time endpoint, retries it with capped exponential backoff, and
//! offers typed emit/listen helpers for document events.
//!
//! # Architecture
//!
//! - **Handle**: [`ConnectionManager`] is cheap to clone and never blocks
//! - **Event loop**: one task owns the link, retry timer and counters
//! - **Transport**: a [`Transport`](transport::Transport) dials and hands back a frame link
//!
//! Key design principles:
//!
//! - Every manager owns its own state; nothing is process-global
//! - Emits while offline are dropped and logged, never queued
//! - `connect()`/`disconnect()` return immediately; observe outcomes via
//!   [`ConnectionManager::watch_state`] or [`ConnectionManager::events`]
//!
//! # Quick Start
//!
//! ```ignore
//! use docshare_realtime::{ClientEvent, ConnectionManager, Document, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = ConnectionManager::builder()
//!         .url("http://localhost:3001")
//!         .build()?;
//!
//!     manager.on("newDocument", |doc| println!("new document: {doc}"));
//!     manager.connect();
//!     manager.wait_connected(std::time::Duration::from_secs(10)).await?;
//!
//!     manager.emit_event(&ClientEvent::NewDocument(Document::new("d-1", "Deck.pdf")));
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`manager`] | Connection manager, config, backoff, listeners |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Engine.IO/Socket.IO codec and document events |
//! | [`transport`] | WebSocket and in-memory transports |
//!
//! # Logging
//!
//! The crate logs through `tracing` and never installs a subscriber.

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Connection manager.
///
/// Use [`ConnectionManager::builder()`] to create a configured manager.
pub mod manager;

/// Wire protocol and application events.
pub mod protocol;

/// Transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{AckId, DocumentId, ListenerId, SessionId};

// Manager types
pub use manager::{
    BackoffPolicy, ConnectionEvent, ConnectionManager, ConnectionState, ManagerBuilder,
    ManagerConfig, RetryDecision, Subscription,
};

// Protocol types
pub use protocol::{ClientEvent, DisconnectReason, Document, ServerEvent};
