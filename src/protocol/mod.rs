//! Socket.IO protocol message types.
//!
//! This module defines the wire format spoken with the real-time
//! endpoint and the typed application events carried over it.
//!
//! # Protocol Overview
//!
//! | Layer | Unit | Purpose |
//! |-------|------|---------|
//! | Engine.IO v4 | `EnginePacket` | Session open/close, heartbeat, framing |
//! | Socket.IO v5 | `Packet` | Namespace connect, events, acks |
//! | Application | `ClientEvent` / `ServerEvent` | Document broadcasts |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `document` | Document payload model |
//! | `event` | Event names and typed events |
//! | `packet` | Engine.IO / Socket.IO codec |

// ============================================================================
// Submodules
// ============================================================================

/// Document payload model.
pub mod document;

/// Event names and typed events.
pub mod event;

/// Engine.IO / Socket.IO packet codec.
pub mod packet;

// ============================================================================
// Re-exports
// ============================================================================

pub use document::{
    Analytics, AuditEvent, AuditLog, DeviceCount, Document, DocumentStatus, LocationViews,
    Protection, QaItem, QaSettings, Sharing, SharingType,
};
pub use event::{ClientEvent, DisconnectReason, ServerEvent, is_reserved};
pub use packet::{EnginePacket, Handshake, Packet, PacketType};
