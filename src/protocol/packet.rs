//! Engine.IO and Socket.IO packet codec.
//!
//! Every WebSocket text frame is one Engine.IO packet: a single type
//! digit followed by an optional payload. Engine `message` packets carry
//! one Socket.IO packet.
//!
//! # Engine.IO (v4)
//!
//! | Digit | Packet | Payload |
//! |-------|--------|---------|
//! | `0` | open | JSON handshake |
//! | `1` | close | - |
//! | `2` | ping | - |
//! | `3` | pong | - |
//! | `4` | message | Socket.IO packet |
//! | `5` | upgrade | - |
//! | `6` | noop | - |
//!
//! # Socket.IO (v5)
//!
//! ```text
//! <type>[<namespace>,][<ack id>][<json data>]
//! ```
//!
//! e.g. `2["updateDocument",{"id":"1"}]`, `2/admin,13["ping"]`, `313[true]`.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::AckId;

// ============================================================================
// Constants
// ============================================================================

/// Engine.IO protocol revision sent in the `EIO` query parameter.
pub const ENGINE_PROTOCOL: u8 = 4;

/// Default namespace.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Default `maxPayload` when the handshake omits it.
const DEFAULT_MAX_PAYLOAD: u64 = 1_000_000;

// ============================================================================
// Handshake
// ============================================================================

/// Payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine session id.
    pub sid: String,

    /// Transports the server offers to upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,

    /// Server ping interval in milliseconds.
    pub ping_interval: u64,

    /// Grace period after a missed ping in milliseconds.
    pub ping_timeout: u64,

    /// Largest payload the server accepts.
    #[serde(default = "default_max_payload")]
    pub max_payload: u64,
}

fn default_max_payload() -> u64 {
    DEFAULT_MAX_PAYLOAD
}

impl Handshake {
    /// Maximum silence tolerated before the link is considered dead.
    #[inline]
    #[must_use]
    pub fn heartbeat_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

// ============================================================================
// EnginePacket
// ============================================================================

/// One Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    /// Session opened.
    Open(Handshake),
    /// Session closed by the server.
    Close,
    /// Server heartbeat.
    Ping,
    /// Heartbeat reply.
    Pong,
    /// Carries one Socket.IO packet.
    Message(String),
    /// Transport upgrade (unused on a pure WebSocket session).
    Upgrade,
    /// No operation.
    Noop,
}

impl EnginePacket {
    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] on an empty frame, an unknown type
    /// digit, or a malformed handshake.
    pub fn decode(frame: &str) -> Result<Self> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::protocol("empty engine frame"))?;
        let body = chars.as_str();

        match kind {
            '0' => {
                let handshake: Handshake = serde_json::from_str(body)
                    .map_err(|e| Error::protocol(format!("invalid handshake: {e}")))?;
                Ok(Self::Open(handshake))
            }
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping),
            '3' => Ok(Self::Pong),
            '4' => Ok(Self::Message(body.to_string())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(Error::protocol(format!(
                "unknown engine packet type: {other}"
            ))),
        }
    }

    /// Encodes the packet as a text frame.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Open(handshake) => {
                // Handshake only holds strings and integers.
                let json = serde_json::to_string(handshake).unwrap_or_default();
                format!("0{json}")
            }
            Self::Close => "1".to_string(),
            Self::Ping => "2".to_string(),
            Self::Pong => "3".to_string(),
            Self::Message(payload) => format!("4{payload}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

// ============================================================================
// PacketType
// ============================================================================

/// Socket.IO packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Namespace connect request / confirmation.
    Connect,
    /// Namespace disconnect.
    Disconnect,
    /// Named event.
    Event,
    /// Acknowledgement of an event.
    Ack,
    /// Namespace connect refused.
    ConnectError,
    /// Event with binary attachments.
    BinaryEvent,
    /// Ack with binary attachments.
    BinaryAck,
}

impl PacketType {
    /// Returns the wire digit.
    #[inline]
    #[must_use]
    pub const fn as_digit(self) -> char {
        match self {
            Self::Connect => '0',
            Self::Disconnect => '1',
            Self::Event => '2',
            Self::Ack => '3',
            Self::ConnectError => '4',
            Self::BinaryEvent => '5',
            Self::BinaryAck => '6',
        }
    }

    /// Parses a wire digit.
    #[inline]
    #[must_use]
    pub const fn from_digit(digit: char) -> Option<Self> {
        match digit {
            '0' => Some(Self::Connect),
            '1' => Some(Self::Disconnect),
            '2' => Some(Self::Event),
            '3' => Some(Self::Ack),
            '4' => Some(Self::ConnectError),
            '5' => Some(Self::BinaryEvent),
            '6' => Some(Self::BinaryAck),
            _ => None,
        }
    }
}

// ============================================================================
// Packet
// ============================================================================

/// One Socket.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Packet type.
    pub packet_type: PacketType,
    /// Target namespace.
    pub namespace: String,
    /// Acknowledgement id, if any.
    pub ack_id: Option<AckId>,
    /// JSON data, if any.
    pub data: Option<Value>,
}

impl Packet {
    /// Creates a namespace `CONNECT` packet with optional auth payload.
    #[must_use]
    pub fn connect(namespace: impl Into<String>, auth: Option<Value>) -> Self {
        Self {
            packet_type: PacketType::Connect,
            namespace: namespace.into(),
            ack_id: None,
            data: auth,
        }
    }

    /// Creates a namespace `DISCONNECT` packet.
    #[must_use]
    pub fn disconnect(namespace: impl Into<String>) -> Self {
        Self {
            packet_type: PacketType::Disconnect,
            namespace: namespace.into(),
            ack_id: None,
            data: None,
        }
    }

    /// Creates a `CONNECT_ERROR` packet carrying `{ "message": … }`.
    #[must_use]
    pub fn connect_error(namespace: impl Into<String>, message: &str) -> Self {
        Self {
            packet_type: PacketType::ConnectError,
            namespace: namespace.into(),
            ack_id: None,
            data: Some(serde_json::json!({ "message": message })),
        }
    }

    /// Creates an `EVENT` packet: `[name, payload]`.
    #[must_use]
    pub fn event(
        namespace: impl Into<String>,
        name: &str,
        payload: Value,
        ack_id: Option<AckId>,
    ) -> Self {
        Self {
            packet_type: PacketType::Event,
            namespace: namespace.into(),
            ack_id,
            data: Some(Value::Array(vec![Value::String(name.to_string()), payload])),
        }
    }

    /// Creates an `ACK` packet.
    #[must_use]
    pub fn ack(namespace: impl Into<String>, ack_id: AckId, args: Vec<Value>) -> Self {
        Self {
            packet_type: PacketType::Ack,
            namespace: namespace.into(),
            ack_id: Some(ack_id),
            data: Some(Value::Array(args)),
        }
    }

    /// Encodes the packet without the engine prefix.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.packet_type.as_digit());

        if self.namespace != DEFAULT_NAMESPACE {
            out.push_str(&self.namespace);
            out.push(',');
        }

        if let Some(id) = self.ack_id {
            out.push_str(&id.to_string());
        }

        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }

        out
    }

    /// Encodes the packet as a full engine `message` frame.
    #[inline]
    #[must_use]
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }

    /// Decodes a Socket.IO packet (engine prefix already stripped).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for unknown or binary packet types,
    /// invalid JSON, or data that does not fit the packet type.
    pub fn decode(input: &str) -> Result<Self> {
        let mut chars = input.chars();
        let digit = chars
            .next()
            .ok_or_else(|| Error::protocol("empty socket packet"))?;
        let packet_type = PacketType::from_digit(digit)
            .ok_or_else(|| Error::protocol(format!("unknown socket packet type: {digit}")))?;

        if matches!(packet_type, PacketType::BinaryEvent | PacketType::BinaryAck) {
            return Err(Error::protocol("binary packets are not supported"));
        }

        let mut rest = chars.as_str();

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(end) => {
                    let ns = &rest[..end];
                    rest = &rest[end + 1..];
                    ns.to_string()
                }
                None => {
                    let ns = rest.to_string();
                    rest = "";
                    ns
                }
            }
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack_id = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|e| Error::protocol(format!("invalid ack id: {e}")))?;
            rest = &rest[digits..];
            Some(AckId::new(id))
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<Value>(rest)
                    .map_err(|e| Error::protocol(format!("invalid packet data: {e}")))?,
            )
        };

        let packet = Self {
            packet_type,
            namespace,
            ack_id,
            data,
        };
        packet.validate()?;
        Ok(packet)
    }

    /// Checks the data shape against the packet type.
    fn validate(&self) -> Result<()> {
        let valid = match (self.packet_type, &self.data) {
            (PacketType::Connect, None | Some(Value::Object(_))) => true,
            (PacketType::Disconnect, None) => true,
            (PacketType::ConnectError, Some(Value::Object(_) | Value::String(_))) => true,
            (PacketType::Event, Some(Value::Array(items))) => {
                matches!(items.first(), Some(Value::String(name)) if !name.is_empty())
            }
            (PacketType::Ack, Some(Value::Array(_))) => self.ack_id.is_some(),
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(Error::protocol(format!(
                "invalid payload for {:?} packet",
                self.packet_type
            )))
        }
    }

    /// Splits an `EVENT` packet into its name and payload.
    ///
    /// A single argument is returned as-is; none becomes `null`, several
    /// become an array.
    #[must_use]
    pub fn event_parts(&self) -> Option<(&str, Value)> {
        if self.packet_type != PacketType::Event {
            return None;
        }

        let items = self.data.as_ref()?.as_array()?;
        let name = items.first()?.as_str()?;

        Some((name, collapse_args(&items[1..])))
    }

    /// Returns the reply carried by an `ACK` packet, collapsed like
    /// [`event_parts`](Self::event_parts).
    #[must_use]
    pub fn ack_payload(&self) -> Option<Value> {
        if self.packet_type != PacketType::Ack {
            return None;
        }
        let items = self.data.as_ref()?.as_array()?;
        Some(collapse_args(items))
    }

    /// Returns the message carried by a `CONNECT_ERROR` packet.
    #[must_use]
    pub fn connect_error_message(&self) -> Option<String> {
        if self.packet_type != PacketType::ConnectError {
            return None;
        }

        match self.data.as_ref()? {
            Value::String(message) => Some(message.clone()),
            Value::Object(map) => Some(
                map.get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("connect error")
                    .to_string(),
            ),
            _ => None,
        }
    }

    /// Returns the session id carried by a `CONNECT` confirmation.
    #[must_use]
    pub fn connect_sid(&self) -> Option<&str> {
        if self.packet_type != PacketType::Connect {
            return None;
        }
        self.data.as_ref()?.get("sid")?.as_str()
    }
}

fn collapse_args(args: &[Value]) -> Value {
    match args {
        [] => Value::Null,
        [single] => single.clone(),
        many => Value::Array(many.to_vec()),
    }
}

// ============================================================================
// Tests
// ============================================================================
