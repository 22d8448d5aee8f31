//! Connection state and lifecycle events.
//!
//! [`ConnectionState`] is the latest snapshot, published on a watch
//! channel. [`ConnectionEvent`] is the transition log, published on a
//! broadcast channel.
//!
//! ```text
//!                 connect()
//! Disconnected ────────────► Connecting ──────► Connected
//!      ▲                       │    ▲               │
//!      │ disconnect()          │    │ timer         │ transport loss
//!      │                 error ▼    │               ▼
//!      └──────────────────── Retrying ◄─────────────┘
//!                              │
//!                              │ ceiling reached
//!                              ▼
//!                            Failed
//! ```

use std::fmt;
use std::time::Duration;

use crate::identifiers::SessionId;
use crate::protocol::DisconnectReason;

// ============================================================================
// ConnectionState
// ============================================================================

/// Where the manager currently is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Idle. Initial state, and the state after `disconnect()`.
    #[default]
    Disconnected,

    /// A connect attempt is in flight.
    Connecting,

    /// Namespace joined.
    Connected {
        /// Socket session id assigned by the server.
        sid: SessionId,
    },

    /// Waiting out a backoff delay before the next attempt.
    Retrying {
        /// Consecutive failures so far.
        attempt: u32,
        /// Length of the pending delay.
        delay: Duration,
    },

    /// Retry ceiling reached. Only `connect()` leaves this state.
    Failed {
        /// Consecutive failures.
        attempts: u32,
    },
}

impl ConnectionState {
    /// Returns `true` when connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Returns `true` when retries are exhausted.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns `true` when idle.
    #[inline]
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Returns `true` while a retry timer is pending.
    #[inline]
    #[must_use]
    pub fn is_retrying(&self) -> bool {
        matches!(self, Self::Retrying { .. })
    }

    /// Session id while connected.
    #[inline]
    #[must_use]
    pub fn sid(&self) -> Option<&SessionId> {
        match self {
            Self::Connected { sid } => Some(sid),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected { sid } => write!(f, "connected ({sid})"),
            Self::Retrying { attempt, delay } => {
                write!(f, "retrying (attempt {attempt}, in {}ms)", delay.as_millis())
            }
            Self::Failed { attempts } => write!(f, "failed after {attempts} attempts"),
        }
    }
}

// ============================================================================
// ConnectionEvent
// ============================================================================

/// A lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Connect attempt started.
    Connecting,

    /// Namespace joined.
    Connected {
        /// Socket session id.
        sid: SessionId,
    },

    /// Live link went down.
    Disconnected {
        /// Why.
        reason: DisconnectReason,
    },

    /// Connect attempt failed.
    ConnectError {
        /// Consecutive failures including this one.
        attempt: u32,
        /// Error description.
        message: String,
    },

    /// Retry timer armed.
    RetryScheduled {
        /// Consecutive failures so far.
        attempt: u32,
        /// Delay until the next attempt.
        delay: Duration,
    },

    /// Gave up.
    RetriesExhausted {
        /// Consecutive failures.
        attempts: u32,
    },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disconnected() {
        let state = ConnectionState::default();
        assert!(state.is_disconnected());
        assert!(!state.is_connected());
        assert!(state.sid().is_none());
    }

    #[test]
    fn test_predicates() {
        let connected = ConnectionState::Connected {
            sid: SessionId::new("abc"),
        };
        assert!(connected.is_connected());
        assert_eq!(connected.sid().map(SessionId::as_str), Some("abc"));

        let retrying = ConnectionState::Retrying {
            attempt: 2,
            delay: Duration::from_secs(4),
        };
        assert!(retrying.is_retrying());
        assert!(!retrying.is_connected());

        let failed = ConnectionState::Failed { attempts: 5 };
        assert!(failed.is_terminal());
        assert!(!failed.is_retrying());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ConnectionState::Retrying {
                attempt: 3,
                delay: Duration::from_millis(8000)
            }
            .to_string(),
            "retrying (attempt 3, in 8000ms)"
        );
        assert_eq!(
            ConnectionState::Failed { attempts: 5 }.to_string(),
            "failed after 5 attempts"
        );
    }
}
