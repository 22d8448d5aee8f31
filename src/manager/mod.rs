//! Connection manager.
//!
//! Owns one real-time connection: dials, joins the namespace, retries
//! with capped exponential backoff, and routes events both ways.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ConnectionManager`] | Cloneable handle onto the event loop |
//! | [`ManagerBuilder`] | Fluent configuration builder |
//! | [`ManagerConfig`] | Endpoint and retry policy |
//! | [`BackoffPolicy`] | Retry ceiling and delay formula |
//! | [`ConnectionState`] | Current state (watch channel) |
//! | [`ConnectionEvent`] | Transitions (broadcast channel) |
//! | [`Subscription`] | Listener registration handle |
//!
//! # Example
//!
//! ```ignore
//! use docshare_realtime::{ConnectionManager, Result};
//!
//! # async fn example() -> Result<()> {
//! let manager = ConnectionManager::builder()
//!     .url("http://localhost:3001")
//!     .build()?;
//!
//! let sub = manager.on("deleteDocuments", |ids| println!("deleted {ids}"));
//! manager.connect();
//! manager.wait_connected(std::time::Duration::from_secs(5)).await?;
//!
//! sub.unsubscribe();
//! manager.dispose();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Backoff formula and retry decisions.
pub mod backoff;

/// Fluent builder.
pub mod builder;

/// Manager configuration.
pub mod config;

/// Public handle.
pub mod core;

/// Event loop task.
mod event_loop;

/// Connect attempt.
mod handshake;

/// Listener registry.
pub mod listeners;

/// Connection state and lifecycle events.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::{BackoffPolicy, RetryDecision};
pub use builder::ManagerBuilder;
pub use config::ManagerConfig;
pub use core::ConnectionManager;
pub use listeners::{AnyCallback, EventCallback, ListenerRegistry, Subscription};
pub use state::{ConnectionEvent, ConnectionState};
