//! Builder pattern for manager configuration.
//!
//! Provides a fluent API for configuring and creating
//! [`ConnectionManager`] instances.
//!
//! # Example
//!
//! ```ignore
//! use docshare_realtime::ConnectionManager;
//!
//! let manager = ConnectionManager::builder()
//!     .url("http://localhost:3001")
//!     .max_retries(5)
//!     .on_connect(|_| tracing::info!("live"))
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::Result;
use crate::protocol::event::{CONNECT, CONNECT_ERROR, DISCONNECT};
use crate::transport::{Transport, WebSocketTransport};

use super::config::ManagerConfig;
use super::core::ConnectionManager;
use super::listeners::EventCallback;

// ============================================================================
// ManagerBuilder
// ============================================================================

/// Builder for configuring a [`ConnectionManager`].
///
/// Use [`ConnectionManager::builder()`] to create a new builder.
#[derive(Default)]
pub struct ManagerBuilder {
    /// Endpoint and retry policy.
    config: ManagerConfig,
    /// Transport override; WebSocket when unset.
    transport: Option<Arc<dyn Transport>>,
    /// Listeners registered before the event loop starts.
    listeners: Vec<(String, EventCallback)>,
}

impl fmt::Debug for ManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.transport.is_some())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

// ============================================================================
// ManagerBuilder Implementation
// ============================================================================

impl ManagerBuilder {
    /// Creates a builder with default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Sets the Socket.IO request path.
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Sets the namespace.
    #[inline]
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// Sets the retry ceiling.
    #[inline]
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Sets the backoff unit.
    #[inline]
    #[must_use]
    pub fn initial_retry_delay(mut self, delay: Duration) -> Self {
        self.config.initial_retry_delay = delay;
        self
    }

    /// Sets the backoff cap.
    #[inline]
    #[must_use]
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.config.max_retry_delay = delay;
        self
    }

    /// Sets the connect attempt timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Enables or disables automatic retries.
    #[inline]
    #[must_use]
    pub fn reconnection(mut self, enabled: bool) -> Self {
        self.config.reconnection = enabled;
        self
    }

    /// Connects as soon as the manager is built.
    #[inline]
    #[must_use]
    pub fn auto_connect(mut self, enabled: bool) -> Self {
        self.config.auto_connect = enabled;
        self
    }

    /// Sets the auth payload sent on namespace connect.
    #[inline]
    #[must_use]
    pub fn auth(mut self, auth: Value) -> Self {
        self.config.auth = Some(auth);
        self
    }

    /// Uses a custom transport instead of WebSocket.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Registers a listener before the manager starts.
    #[must_use]
    pub fn on<F>(mut self, name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.listeners.push((name.into(), Arc::new(callback)));
        self
    }

    /// Registers a `connect` listener.
    #[inline]
    #[must_use]
    pub fn on_connect<F>(self, callback: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on(CONNECT, callback)
    }

    /// Registers a `disconnect` listener; the payload is the reason string.
    #[inline]
    #[must_use]
    pub fn on_disconnect<F>(self, callback: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on(DISCONNECT, callback)
    }

    /// Registers a `connect_error` listener; the payload is `{ "message": … }`.
    #[inline]
    #[must_use]
    pub fn on_connect_error<F>(self, callback: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on(CONNECT_ERROR, callback)
    }

    /// Validates the configuration and starts the manager.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) or
    /// [`Error::Url`](crate::Error::Url) if the configuration is invalid.
    pub fn build(self) -> Result<ConnectionManager> {
        self.config.validate()?;

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WebSocketTransport::new()));

        ConnectionManager::start(self.config, transport, self.listeners)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::Error;
    use crate::transport::MemoryTransport;

    #[test]
    fn test_builder_sets_config() {
        let builder = ManagerBuilder::new()
            .url("https://rt.example.com")
            .namespace("/docs")
            .max_retries(3)
            .initial_retry_delay(Duration::from_millis(250))
            .max_retry_delay(Duration::from_secs(2))
            .connect_timeout(Duration::from_secs(5))
            .reconnection(false)
            .auto_connect(true);

        assert_eq!(builder.config.url, "https://rt.example.com");
        assert_eq!(builder.config.namespace, "/docs");
        assert_eq!(builder.config.max_retries, 3);
        assert!(!builder.config.reconnection);
        assert!(builder.config.auto_connect);
    }

    #[test]
    fn test_builder_collects_listeners() {
        let builder = ManagerBuilder::new()
            .on_connect(|_| {})
            .on_disconnect(|_| {})
            .on("newDocument", |_| {});

        let names: Vec<&str> = builder.listeners.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["connect", "disconnect", "newDocument"]);
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let (transport, _server) = MemoryTransport::new();
        let result = ManagerBuilder::new()
            .transport(transport)
            .max_retries(0)
            .build();

        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
