//! Connection manager configuration.
//!
//! [`ManagerConfig`] carries the endpoint and the retry policy. Defaults
//! match the dashboard: `http://localhost:3001`, 5 retries, 1 s initial
//! delay capped at 10 s, 20 s connect timeout.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use docshare_realtime::ManagerConfig;
//!
//! let config = ManagerConfig::new()
//!     .with_url("https://realtime.example.com")
//!     .with_max_retries(8)
//!     .with_max_retry_delay(Duration::from_secs(30));
//!
//! config.validate()?;
//! ```
//!
//! # Environment
//!
//! | Variable | Field |
//! |----------|-------|
//! | `SOCKET_URL` | `url` |
//! | `SOCKET_PATH` | `path` |
//! | `SOCKET_MAX_RETRIES` | `max_retries` |
//! | `SOCKET_RETRY_DELAY_MS` | `initial_retry_delay` |
//! | `SOCKET_RETRY_DELAY_MAX_MS` | `max_retry_delay` |
//! | `SOCKET_TIMEOUT_MS` | `connect_timeout` |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::packet::{DEFAULT_NAMESPACE, ENGINE_PROTOCOL};

use super::backoff::BackoffPolicy;

// ============================================================================
// Constants
// ============================================================================

/// Default endpoint.
pub const DEFAULT_URL: &str = "http://localhost:3001";

/// Default Socket.IO request path.
pub const DEFAULT_PATH: &str = "/socket.io/";

/// Default retry ceiling.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default first backoff unit.
pub const DEFAULT_INITIAL_RETRY_DELAY: Duration = Duration::from_millis(1_000);

/// Default backoff cap.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_millis(10_000);

/// Default connect attempt timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(20_000);

const ENV_URL: &str = "SOCKET_URL";
const ENV_URL_PUBLIC: &str = "NEXT_PUBLIC_SOCKET_URL";
const ENV_PATH: &str = "SOCKET_PATH";
const ENV_MAX_RETRIES: &str = "SOCKET_MAX_RETRIES";
const ENV_RETRY_DELAY_MS: &str = "SOCKET_RETRY_DELAY_MS";
const ENV_RETRY_DELAY_MAX_MS: &str = "SOCKET_RETRY_DELAY_MAX_MS";
const ENV_TIMEOUT_MS: &str = "SOCKET_TIMEOUT_MS";

// ============================================================================
// ManagerConfig
// ============================================================================

/// Endpoint, namespace and retry policy for a [`ConnectionManager`](super::ConnectionManager).
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Endpoint (`http`, `https`, `ws` or `wss`).
    pub url: String,

    /// Socket.IO request path.
    pub path: String,

    /// Namespace to join. `/` defers to a path in `url`, if any.
    pub namespace: String,

    /// Consecutive failures before giving up.
    pub max_retries: u32,

    /// Backoff unit; retry N waits `initial_retry_delay * 2^N`.
    pub initial_retry_delay: Duration,

    /// Backoff cap.
    pub max_retry_delay: Duration,

    /// Upper bound on one connect attempt, handshake included.
    pub connect_timeout: Duration,

    /// Retry automatically after failures.
    pub reconnection: bool,

    /// Connect as soon as the manager is built.
    pub auto_connect: bool,

    /// Payload sent with the namespace `CONNECT`.
    pub auth: Option<Value>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            path: DEFAULT_PATH.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            initial_retry_delay: DEFAULT_INITIAL_RETRY_DELAY,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnection: true,
            auto_connect: false,
            auth: None,
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ManagerConfig {
    /// Creates a configuration with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads overrides through `lookup`, starting from the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a numeric value does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        let url = lookup(ENV_URL)
            .filter(|v| !v.trim().is_empty())
            .or_else(|| lookup(ENV_URL_PUBLIC).filter(|v| !v.trim().is_empty()));
        if let Some(url) = url {
            config.url = url.trim().to_string();
        }
        if let Some(path) = lookup(ENV_PATH).filter(|v| !v.trim().is_empty()) {
            config.path = path.trim().to_string();
        }
        if let Some(retries) = lookup(ENV_MAX_RETRIES) {
            config.max_retries = parse_number(ENV_MAX_RETRIES, &retries)?;
        }
        if let Some(ms) = lookup(ENV_RETRY_DELAY_MS) {
            config.initial_retry_delay = Duration::from_millis(parse_number(ENV_RETRY_DELAY_MS, &ms)?);
        }
        if let Some(ms) = lookup(ENV_RETRY_DELAY_MAX_MS) {
            config.max_retry_delay =
                Duration::from_millis(parse_number(ENV_RETRY_DELAY_MAX_MS, &ms)?);
        }
        if let Some(ms) = lookup(ENV_TIMEOUT_MS) {
            config.connect_timeout = Duration::from_millis(parse_number(ENV_TIMEOUT_MS, &ms)?);
        }

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| Error::config(format!("{key}={raw:?} is not a valid number: {e}")))
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ManagerConfig {
    /// Sets the endpoint.
    #[inline]
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the Socket.IO request path.
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the namespace.
    #[inline]
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the retry ceiling.
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the backoff unit.
    #[inline]
    #[must_use]
    pub fn with_initial_retry_delay(mut self, delay: Duration) -> Self {
        self.initial_retry_delay = delay;
        self
    }

    /// Sets the backoff cap.
    #[inline]
    #[must_use]
    pub fn with_max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = delay;
        self
    }

    /// Sets the connect attempt timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enables or disables automatic retries.
    #[inline]
    #[must_use]
    pub fn with_reconnection(mut self, enabled: bool) -> Self {
        self.reconnection = enabled;
        self
    }

    /// Connects on build.
    #[inline]
    #[must_use]
    pub fn with_auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    /// Sets the auth payload sent on namespace connect.
    #[inline]
    #[must_use]
    pub fn with_auth(mut self, auth: Value) -> Self {
        self.auth = Some(auth);
        self
    }
}

// ============================================================================
// Derived Values
// ============================================================================

impl ManagerConfig {
    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] or [`Error::Url`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        self.endpoint_url()?;

        if !self.namespace.starts_with('/') {
            return Err(Error::config(format!(
                "namespace must start with '/': {:?}",
                self.namespace
            )));
        }
        if self.max_retries == 0 {
            return Err(Error::config("max_retries must be at least 1"));
        }
        if self.initial_retry_delay.is_zero() {
            return Err(Error::config("initial_retry_delay must be non-zero"));
        }
        if self.initial_retry_delay > self.max_retry_delay {
            return Err(Error::config(format!(
                "initial_retry_delay ({}ms) exceeds max_retry_delay ({}ms)",
                self.initial_retry_delay.as_millis(),
                self.max_retry_delay.as_millis()
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect_timeout must be non-zero"));
        }

        Ok(())
    }

    /// WebSocket URL to dial: `ws(s)://host[:port]{path}?EIO=4&transport=websocket`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if `url` does not parse, or [`Error::Config`]
    /// for an unsupported scheme.
    pub fn endpoint_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(Error::config(format!(
                    "unsupported URL scheme {other:?}; expected http, https, ws or wss"
                )));
            }
        };

        url.set_scheme(scheme)
            .map_err(|()| Error::config(format!("cannot use scheme {scheme} for {}", self.url)))?;

        let path = if self.path.ends_with('/') {
            self.path.clone()
        } else {
            format!("{}/", self.path)
        };
        url.set_path(&path);
        url.set_fragment(None);
        url.query_pairs_mut()
            .clear()
            .append_pair("EIO", &ENGINE_PROTOCOL.to_string())
            .append_pair("transport", "websocket");

        Ok(url)
    }

    /// Namespace to join.
    ///
    /// An explicit namespace wins; otherwise a path on `url`
    /// (`http://host/admin`) names it.
    #[must_use]
    pub fn resolved_namespace(&self) -> String {
        if self.namespace != DEFAULT_NAMESPACE {
            return self.namespace.clone();
        }

        Url::parse(&self.url)
            .ok()
            .map(|url| url.path().trim_end_matches('/').to_string())
            .filter(|path| !path.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    /// Retry policy.
    #[inline]
    #[must_use]
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.max_retries,
            self.initial_retry_delay,
            self.max_retry_delay,
        )
        .with_enabled(self.reconnection)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.url, "http://localhost:3001");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_retry_delay, Duration::from_millis(1000));
        assert_eq!(config.max_retry_delay, Duration::from_millis(10_000));
        assert_eq!(config.connect_timeout, Duration::from_millis(20_000));
        assert!(config.reconnection);
        assert!(!config.auto_connect);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_url_http() {
        let url = ManagerConfig::default().endpoint_url().expect("url");
        assert_eq!(
            url.as_str(),
            "ws://localhost:3001/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_endpoint_url_https_custom_path() {
        let url = ManagerConfig::new()
            .with_url("https://rt.example.com/admin")
            .with_path("/realtime")
            .endpoint_url()
            .expect("url");
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/realtime/");
        assert_eq!(url.query(), Some("EIO=4&transport=websocket"));
    }

    #[test]
    fn test_endpoint_url_rejects_scheme() {
        let err = ManagerConfig::new()
            .with_url("ftp://example.com")
            .endpoint_url()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = ManagerConfig::new().with_url("not a url").endpoint_url().unwrap_err();
        assert!(matches!(err, Error::Url(_)));
    }

    #[test]
    fn test_resolved_namespace() {
        assert_eq!(ManagerConfig::default().resolved_namespace(), "/");
        assert_eq!(
            ManagerConfig::new()
                .with_url("http://localhost:3001/documents")
                .resolved_namespace(),
            "/documents"
        );
        assert_eq!(
            ManagerConfig::new()
                .with_url("http://localhost:3001/documents")
                .with_namespace("/admin")
                .resolved_namespace(),
            "/admin"
        );
    }

    #[test]
    fn test_validate_rejects_bad_policy() {
        assert!(ManagerConfig::new().with_max_retries(0).validate().is_err());
        assert!(
            ManagerConfig::new()
                .with_initial_retry_delay(Duration::from_secs(20))
                .validate()
                .is_err()
        );
        assert!(
            ManagerConfig::new()
                .with_connect_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(ManagerConfig::new().with_namespace("admin").validate().is_err());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ManagerConfig::from_lookup(lookup(&[
            ("SOCKET_URL", "https://rt.example.com"),
            ("SOCKET_MAX_RETRIES", "8"),
            ("SOCKET_RETRY_DELAY_MS", "500"),
            ("SOCKET_RETRY_DELAY_MAX_MS", "30000"),
            ("SOCKET_TIMEOUT_MS", "5000"),
        ]))
        .expect("config");

        assert_eq!(config.url, "https://rt.example.com");
        assert_eq!(config.max_retries, 8);
        assert_eq!(config.initial_retry_delay, Duration::from_millis(500));
        assert_eq!(config.max_retry_delay, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.path, DEFAULT_PATH);
    }

    #[test]
    fn test_from_lookup_empty_url_keeps_default() {
        let config = ManagerConfig::from_lookup(lookup(&[("SOCKET_URL", "  ")])).expect("config");
        assert_eq!(config.url, DEFAULT_URL);
    }

    #[test]
    fn test_from_lookup_public_url_fallback() {
        let config = ManagerConfig::from_lookup(lookup(&[(
            "NEXT_PUBLIC_SOCKET_URL",
            "https://dash.example.com",
        )]))
        .expect("config");
        assert_eq!(config.url, "https://dash.example.com");

        let config = ManagerConfig::from_lookup(lookup(&[
            ("SOCKET_URL", "http://rt.internal:3001"),
            ("NEXT_PUBLIC_SOCKET_URL", "https://dash.example.com"),
        ]))
        .expect("config");
        assert_eq!(config.url, "http://rt.internal:3001");
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = ManagerConfig::from_lookup(lookup(&[("SOCKET_MAX_RETRIES", "five")])).unwrap_err();
        assert!(err.to_string().contains("SOCKET_MAX_RETRIES"));
    }

    #[test]
    fn test_backoff_follows_config() {
        let policy = ManagerConfig::new()
            .with_initial_retry_delay(Duration::from_millis(100))
            .with_max_retry_delay(Duration::from_millis(250))
            .backoff();
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(250));
    }
}
