//! Connection and retry settings.

use alloc::string::String;
use core::fmt;
use core::time::Duration;

use crate::client::{
    BOOTSTRAP_ACTION, BOOTSTRAP_SERVICE, DEFAULT_MAX_ATTEMPTS, DEFAULT_TRANSPORT_BACKOFF,
};

/// Default TR-064 port for plain HTTP.
pub const DEFAULT_HTTP_PORT: u16 = 49000;

/// Default TR-064 port for HTTPS.
pub const DEFAULT_HTTPS_PORT: u16 = 49443;

/// How the connection to the device is secured.
#[derive(Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Scheme {
    /// Plain HTTP.
    #[default]
    Http,
    /// TLS without certificate verification.
    HttpsInsecure,
    /// TLS verified against a caller-supplied PEM certificate.
    Https { trust_anchor_pem: String },
}

impl Scheme {
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => DEFAULT_HTTP_PORT,
            Scheme::HttpsInsecure | Scheme::Https { .. } => DEFAULT_HTTPS_PORT,
        }
    }

    pub fn is_tls(&self) -> bool {
        !matches!(self, Scheme::Http)
    }
}

impl fmt::Debug for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "Http"),
            Scheme::HttpsInsecure => write!(f, "HttpsInsecure"),
            Scheme::Https { .. } => write!(f, "Https"),
        }
    }
}

/// Where the device is and how to log in.
///
/// # Example
///
/// ```
/// use tr064::config::ConnectionSettings;
///
/// let settings = ConnectionSettings::http("192.168.178.1", "admin", "secret");
/// assert_eq!(settings.port, 49000);
/// assert!(!format!("{settings:?}").contains("secret"));
/// ```
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionSettings {
    /// IP address or host name of the device.
    pub host: String,
    /// Default: 49000 for HTTP, 49443 for HTTPS.
    pub port: u16,
    /// Default: plain HTTP.
    pub scheme: Scheme,
    pub username: String,
    pub password: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: String::from("192.168.178.1"),
            port: DEFAULT_HTTP_PORT,
            scheme: Scheme::Http,
            username: String::new(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("scheme", &self.scheme)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ConnectionSettings {
    /// Plain HTTP on the default port.
    pub fn http(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::with_scheme(Scheme::Http, host, username, password)
    }

    /// HTTPS without certificate verification on the default port.
    pub fn https_insecure(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::with_scheme(Scheme::HttpsInsecure, host, username, password)
    }

    /// HTTPS verified against `trust_anchor_pem` on the default port.
    pub fn https(
        host: impl Into<String>,
        trust_anchor_pem: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let scheme = Scheme::Https { trust_anchor_pem: trust_anchor_pem.into() };
        Self::with_scheme(scheme, host, username, password)
    }

    fn with_scheme(
        scheme: Scheme,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: scheme.default_port(),
            scheme,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Overrides the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// How the client reacts when a response lacks some requested outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MissingOutputs {
    /// Retry the call within the attempt budget, then fail.
    #[default]
    Retry,
    /// Fail immediately with the list of missing outputs.
    Fail,
    /// Succeed and report the missing outputs in the response.
    Accept,
}

/// Retry behaviour of [`Tr064Client::action`](crate::client::Tr064Client::action).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryPolicy {
    /// Attempts per action call, bootstrap calls included.
    /// Default: 3.
    pub max_attempts: u8,
    /// Pause before the single retry after a transport failure.
    /// Default: 1 second.
    pub transport_backoff: Duration,
    /// Default: [`MissingOutputs::Retry`].
    pub missing_outputs: MissingOutputs,
    /// Service of the call used to obtain a fresh nonce.
    /// Default: `DeviceInfo:1`.
    pub bootstrap_service: String,
    /// Action of the call used to obtain a fresh nonce.
    /// Default: `GetInfo`.
    pub bootstrap_action: String,
    /// Idle reads tolerated while waiting for response data.
    /// Default: 40.
    pub max_idle_reads: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            transport_backoff: DEFAULT_TRANSPORT_BACKOFF,
            missing_outputs: MissingOutputs::Retry,
            bootstrap_service: String::from(BOOTSTRAP_SERVICE),
            bootstrap_action: String::from(BOOTSTRAP_ACTION),
            max_idle_reads: crate::xml::DEFAULT_MAX_IDLE_READS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn test_default_settings() {
        let settings = ConnectionSettings::default();
        assert_eq!(settings.port, 49000);
        assert_eq!(settings.scheme, Scheme::Http);
    }

    #[test]
    fn test_scheme_ports() {
        assert_eq!(ConnectionSettings::http("h", "u", "p").port, 49000);
        assert_eq!(ConnectionSettings::https_insecure("h", "u", "p").port, 49443);
        assert_eq!(ConnectionSettings::https("h", "PEM", "u", "p").port, 49443);
        assert_eq!(ConnectionSettings::http("h", "u", "p").port(8080).port, 8080);
        assert!(Scheme::HttpsInsecure.is_tls());
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = ConnectionSettings::https("h", "-----BEGIN CERTIFICATE-----", "u", "hunter2");
        let debug = format!("{settings:?}");
        assert!(debug.contains("redacted"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("BEGIN"));
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.transport_backoff, Duration::from_secs(1));
        assert_eq!(policy.missing_outputs, MissingOutputs::Retry);
        assert_eq!(policy.bootstrap_service, "DeviceInfo:1");
        assert_eq!(policy.bootstrap_action, "GetInfo");
    }
}
