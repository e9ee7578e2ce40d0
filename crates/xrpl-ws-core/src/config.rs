//! Client configuration
//!
//! Every field has a default, so `ClientConfig::default()` connects to the
//! public `wss://xrpl.ws` endpoint with the stock timeouts. Durations are
//! (de)serialized as seconds so the same struct can be read from TOML or JSON.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{ClientError, ClientResult};

/// Default public endpoint
pub const DEFAULT_SERVER: &str = "wss://xrpl.ws";

// ----------------------------------------------------------------------------
// Client Configuration
// ----------------------------------------------------------------------------

/// Configuration for a persistent client connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint (`ws://` or `wss://`)
    pub server: String,
    /// Time allowed to open the transport, and maximum silence before the
    /// connection is considered stale
    #[serde(with = "duration_secs")]
    pub connection_timeout: Duration,
    /// Time a `send` waits for its correlated response
    #[serde(with = "duration_secs")]
    pub response_timeout: Duration,
    /// Pause between a lost connection and the next attempt
    #[serde(with = "duration_secs")]
    pub reconnect_interval: Duration,
    /// Quiet period after which a liveness ping is sent
    #[serde(with = "duration_secs")]
    pub ping_interval: Duration,
    /// Time allowed for a pong after a ping
    #[serde(with = "duration_secs")]
    pub pong_timeout: Duration,
    /// Upper bound on how long `disconnect` waits for the background task
    #[serde(with = "duration_secs")]
    pub shutdown_grace: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            connection_timeout: Duration::from_secs(30),
            response_timeout: Duration::from_secs(30),
            reconnect_interval: Duration::from_secs(10),
            ping_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    /// Configuration for a specific endpoint with default timings
    pub fn with_server<S: Into<String>>(server: S) -> Self {
        Self {
            server: server.into(),
            ..Self::default()
        }
    }

    /// Set both the connection and the response timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self.response_timeout = timeout;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Check that the configuration can drive a connection
    pub fn validate(&self) -> ClientResult<()> {
        let url = url::Url::parse(&self.server)
            .map_err(|e| ClientError::config_error(format!("Invalid server URL {}: {}", self.server, e)))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ClientError::config_error(format!(
                "Server URL must use ws:// or wss://, got {}",
                self.server
            )));
        }

        let durations = [
            ("connection_timeout", self.connection_timeout),
            ("response_timeout", self.response_timeout),
            ("reconnect_interval", self.reconnect_interval),
            ("ping_interval", self.ping_interval),
            ("pong_timeout", self.pong_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ClientError::config_error(format!("{} must be greater than zero", name)));
            }
        }

        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Duration Serialization Helpers
// ----------------------------------------------------------------------------

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| serde::de::Error::custom(format!("Invalid duration {}: {}", secs, e)))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.server, "wss://xrpl.ws");
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
        assert_eq!(config.response_timeout, Duration::from_secs(30));
        assert_eq!(config.reconnect_interval, Duration::from_secs(10));
        assert_eq!(config.ping_interval, Duration::from_secs(10));
        assert_eq!(config.pong_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_timeout_sets_both_timeouts() {
        let config = ClientConfig::with_server("ws://localhost:6006").with_timeout(Duration::from_secs(5));
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
        assert_eq!(config.response_timeout, Duration::from_secs(5));
        assert_eq!(config.server, "ws://localhost:6006");
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let config = ClientConfig::with_server("http://localhost:6006");
        assert!(matches!(config.validate(), Err(ClientError::Configuration { .. })));

        let config = ClientConfig::with_server("not a url");
        assert!(config.validate().is_err());

        let config = ClientConfig::default().with_ping_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations_deserialize_from_seconds() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"server": "ws://127.0.0.1:6006", "response_timeout": 2.5, "reconnect_interval": 1}"#,
        )
        .unwrap();

        assert_eq!(config.server, "ws://127.0.0.1:6006");
        assert_eq!(config.response_timeout, Duration::from_millis(2500));
        assert_eq!(config.reconnect_interval, Duration::from_secs(1));
        // untouched fields keep their defaults
        assert_eq!(config.pong_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_negative_duration_is_rejected() {
        let result = serde_json::from_str::<ClientConfig>(r#"{"ping_interval": -1}"#);
        assert!(result.is_err());
    }
}
