//! CLI configuration
//!
//! Configuration is layered, later layers winning:
//! - Built-in defaults
//! - A TOML file (`--config`, or `xrpl-ws.toml` if present)
//! - Environment variables prefixed with `XRPL_WS_`, nested keys separated by
//!   a double underscore (`XRPL_WS_CLIENT__SERVER`)
//! - Command line flags
//!
//! ```toml
//! streams = ["ledger", "transactions"]
//!
//! [client]
//! server = "wss://s1.ripple.com"
//! response_timeout = 10
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use xrpl_ws_core::ClientConfig;

/// File picked up from the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "xrpl-ws.toml";

/// Prefix of the environment variables read into the configuration
pub const ENV_PREFIX: &str = "XRPL_WS_";

/// Configuration for the `xrpl-ws` binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Connection settings
    pub client: ClientConfig,
    /// Streams `watch` subscribes to when `--streams` is not given
    pub streams: Vec<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            streams: vec!["ledger".to_string()],
        }
    }
}

impl CliConfig {
    /// Defaults, configuration file and environment, without command line flags
    ///
    /// An explicitly named file must exist; the default file is optional.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let file = match path {
            Some(path) => {
                std::fs::metadata(path)?;
                Toml::file(path)
            }
            None => Toml::file(DEFAULT_CONFIG_FILE),
        };

        Ok(Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(file)
            .merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load configuration from every layer below the command line
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_overrides(path, None, None)
    }

    /// Load configuration with `--server` and `--timeout` as the top layer
    pub fn load_with_overrides(path: Option<&Path>, server: Option<&str>, timeout_secs: Option<f64>) -> Result<Self> {
        let mut figment = Self::figment(path)?;

        if let Some(server) = server {
            figment = figment.merge(("client.server", server));
        }
        if let Some(secs) = timeout_secs {
            figment = figment
                .merge(("client.connection_timeout", secs))
                .merge(("client.response_timeout", secs));
        }

        let config: CliConfig = figment.extract()?;
        config.client.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use figment::Jail;
    use std::time::Duration;

    fn load(path: Option<&Path>) -> figment::error::Result<CliConfig> {
        CliConfig::load(path).map_err(|e| e.to_string().into())
    }

    #[test]
    fn test_defaults_watch_ledger() {
        Jail::expect_with(|_jail| {
            let config = tokio_test::assert_ok!(load(None));
            assert_eq!(config, CliConfig::default());
            assert_eq!(config.streams, vec!["ledger".to_string()]);
            Ok(())
        });
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                streams = ["ledger", "transactions"]

                [client]
                server = "ws://localhost:6006"
                response_timeout = 2.5
                "#,
            )?;

            let config = tokio_test::assert_ok!(load(Some(Path::new("custom.toml"))));
            assert_eq!(config.streams.len(), 2);
            assert_eq!(config.client.server, "ws://localhost:6006");
            assert_eq!(config.client.response_timeout, Duration::from_millis(2500));
            assert_eq!(
                config.client.reconnect_interval,
                ClientConfig::default().reconnect_interval
            );
            Ok(())
        });
    }

    #[test]
    fn test_default_file_is_picked_up() {
        Jail::expect_with(|jail| {
            jail.create_file(DEFAULT_CONFIG_FILE, "streams = [\"transactions\"]")?;

            let config = tokio_test::assert_ok!(load(None));
            assert_eq!(config.streams, vec!["transactions".to_string()]);
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(DEFAULT_CONFIG_FILE, "[client]\nserver = \"ws://from-file:6006\"")?;
            jail.set_env("XRPL_WS_CLIENT__SERVER", "wss://from-env.example");
            jail.set_env("XRPL_WS_CLIENT__PING_INTERVAL", "3");

            let config = tokio_test::assert_ok!(load(None));
            assert_eq!(config.client.server, "wss://from-env.example");
            assert_eq!(config.client.ping_interval, Duration::from_secs(3));
            Ok(())
        });
    }

    #[test]
    fn test_flags_override_environment() {
        Jail::expect_with(|jail| {
            jail.set_env("XRPL_WS_CLIENT__SERVER", "wss://from-env.example");

            let config = CliConfig::load_with_overrides(None, Some("ws://127.0.0.1:6006"), Some(3.0))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.client.server, "ws://127.0.0.1:6006");
            assert_eq!(config.client.connection_timeout, Duration::from_secs(3));
            assert_eq!(config.client.response_timeout, Duration::from_secs(3));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        Jail::expect_with(|jail| {
            let scheme = CliConfig::load_with_overrides(None, Some("http://example.com"), None);
            assert!(matches!(scheme, Err(CliError::Client(_))));

            let negative = CliConfig::load_with_overrides(None, None, Some(-1.0));
            assert!(matches!(negative, Err(CliError::Loading(_))));

            jail.create_file("broken.toml", "streams = ")?;
            let malformed = CliConfig::load(Some(Path::new("broken.toml")));
            assert!(matches!(malformed, Err(CliError::Loading(_))));
            Ok(())
        });
    }

    #[test]
    fn test_missing_named_file_is_io_error() {
        let result = CliConfig::load(Some(Path::new("/nonexistent/xrpl-ws.toml")));
        assert!(matches!(result, Err(CliError::Io(_))));
    }
}
