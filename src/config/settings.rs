//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::grasshopper::WireProtocol;

/// Longest accepted wait time for a Grasshopper exchange.
const MAX_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Connection to the Grasshopper component.
    #[serde(default)]
    pub grasshopper: GrasshopperConfig,

    /// Knowledge base JSON file replacing the built-in document.
    #[serde(default)]
    pub knowledge_base_path: Option<PathBuf>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let gh = &self.grasshopper;

        if gh.host.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "grasshopper.host must not be empty".to_string(),
            });
        }

        if gh.port == 0 {
            return Err(ConfigError::ValidationError {
                message: "grasshopper.port must be between 1 and 65535".to_string(),
            });
        }

        if gh.timeout_ms == 0 || gh.timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid grasshopper.timeout_ms {}. Must be between 1 and {MAX_TIMEOUT_MS}",
                    gh.timeout_ms
                ),
            });
        }

        Ok(())
    }
}

/// Grasshopper connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrasshopperConfig {
    /// Host running the Grasshopper component.
    /// Default: "localhost"
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port the component listens on.
    /// Default: 8080
    #[serde(default = "default_port")]
    pub port: u16,

    /// Wait time for connect, write and response, in milliseconds.
    /// Default: 5000
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Outbound envelope shape: "legacy" or "jsonrpc".
    #[serde(default)]
    pub protocol: WireProtocol,
}

impl GrasshopperConfig {
    /// Returns the wait time as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for GrasshopperConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            protocol: WireProtocol::default(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    8080
}

const fn default_timeout_ms() -> u64 {
    5000
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.grasshopper.host, "localhost");
        assert_eq!(config.grasshopper.port, 8080);
        assert_eq!(config.grasshopper.protocol, WireProtocol::Legacy);
        assert!(config.knowledge_base_path.is_none());
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "grasshopper": {
                "host": "192.168.1.20",
                "port": 9090,
                "timeout_ms": 15000,
                "protocol": "jsonrpc"
            },
            "knowledge_base_path": "/path/to/kb.json",
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.grasshopper.host, "192.168.1.20");
        assert_eq!(config.grasshopper.port, 9090);
        assert_eq!(config.grasshopper.timeout(), Duration::from_secs(15));
        assert_eq!(config.grasshopper.protocol, WireProtocol::JsonRpc);
        assert_eq!(
            config.knowledge_base_path,
            Some(PathBuf::from("/path/to/kb.json"))
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn grasshopper_config_defaults() {
        let config = GrasshopperConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 8080);
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn reject_invalid_port_and_host() {
        let config: Config = serde_json::from_str(r#"{"grasshopper": {"port": 0}}"#).unwrap();
        assert!(config.validate().is_err());

        let config: Config = serde_json::from_str(r#"{"grasshopper": {"host": " "}}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_out_of_range_timeout() {
        let config: Config =
            serde_json::from_str(r#"{"grasshopper": {"timeout_ms": 0}}"#).unwrap();
        assert!(config.validate().is_err());

        let config: Config =
            serde_json::from_str(r#"{"grasshopper": {"timeout_ms": 600001}}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_protocol() {
        let result: Result<Config, _> =
            serde_json::from_str(r#"{"grasshopper": {"protocol": "xml"}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
