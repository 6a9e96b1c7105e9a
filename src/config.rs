//! # Configuration Management
//!
//! Structured configuration for servers, clients and the service registry.
//!
//! ## Configuration Sources
//! - TOML files via [`RpcConfig::from_file`]
//! - Environment variables via [`RpcConfig::from_env`]
//! - Direct instantiation with defaults and overrides
//!
//! Durations are written as milliseconds in TOML.

use crate::core::frame::{HEAD_LENGTH, MAX_FRAME_LENGTH};
use crate::core::serialization::SerializationType;
use crate::error::{Result, RpcError};
use crate::extension::load_balance_names;
use crate::utils::compression::CompressType;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default coordination-store address
pub const DEFAULT_REGISTRY_ADDRESS: &str = "127.0.0.1:2181";

/// Default registry root path
pub const DEFAULT_ROOT_PATH: &str = "/my-rpc";

/// Default server port
pub const DEFAULT_SERVER_PORT: u16 = 9995;

/// Default weight of a locally hosted instance
pub const DEFAULT_WEIGHT: u32 = 100;

/// Complete framework configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RpcConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RpcConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RpcError::Config(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| RpcError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by `NETRPC_*` environment variables.
    ///
    /// Unparseable numeric values are rejected rather than ignored.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(address) = std::env::var("NETRPC_REGISTRY_ADDRESS") {
            config.registry.address = address;
        }

        if let Some(port) = env_number::<u16>("NETRPC_SERVER_PORT")? {
            config.server.port = port;
        }

        if let Some(weight) = env_number::<u32>("NETRPC_SERVER_WEIGHT")? {
            config.server.weight = weight;
        }

        if let Some(ms) = env_number::<u64>("NETRPC_CONNECT_TIMEOUT_MS")? {
            config.client.connect_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = env_number::<u64>("NETRPC_REQUEST_TIMEOUT_MS")? {
            config.client.request_timeout = Duration::from_millis(ms);
        }

        if let Ok(strategy) = std::env::var("NETRPC_LOAD_BALANCE") {
            config.client.load_balance = strategy;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RpcError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| RpcError::Config(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.registry.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RpcError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| RpcError::Config(format!("Invalid value for {name}: '{raw}'"))),
        Err(_) => Ok(None),
    }
}

/// Server-side settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen host
    pub host: String,

    /// Listen port; 0 picks a free port
    pub port: u16,

    /// Weight registered for this instance
    pub weight: u32,

    /// Close a connection that sends nothing for this long
    #[serde(with = "duration_serde")]
    pub idle_read_timeout: Duration,

    /// Dispatch concurrency; 0 means twice the available cores
    pub worker_threads: usize,

    /// Grace period for in-flight calls at shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: DEFAULT_SERVER_PORT,
            weight: DEFAULT_WEIGHT,
            idle_read_timeout: timeout::IDLE_READ_TIMEOUT,
            worker_threads: 0,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("Server host cannot be empty".to_string());
        } else if format!("{}:{}", self.host, self.port)
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            errors.push(format!(
                "Invalid server host: '{}' (expected an IP address such as '0.0.0.0')",
                self.host
            ));
        }

        if self.weight == 0 {
            errors.push("Server weight must be greater than 0".to_string());
        }

        if self.idle_read_timeout.as_millis() < 100 {
            errors.push("Idle read timeout too short (minimum: 100ms)".to_string());
        }

        if self.worker_threads > 4096 {
            errors.push(format!(
                "Worker threads very high: {} (maximum: 4096)",
                self.worker_threads
            ));
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Client-side settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Write-idle period before a heartbeat ping
    #[serde(with = "duration_serde")]
    pub heartbeat_interval: Duration,

    /// Upper bound on waiting for a response; 0 disables
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,

    /// Serializer name written on outgoing frames
    pub codec: String,

    /// Compressor name written on outgoing frames
    pub compress: String,

    /// Load-balancing strategy name
    pub load_balance: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: timeout::CONNECT_TIMEOUT,
            heartbeat_interval: timeout::HEARTBEAT_INTERVAL,
            request_timeout: timeout::REQUEST_TIMEOUT,
            codec: SerializationType::Bincode.name().to_string(),
            compress: CompressType::Lz4.name().to_string(),
            load_balance: load_balance_names::CONSISTENT_HASH.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        } else if self.connect_timeout.as_secs() > 300 {
            errors.push("Connect timeout too long (maximum: 300s)".to_string());
        }

        if self.heartbeat_interval.as_millis() < 100 {
            errors.push("Heartbeat interval too short (minimum: 100ms)".to_string());
        } else if self.heartbeat_interval.as_secs() > 3600 {
            errors.push("Heartbeat interval too long (maximum: 1 hour)".to_string());
        }

        if !self.request_timeout.is_zero() && self.request_timeout.as_millis() < 10 {
            errors.push("Request timeout too short (minimum: 10ms, or 0 to disable)".to_string());
        }

        if SerializationType::from_name(&self.codec).is_none() {
            errors.push(format!("Unknown codec: '{}'", self.codec));
        }

        if CompressType::from_name(&self.compress).is_none() {
            errors.push(format!("Unknown compression: '{}'", self.compress));
        }

        if !load_balance_names::ALL.contains(&self.load_balance.as_str()) {
            errors.push(format!(
                "Unknown load balance strategy: '{}' (expected one of: {})",
                self.load_balance,
                load_balance_names::ALL.join(", ")
            ));
        }

        errors
    }
}

/// Coordination-store settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Coordination-store address (host:port)
    pub address: String,

    /// Root node under which service keys live
    pub root_path: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            address: String::from(DEFAULT_REGISTRY_ADDRESS),
            root_path: String::from(DEFAULT_ROOT_PATH),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        match self.address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => errors.push(format!(
                "Invalid registry address: '{}' (expected format: 'host:port')",
                self.address
            )),
        }

        if !self.root_path.starts_with('/') {
            errors.push(format!(
                "Registry root path must be absolute: '{}'",
                self.root_path
            ));
        } else if self.root_path.len() > 1 && self.root_path.ends_with('/') {
            errors.push(format!(
                "Registry root path must not end with '/': '{}'",
                self.root_path
            ));
        }

        errors
    }
}

/// Wire settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Largest accepted frame, header included
    pub max_frame_length: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_length: MAX_FRAME_LENGTH,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_frame_length <= HEAD_LENGTH {
            errors.push(format!(
                "Max frame length must exceed the {HEAD_LENGTH}-byte header"
            ));
        } else if self.max_frame_length > MAX_FRAME_LENGTH {
            errors.push(format!(
                "Max frame length too large: {} bytes (maximum: {MAX_FRAME_LENGTH})",
                self.max_frame_length
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Emit JSON lines instead of human-readable output
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("netrpc"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RpcConfig::default();
        assert!(config.validate().is_empty(), "{:?}", config.validate());
        assert_eq!(config.server.port, 9995);
        assert_eq!(config.registry.root_path, "/my-rpc");
        assert_eq!(config.client.load_balance, "consistent_hash");
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn partial_toml_keeps_defaults() {
        let config = RpcConfig::from_toml(
            r#"
            [server]
            port = 0
            weight = 5

            [client]
            request_timeout = 250
            load_balance = "round_robin"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 0);
        assert_eq!(config.server.weight, 5);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.client.request_timeout, Duration::from_millis(250));
        assert_eq!(config.client.load_balance, "round_robin");
        assert_eq!(config.client.connect_timeout, timeout::CONNECT_TIMEOUT);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn example_config_parses_back() {
        let text = RpcConfig::example_config();
        let parsed = RpcConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.client.codec, "bincode");
        assert_eq!(parsed.logging.log_level, Level::INFO);
    }

    #[test]
    fn unknown_names_are_reported() {
        let config = RpcConfig::default_with_overrides(|c| {
            c.client.codec = "xml".into();
            c.client.load_balance = "fastest".into();
        });
        let errors = config.validate();
        assert_eq!(errors.len(), 2);
        assert!(config.validate_strict().is_err());
    }
}
