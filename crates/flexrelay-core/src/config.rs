//! Configuration management for the FlexRelay discovery relay.
//!
//! Supports loading from YAML files, environment variable overrides via the
//! `config` crate (prefix `FLEXRELAY`), and validation of all settings.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration.
///
/// Root configuration for both the server and client binaries. Each binary
/// reads only the sections it needs, so one file can drive a whole
/// deployment.
///
/// # Examples
///
/// ```no_run
/// use flexrelay_core::config::AppConfig;
///
/// let config = AppConfig::from_file("config.yaml").unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Capture/relay server settings
    #[serde(default)]
    pub server: ServerSection,

    /// Relay client settings
    #[serde(default)]
    pub client: ClientSection,

    /// Periodic self-diagnostics
    #[serde(default)]
    pub diagnostics: DiagnosticsSection,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSection,
}

impl AppConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration using the `config` crate, which supports
    /// multiple sources and environment variable overrides (FLEXRELAY_*).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or merged.
    pub fn from_config_builder<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(
                config::Environment::with_prefix("FLEXRELAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any section carries an unusable value.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.client.validate()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            client: ClientSection::default(),
            diagnostics: DiagnosticsSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

/// Settings for the capture/relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Address to bind the capture and stream sockets on
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// UDP port the radio broadcasts discovery packets on
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,

    /// TCP port remote relay clients connect to
    #[serde(default = "default_stream_port")]
    pub stream_port: u16,

    /// Maximum number of simultaneous relay clients
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// Optional shared-file transport output path
    pub shared_file_path: Option<PathBuf>,

    /// Minimum interval between shared-file rewrites, in seconds
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,

    /// Seconds without a packet before the source is considered stale
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_discovery_port() -> u16 {
    4992
}

fn default_stream_port() -> u16 {
    4993
}

fn default_max_clients() -> usize {
    10
}

fn default_update_interval() -> u64 {
    5
}

fn default_stale_after() -> u64 {
    30
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            discovery_port: default_discovery_port(),
            stream_port: default_stream_port(),
            max_clients: default_max_clients(),
            shared_file_path: None,
            update_interval_secs: default_update_interval(),
            stale_after_secs: default_stale_after(),
        }
    }
}

impl ServerSection {
    /// Validates the server section.
    pub fn validate(&self) -> Result<()> {
        if self.discovery_port == 0 {
            return Err(
                ConfigError::invalid_value("server.discovery_port", "port cannot be 0").into(),
            );
        }
        if self.stream_port == 0 {
            return Err(
                ConfigError::invalid_value("server.stream_port", "port cannot be 0").into(),
            );
        }
        if self.max_clients == 0 {
            return Err(
                ConfigError::invalid_value("server.max_clients", "must allow at least one client")
                    .into(),
            );
        }
        if self.stale_after_secs == 0 {
            return Err(ConfigError::invalid_value(
                "server.stale_after_secs",
                "staleness threshold cannot be 0",
            )
            .into());
        }
        Ok(())
    }

    /// Returns the capture socket bind address.
    pub fn capture_address(&self) -> String {
        format!("{}:{}", self.listen_address, self.discovery_port)
    }

    /// Returns the stream listener bind address.
    pub fn stream_address(&self) -> String {
        format!("{}:{}", self.listen_address, self.stream_port)
    }

    /// Returns the shared-file update interval as a Duration.
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    /// Returns the staleness threshold as a Duration.
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Transport the client uses to receive announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientTransport {
    /// TCP stream to the relay server (primary)
    Socket,
    /// Polling a shared file (fallback)
    File,
}

impl Default for ClientTransport {
    fn default() -> Self {
        ClientTransport::Socket
    }
}

/// Settings for the relay client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSection {
    /// Relay server to connect to, `host:port`
    #[serde(default = "default_server_address")]
    pub server_address: String,

    /// Address the recovered packets are broadcast to
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: String,

    /// UDP port the recovered packets are broadcast on
    #[serde(default = "default_discovery_port")]
    pub broadcast_port: u16,

    /// Which transport carries announcements
    #[serde(default)]
    pub transport: ClientTransport,

    /// Shared file path for the file transport
    pub shared_file_path: Option<PathBuf>,

    /// Seconds between shared-file polls
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Delay before a reconnect attempt, in seconds
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,

    /// TCP connect timeout, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Socket read timeout; doubles as the periodic-work scheduling point
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Seconds without a frame before the link is considered stale
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

fn default_server_address() -> String {
    "127.0.0.1:4993".to_string()
}

fn default_broadcast_address() -> String {
    "255.255.255.255".to_string()
}

fn default_check_interval() -> u64 {
    2
}

fn default_reconnect_interval() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    2
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            broadcast_address: default_broadcast_address(),
            broadcast_port: default_discovery_port(),
            transport: ClientTransport::default(),
            shared_file_path: None,
            check_interval_secs: default_check_interval(),
            reconnect_interval_secs: default_reconnect_interval(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            stale_after_secs: default_stale_after(),
        }
    }
}

impl ClientSection {
    /// Validates the client section.
    pub fn validate(&self) -> Result<()> {
        if self.server_address.is_empty() {
            return Err(
                ConfigError::invalid_value("client.server_address", "cannot be empty").into(),
            );
        }
        if self.broadcast_port == 0 {
            return Err(
                ConfigError::invalid_value("client.broadcast_port", "port cannot be 0").into(),
            );
        }
        if self.transport == ClientTransport::File && self.shared_file_path.is_none() {
            return Err(ConfigError::invalid_value(
                "client.shared_file_path",
                "required when transport is 'file'",
            )
            .into());
        }
        if self.read_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "client.read_timeout_secs",
                "read timeout cannot be 0",
            )
            .into());
        }
        Ok(())
    }

    /// Returns the reconnect delay as a Duration.
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    /// Returns the connect timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns the read timeout as a Duration.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Returns the shared-file poll interval as a Duration.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Returns the staleness threshold as a Duration.
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Periodic self-diagnostics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsSection {
    /// Whether periodic diagnostics run at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between diagnostic sweeps
    #[serde(default = "default_diagnostics_interval")]
    pub interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_diagnostics_interval() -> u64 {
    60
}

impl Default for DiagnosticsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_diagnostics_interval(),
        }
    }
}

impl DiagnosticsSection {
    /// Returns the sweep interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.discovery_port, 4992);
        assert_eq!(config.server.stream_port, 4993);
        assert_eq!(config.client.broadcast_address, "255.255.255.255");
        assert_eq!(config.server.stale_after(), Duration::from_secs(30));
    }

    #[test]
    fn config_from_yaml() {
        let yaml = r#"
server:
  listen_address: 192.168.1.10
  stream_port: 9993
  max_clients: 4

client:
  server_address: relay.example.net:4993
  transport: socket
  reconnect_interval_secs: 3

logging:
  level: debug
  format: json
"#;

        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.stream_address(), "192.168.1.10:9993");
        assert_eq!(config.server.max_clients, 4);
        assert_eq!(config.client.server_address, "relay.example.net:4993");
        assert_eq!(config.client.reconnect_interval(), Duration::from_secs(3));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_port_fails_validation() {
        let mut config = AppConfig::default();
        config.server.stream_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_transport_requires_path() {
        let mut config = AppConfig::default();
        config.client.transport = ClientTransport::File;
        assert!(config.validate().is_err());

        config.client.shared_file_path = Some(PathBuf::from("/tmp/discovery.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn capture_address_joins_host_and_port() {
        let server = ServerSection::default();
        assert_eq!(server.capture_address(), "0.0.0.0:4992");
    }
}
