//! Configuration module
//!
//! Gateway settings are read from a TOML file. Every section and field is
//! optional; anything missing falls back to the defaults below.
//!
//! ```toml
//! [server]
//! ws_host = "0.0.0.0"
//! ws_port = 9000
//! ws_path = "/ws"
//! identity_param = "id"
//! shutdown_timeout = 10
//!
//! [ocpp]
//! heartbeat_interval = 60
//! idle_timeout = 300
//! write_timeout = 10
//! handshake_timeout = 10
//!
//! [logging]
//! level = "info"
//! format = "text"
//!
//! [metrics]
//! enabled = false
//! listen = "0.0.0.0:9100"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable pointing at the config file.
pub const CONFIG_ENV: &str = "OCPP_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// The config file does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ocpp: OcppConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub ws_host: String,
    pub ws_port: u16,
    /// Request path charge points connect to.
    pub ws_path: String,
    /// Query parameter carrying the charge point identity.
    pub identity_param: String,
    /// Seconds to wait for connection tasks on shutdown.
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_host: "0.0.0.0".to_string(),
            ws_port: 9000,
            ws_path: "/ws".to_string(),
            identity_param: "id".to_string(),
            shutdown_timeout: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcppConfig {
    /// Interval handed to charge points in BootNotification responses (seconds).
    pub heartbeat_interval: u32,
    /// Close a connection after this many seconds without inbound frames.
    pub idle_timeout: u64,
    pub write_timeout: u64,
    pub handshake_timeout: u64,
}

impl Default for OcppConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: 60,
            idle_timeout: 300,
            write_timeout: 10,
            handshake_timeout: 10,
        }
    }
}

impl OcppConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// `text` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics over HTTP.
    pub enabled: bool,
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "0.0.0.0:9100".to_string(),
        }
    }
}

impl AppConfig {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Config path from `OCPP_CONFIG`, else the platform config directory.
    pub fn resolve_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
        explicit
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(default_config_path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.server.ws_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "server.ws_path must start with '/', got {:?}",
                self.server.ws_path
            )));
        }
        if self.server.identity_param.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "server.identity_param must not be empty".to_string(),
            ));
        }
        if self.ocpp.heartbeat_interval == 0 {
            return Err(ConfigError::Invalid(
                "ocpp.heartbeat_interval must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("ocpp.idle_timeout", self.ocpp.idle_timeout),
            ("ocpp.write_timeout", self.ocpp.write_timeout),
            ("ocpp.handshake_timeout", self.ocpp.handshake_timeout),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        if !matches!(self.logging.format.to_lowercase().as_str(), "text" | "json") {
            return Err(ConfigError::Invalid(format!(
                "logging.format must be \"text\" or \"json\", got {:?}",
                self.logging.format
            )));
        }
        if self.metrics.enabled {
            self.metrics_addr()?;
        }
        Ok(())
    }

    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.server.ws_host, self.server.ws_port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }

    pub fn metrics_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.metrics.listen.parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "metrics.listen is not a socket address: {:?}",
                self.metrics.listen
            ))
        })
    }
}

/// `<config dir>/ocpp-gateway/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|dir| dir.join("ocpp-gateway").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.ws_path, "/ws");
        assert_eq!(config.server.identity_param, "id");
        assert_eq!(config.ocpp.heartbeat_interval, 60);
        assert_eq!(config.ws_addr(), "0.0.0.0:9000");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let file = write_config(
            r#"
            [server]
            ws_port = 8180

            [ocpp]
            heartbeat_interval = 300
            "#,
        );
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.server.ws_port, 8180);
        assert_eq!(config.server.ws_host, "0.0.0.0");
        assert_eq!(config.ocpp.heartbeat_interval, 300);
        assert_eq!(config.ocpp.idle_timeout, 300);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn empty_file_is_default() {
        let file = write_config("");
        assert_eq!(AppConfig::load(file.path()).unwrap(), AppConfig::default());
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.is_not_found());
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let file = write_config("[server\nws_port = ");
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(!err.is_not_found());
    }

    #[test]
    fn unreadable_path_is_not_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(!err.is_not_found());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let file = write_config("[server]\nws_path = \"ws\"\n");
        assert!(matches!(
            AppConfig::load(file.path()).unwrap_err(),
            ConfigError::Invalid(_)
        ));

        let mut config = AppConfig::default();
        config.ocpp.write_timeout = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.format = "yaml".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.metrics.enabled = true;
        config.metrics.listen = "not an address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_path_wins() {
        let path = PathBuf::from("/tmp/explicit.toml");
        assert_eq!(AppConfig::resolve_path(Some(path.clone())), Some(path));
    }
}
