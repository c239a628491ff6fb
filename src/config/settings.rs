//! Configuration settings for the RFID authentication daemon.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AuthdError;

/// Main configuration structure for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub alias: AliasConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to accept framed JSON connections on.
    pub listen_addr: SocketAddr,
}

/// Backing store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
    /// Maximum pooled connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// How long to wait for a pooled connection, in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// SQLite busy timeout, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Challenge session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in seconds. Bounds the replay window.
    #[serde(default = "default_session_ttl")]
    pub ttl_seconds: u64,
    /// Session backend ("memory" or "sqlite").
    #[serde(default = "default_session_backend")]
    pub backend: String,
    /// Interval of the expired-session reclamation pass; 0 disables it.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

/// Alias rotation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AliasConfig {
    /// Random bytes per alias (hex-encoded on the wire).
    #[serde(default = "default_alias_length")]
    pub length_bytes: usize,
    /// Attempts before a collision streak is reported as an internal error.
    #[serde(default = "default_alias_retries")]
    pub max_retries: u32,
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Whether verification outcomes are recorded.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Optional JSON lines mirror of the audit table.
    pub log_path: Option<PathBuf>,
    /// Capacity of the in-memory append queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Per-attempt write timeout, in milliseconds.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Write attempts per entry and sink.
    #[serde(default = "default_audit_retries")]
    pub max_retries: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Limits configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Maximum concurrent connections.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_connections: usize,
    /// Socket read/write timeout in seconds.
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_seconds: u64,
    /// Maximum requests per peer address per window.
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: usize,
    /// Maximum `nonce.issue` calls per peer for any single identifier per
    /// window.
    #[serde(default = "default_challenge_limit")]
    pub challenge_limit_requests: usize,
    /// Rate limit window in seconds.
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_seconds: u64,
}

// Default value functions
fn default_pool_size() -> u32 {
    8
}

fn default_connection_timeout_ms() -> u64 {
    2_000
}

fn default_busy_timeout_ms() -> u64 {
    2_000
}

fn default_session_ttl() -> u64 {
    5
}

fn default_session_backend() -> String {
    "memory".to_string()
}

fn default_cleanup_interval() -> u64 {
    30
}

fn default_alias_length() -> usize {
    8
}

fn default_alias_retries() -> u32 {
    5
}

fn default_audit_enabled() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    4_096
}

fn default_write_timeout_ms() -> u64 {
    1_000
}

fn default_audit_retries() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_max_message_size() -> usize {
    16_384
}

fn default_max_concurrent() -> usize {
    256
}

fn default_socket_timeout() -> u64 {
    10
}

fn default_rate_limit_requests() -> usize {
    600
}

fn default_challenge_limit() -> usize {
    20
}

fn default_rate_limit_window() -> u64 {
    60
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_session_ttl(),
            backend: default_session_backend(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            length_bytes: default_alias_length(),
            max_retries: default_alias_retries(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            log_path: None,
            queue_capacity: default_queue_capacity(),
            write_timeout_ms: default_write_timeout_ms(),
            max_retries: default_audit_retries(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            max_concurrent_connections: default_max_concurrent(),
            socket_timeout_seconds: default_socket_timeout(),
            rate_limit_requests: default_rate_limit_requests(),
            challenge_limit_requests: default_challenge_limit(),
            rate_limit_window_seconds: default_rate_limit_window(),
        }
    }
}

impl StorageConfig {
    /// Storage settings for a database file with every other field defaulted.
    pub fn at(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            pool_size: default_pool_size(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AuthdError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| AuthdError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        let settings = Self::from_toml(&content).map_err(|e| AuthdError::Config {
            message: format!("Invalid config file '{}': {}", path.display(), e),
        })?;

        Ok(settings)
    }

    /// Parse and validate settings from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, AuthdError> {
        let settings: Settings = toml::from_str(content).map_err(|e| AuthdError::Config {
            message: format!("Failed to parse TOML: {}", e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Loopback listener on an ephemeral port over `database_path`, every
    /// other field defaulted.
    pub fn local(database_path: impl Into<PathBuf>) -> Self {
        Self {
            server: ServerConfig {
                listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            },
            storage: StorageConfig::at(database_path),
            session: SessionConfig::default(),
            alias: AliasConfig::default(),
            audit: AuditConfig::default(),
            logging: LoggingConfig::default(),
            limits: LimitsConfig::default(),
        }
    }

    /// Validate the settings.
    fn validate(&self) -> Result<(), AuthdError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(AuthdError::Config {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(AuthdError::Config {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        let valid_backends = ["memory", "sqlite"];
        if !valid_backends.contains(&self.session.backend.to_lowercase().as_str()) {
            return Err(AuthdError::Config {
                message: format!(
                    "Invalid session backend '{}'. Valid backends: {:?}",
                    self.session.backend, valid_backends
                ),
            });
        }

        if self.session.ttl_seconds == 0 {
            return Err(AuthdError::Config {
                message: "session.ttl_seconds must be greater than zero".to_string(),
            });
        }

        if !(4..=32).contains(&self.alias.length_bytes) {
            return Err(AuthdError::Config {
                message: format!(
                    "alias.length_bytes must be between 4 and 32, got {}",
                    self.alias.length_bytes
                ),
            });
        }

        if self.alias.max_retries == 0 {
            return Err(AuthdError::Config {
                message: "alias.max_retries must be at least 1".to_string(),
            });
        }

        if self.limits.rate_limit_requests == 0 || self.limits.challenge_limit_requests == 0 {
            return Err(AuthdError::Config {
                message: "limits.rate_limit_requests and limits.challenge_limit_requests must be at least 1"
                    .to_string(),
            });
        }

        if self.limits.rate_limit_window_seconds == 0 {
            return Err(AuthdError::Config {
                message: "limits.rate_limit_window_seconds must be greater than zero".to_string(),
            });
        }

        if self.storage.pool_size == 0 {
            return Err(AuthdError::Config {
                message: "storage.pool_size must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [server]
        listen_addr = "127.0.0.1:7400"

        [storage]
        database_path = "/var/lib/rfid-authd/tags.db"
    "#;

    #[test]
    fn test_default_values() {
        let settings = Settings::from_toml(MINIMAL).unwrap();
        assert_eq!(settings.session.ttl_seconds, 5);
        assert_eq!(settings.session.backend, "memory");
        assert_eq!(settings.alias.length_bytes, 8);
        assert_eq!(settings.alias.max_retries, 5);
        assert_eq!(settings.logging.level, "info");
        assert!(settings.audit.enabled);
        assert!(settings.audit.log_path.is_none());
        assert_eq!(settings.limits.challenge_limit_requests, 20);
    }

    #[test]
    fn test_rejects_zero_challenge_budget() {
        let content = format!("{}\n[limits]\nchallenge_limit_requests = 0\n", MINIMAL);
        let err = Settings::from_toml(&content).unwrap_err();
        assert!(err.to_string().contains("challenge_limit_requests"));
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let content = format!("{}\n[session]\nttl_seconds = 0\n", MINIMAL);
        let err = Settings::from_toml(&content).unwrap_err();
        assert!(err.to_string().contains("ttl_seconds"));
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let content = format!("{}\n[session]\nbackend = \"redis\"\n", MINIMAL);
        assert!(Settings::from_toml(&content).is_err());
    }

    #[test]
    fn test_rejects_short_alias() {
        let content = format!("{}\n[alias]\nlength_bytes = 2\n", MINIMAL);
        assert!(Settings::from_toml(&content).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = Settings::load("/nonexistent/rfid-authd.toml").unwrap_err();
        assert!(matches!(err, AuthdError::Config { .. }));
    }
}
