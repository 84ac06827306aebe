//! Configuration management for the Sky feed services.
//!
//! Configuration lives in a single file at `~/.skyfeed/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Command-line flags (applied by the binary)
//! 2. Environment variables (SKY_* prefix)
//! 3. Config file values
//! 4. Default values
//!
//! # Environment Variable Mapping
//!
//! - `SKY_BIND_ADDRESS` → network.bind
//! - `SKY_MCP_PORT` → server.port
//! - `SKY_BUFFER_CAPACITY` → buffer.capacity
//! - `SKY_JETSTREAM_ENDPOINT` → jetstream.endpoint
//! - `SKY_SILENT` → observability.silent
//! - `SKY_LOG_LEVEL` → observability.log_level
//! - `SKY_LOG_FORMAT` → observability.log_format

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, ResultExt};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".skyfeed"),
        |dirs| dirs.home_dir().join(".skyfeed"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Network Configuration
// ============================================================================

/// Network configuration.
///
/// Default bind address is `127.0.0.1` (local only). Set to `0.0.0.0`
/// to accept remote MCP clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

// ============================================================================
// MCP Server Configuration
// ============================================================================

/// HTTP server settings for the MCP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Close sessions idle for longer than this. Unset disables the reaper.
    #[serde(default)]
    pub session_idle_timeout_secs: Option<u64>,

    /// Maximum accepted request body size
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            session_idle_timeout_secs: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_max_body_bytes() -> usize {
    4 * 1024 * 1024
}

// ============================================================================
// Buffer Configuration
// ============================================================================

/// Recent-event buffer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Number of most recent events kept in memory
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    100
}

// ============================================================================
// Jetstream Configuration
// ============================================================================

/// Firehose subscription settings.
///
/// Empty `wanted_collections` / `wanted_dids` mean "no filtering".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JetstreamConfig {
    #[serde(default = "default_jetstream_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_wanted_collections")]
    pub wanted_collections: Vec<String>,

    #[serde(default)]
    pub wanted_dids: Vec<String>,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for JetstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: default_jetstream_endpoint(),
            wanted_collections: default_wanted_collections(),
            wanted_dids: Vec::new(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_jetstream_endpoint() -> String {
    "wss://jetstream2.us-east.bsky.network/subscribe".into()
}

fn default_wanted_collections() -> Vec<String> {
    vec!["app.bsky.feed.post".into()]
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Suppress the per-event ingest log line
    #[serde(default)]
    pub silent: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            silent: false,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub buffer: BufferConfig,

    #[serde(default)]
    pub jetstream: JetstreamConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path, falling back to defaults
    /// when no file exists.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration (default path or explicit file) and apply
    /// environment overrides.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("SKY_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Some(port) = lookup("SKY_MCP_PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid SKY_MCP_PORT"),
            }
        }
        if let Some(capacity) = lookup("SKY_BUFFER_CAPACITY") {
            match capacity.parse() {
                Ok(c) => self.buffer.capacity = c,
                Err(_) => {
                    tracing::warn!(value = %capacity, "Ignoring invalid SKY_BUFFER_CAPACITY")
                }
            }
        }
        if let Some(endpoint) = lookup("SKY_JETSTREAM_ENDPOINT") {
            self.jetstream.endpoint = endpoint;
        }
        if let Some(silent) = lookup("SKY_SILENT") {
            self.observability.silent = matches!(silent.as_str(), "1" | "true" | "yes");
        }
        if let Some(level) = lookup("SKY_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("SKY_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Socket address for the MCP HTTP listener. `bind` is a bare IP, so
    /// IPv6 addresses need no brackets.
    pub fn listen_address(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.network.bind.parse().map_err(|_| {
            Error::Config(format!("Invalid bind address: {}", self.network.bind))
        })?;
        Ok(SocketAddr::from((ip, self.server.port)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.buffer.capacity, 100);
        assert_eq!(config.network.bind, "127.0.0.1");
        assert!(!config.observability.silent);
        assert!(config.server.session_idle_timeout_secs.is_none());
        assert_eq!(
            config.jetstream.wanted_collections,
            vec!["app.bsky.feed.post".to_string()]
        );
        assert!(config.jetstream.wanted_dids.is_empty());
        assert_eq!(config.listen_address().unwrap().to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "server": { "port": 4100 }, "buffer": {} }"#).unwrap();
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.buffer.capacity, 100);
        assert_eq!(config.observability.log_format, "pretty");
    }

    #[test]
    fn test_listen_address_ipv6_and_invalid() {
        let mut config = Config::default();
        config.network.bind = "::1".into();
        assert_eq!(config.listen_address().unwrap().to_string(), "[::1]:3000");

        config.network.bind = "localhost:80".into();
        let err = config.listen_address().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("localhost:80"));
    }

    #[test]
    fn test_load_from_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.buffer.capacity = 7;
        config.jetstream.wanted_dids = vec!["did:plc:abc".into()];
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.buffer.capacity, 7);
        assert_eq!(loaded.jetstream.wanted_dids, vec!["did:plc:abc".to_string()]);
    }

    #[test]
    fn test_load_from_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SKY_MCP_PORT", "4242"),
            ("SKY_BUFFER_CAPACITY", "5"),
            ("SKY_SILENT", "true"),
            ("SKY_LOG_FORMAT", "json"),
            ("SKY_BIND_ADDRESS", "0.0.0.0"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 4242);
        assert_eq!(config.buffer.capacity, 5);
        assert!(config.observability.silent);
        assert_eq!(config.observability.log_format, "json");
        assert_eq!(config.listen_address().unwrap().to_string(), "0.0.0.0:4242");
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(|key| match key {
            "SKY_MCP_PORT" => Some("not-a-port".into()),
            "SKY_BUFFER_CAPACITY" => Some("-3".into()),
            _ => None,
        });
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.buffer.capacity, 100);
    }
}
