//! Configuration loading for sealed-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`).

use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration for sealed-relay.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// WebSocket server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Credential store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// External data source configuration.
    #[serde(default)]
    pub source: SourceConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// HTTP endpoints configuration.
    #[serde(default)]
    pub http: HttpConfig,
    /// Maintenance task configuration.
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

/// WebSocket server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the WebSocket listener (default: 127.0.0.1:8765).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Seconds between server keep-alive pings (default: 20).
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// Extra seconds of silence tolerated after a ping before the
    /// connection is dropped (default: 10).
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,
    /// Maximum inbound frame size in bytes (default: 64KB).
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Credential store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the JSON credential store.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Argon2id memory cost in KiB for new password hashes (default: 19456).
    #[serde(default = "default_kdf_memory_kib")]
    pub kdf_memory_kib: u32,
    /// Argon2id iterations for new password hashes (default: 2).
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,
    /// Users created when no store exists yet.
    #[serde(default = "default_seed_users")]
    pub seed_users: Vec<SeedUser>,
}

/// A user created at first boot.
#[derive(Clone, Deserialize)]
pub struct SeedUser {
    /// Account name.
    pub username: String,
    /// Initial password (hashed before it is written).
    pub password: String,
}

impl std::fmt::Debug for SeedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedUser")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// External data source configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// URL fetched for every RequestEncryptedValue.
    #[serde(default = "default_source_url")]
    pub url: String,
    /// Request timeout in seconds (default: 5).
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum connections per IP address per minute (default: 30).
    #[serde(default = "default_connections_per_ip")]
    pub connections_per_ip: u32,
    /// Maximum messages per connection per minute (default: 120).
    #[serde(default = "default_messages_per_minute")]
    pub messages_per_minute: u32,
    /// Timeout in seconds for completing authentication after connect
    /// (default: 30). Connections that never authenticate are dropped.
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,
    /// Maximum number of live connections (default: 1000).
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,
    /// Global requests per second across all connections (default: 500).
    #[serde(default = "default_global_requests_per_second")]
    pub global_requests_per_second: u32,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Bind address for HTTP server (default: 127.0.0.1:8080).
    #[serde(default = "default_http_bind")]
    pub bind_address: String,
    /// Serve /health and /metrics (default: true).
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
}

/// Maintenance task configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Maintenance interval in seconds (default: 300).
    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,
    /// Enable maintenance task (default: true).
    #[serde(default = "default_cleanup_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "127.0.0.1:8765".to_string()
}

fn default_ping_interval() -> u64 {
    20
}

fn default_ping_timeout() -> u64 {
    10
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64KB
}

fn default_store_path() -> PathBuf {
    PathBuf::from("relay-store.json")
}

fn default_kdf_memory_kib() -> u32 {
    19 * 1024 // 19 MiB
}

fn default_kdf_iterations() -> u32 {
    2
}

fn default_seed_users() -> Vec<SeedUser> {
    vec![
        SeedUser {
            username: "Node1".to_string(),
            password: "secure_pass_node1".to_string(),
        },
        SeedUser {
            username: "Node2".to_string(),
            password: "secure_pass_node2".to_string(),
        },
    ]
}

fn default_source_url() -> String {
    "https://jsonplaceholder.typicode.com/posts/1".to_string()
}

fn default_source_timeout() -> u64 {
    5
}

fn default_connections_per_ip() -> u32 {
    30
}

fn default_messages_per_minute() -> u32 {
    120
}

fn default_auth_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_sessions() -> usize {
    1000
}

fn default_global_requests_per_second() -> u32 {
    500
}

fn default_http_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_http_enabled() -> bool {
    true
}

fn default_cleanup_interval() -> u64 {
    300 // 5 minutes
}

fn default_cleanup_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            ping_interval_secs: default_ping_interval(),
            ping_timeout_secs: default_ping_timeout(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            kdf_memory_kib: default_kdf_memory_kib(),
            kdf_iterations: default_kdf_iterations(),
            seed_users: default_seed_users(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: default_source_url(),
            timeout_secs: default_source_timeout(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            connections_per_ip: default_connections_per_ip(),
            messages_per_minute: default_messages_per_minute(),
            auth_timeout_secs: default_auth_timeout_secs(),
            max_concurrent_sessions: default_max_concurrent_sessions(),
            global_requests_per_second: default_global_requests_per_second(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_http_bind(),
            enabled: default_http_enabled(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval(),
            enabled: default_cleanup_enabled(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            source: SourceConfig::default(),
            limits: LimitsConfig::default(),
            http: HttpConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            Ok(Self::default())
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
