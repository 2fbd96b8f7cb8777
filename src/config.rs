//! # Configuration Management
//!
//! Centralized configuration for the messaging server.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults
//! - Environment overrides (`MUS_*` variables)
//!
//! ## Movie settings
//! `[movie_defaults]` applies to every movie; `[movies.<name>]` overrides
//! individual fields for one movie (name matched case-insensitively).
//! [`ServerSettings::movie_config`] resolves the effective settings.

use crate::error::{ProtocolError, Result};
use crate::utils::crypto::{MAX_KEY_LEN, MIN_KEY_LEN};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Max allowed frame body size (1 MB)
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Default listen port of multiuser servers.
pub const DEFAULT_PORT: u16 = 1626;

/// Name of the reserved group every user of a movie belongs to.
pub const ALL_USERS_GROUP: &str = "@AllUsers";

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ServerSettings {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub movie_defaults: MovieConfig,

    /// Per-movie overrides keyed by movie name.
    #[serde(default)]
    pub movies: HashMap<String, MovieOverrides>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerSettings {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Overrides fields from `MUS_*` environment variables. Unparseable
    /// values are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("MUS_SERVER_ADDRESS") {
            self.server.address = addr;
        }

        if let Ok(idle) = std::env::var("MUS_IDLE_TIMEOUT_MS") {
            if let Ok(val) = idle.parse::<u64>() {
                self.server.idle_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(max) = std::env::var("MUS_MAX_CONNECTIONS") {
            if let Ok(val) = max.parse::<usize>() {
                self.server.max_connections = val;
            }
        }

        if let Ok(key) = std::env::var("MUS_ENCRYPTION_KEY") {
            self.transport.encryption_key = (!key.is_empty()).then_some(key);
        }
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
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Effective settings for the named movie.
    pub fn movie_config(&self, movie: &str) -> MovieConfig {
        let mut config = self.movie_defaults.clone();
        if let Some((_, overrides)) = self
            .movies
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(movie))
        {
            overrides.apply(&mut config);
        }
        config
    }

    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.movie_defaults.validate("movie_defaults"));
        for (name, overrides) in &self.movies {
            let mut effective = self.movie_defaults.clone();
            overrides.apply(&mut effective);
            errors.extend(effective.validate(&format!("movies.{name}")));
        }
        errors.extend(self.logging.validate());

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Server-wide settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:1626")
    pub address: String,

    /// Name reported by `getVersion`
    pub server_name: String,

    /// Maximum number of concurrent connections
    pub max_connections: usize,

    /// Silence after which a connection is dropped; zero disables the check
    #[serde(with = "duration_serde")]
    pub idle_timeout: Duration,

    /// Time a new connection has to log on
    #[serde(with = "duration_serde")]
    pub logon_timeout: Duration,

    /// Timeout for graceful listener shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Delay applied by `system.server.restart`
    #[serde(with = "duration_serde")]
    pub restart_grace: Duration,

    /// Delay applied by `system.server.shutdown`
    #[serde(with = "duration_serde")]
    pub shutdown_grace: Duration,

    /// Level granted by the default credential store
    pub default_user_level: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: format!("0.0.0.0:{DEFAULT_PORT}"),
            server_name: String::from("multiuser-server"),
            max_connections: 1000,
            idle_timeout: timeout::IDLE_TIMEOUT,
            logon_timeout: timeout::LOGON_TIMEOUT,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
            restart_grace: timeout::RESTART_GRACE,
            shutdown_grace: timeout::SHUTDOWN_GRACE,
            default_user_level: 20,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:1626')",
                self.address
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        if !self.idle_timeout.is_zero() && self.idle_timeout.as_millis() < 1000 {
            errors.push("Idle timeout too short (minimum: 1s, or 0 to disable)".to_string());
        }

        if self.logon_timeout.as_millis() < 100 {
            errors.push("Logon timeout too short (minimum: 100ms)".to_string());
        } else if self.logon_timeout.as_secs() > 300 {
            errors.push("Logon timeout too long (maximum: 300s)".to_string());
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        if self.restart_grace.as_secs() > 3600 || self.shutdown_grace.as_secs() > 3600 {
            errors.push("Restart/shutdown grace too long (maximum: 1 hour)".to_string());
        }

        errors
    }
}

/// Framing settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum allowed frame body size in bytes
    pub max_payload_size: usize,

    /// When set, every connection uses encrypted framing with this key
    pub encryption_key: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
            encryption_key: None,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_payload_size < 64 {
            errors.push("Max payload size too small (minimum: 64 bytes)".to_string());
        } else if self.max_payload_size > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max payload size too large: {} bytes (maximum recommended: 100 MB)",
                self.max_payload_size
            ));
        }

        if let Some(key) = &self.encryption_key {
            if !(MIN_KEY_LEN..=MAX_KEY_LEN).contains(&key.len()) {
                errors.push(format!(
                    "Encryption key must be {MIN_KEY_LEN}..={MAX_KEY_LEN} bytes, got {}",
                    key.len()
                ));
            }
        }

        errors
    }
}

/// Effective settings of one movie
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MovieConfig {
    /// Maximum simultaneous users
    pub connection_limit: usize,

    /// Level needed to message users and groups
    pub messaging_user_level: i32,

    /// Level needed to message the all-users group
    pub messaging_all_user_level: i32,

    /// Groups told when a user disconnects
    pub notify_disconnect: Vec<String>,

    /// Member limits per group name
    pub group_size_limits: HashMap<String, usize>,

    /// Groups nobody may join
    pub disabled_groups: Vec<String>,

    /// Required level per system command, keyed `namespace.command`
    pub user_levels: HashMap<String, i32>,

    /// Keep the movie registered when its last user leaves
    pub persistent: bool,

    /// Extension handlers attached on creation
    pub extensions: Vec<String>,
}

impl Default for MovieConfig {
    fn default() -> Self {
        let admin = 80;
        let user_levels = [
            "server.restart",
            "server.shutdown",
            "server.disable",
            "server.enable",
            "server.disconnectAll",
            "server.sendEmail",
            "movie.enable",
            "movie.disable",
            "movie.delete",
            "movie.reloadAllScripts",
            "movie.reloadScript",
            "movie.deleteScript",
            "group.enable",
            "group.disable",
            "group.delete",
            "user.delete",
        ]
        .into_iter()
        .map(|cmd| (cmd.to_string(), admin))
        .collect();

        Self {
            connection_limit: 1000,
            messaging_user_level: 0,
            messaging_all_user_level: 0,
            notify_disconnect: Vec::new(),
            group_size_limits: HashMap::new(),
            disabled_groups: Vec::new(),
            user_levels,
            persistent: false,
            extensions: Vec::new(),
        }
    }
}

impl MovieConfig {
    pub fn validate(&self, section: &str) -> Vec<String> {
        let mut errors = Vec::new();

        if self.connection_limit == 0 {
            errors.push(format!("[{section}] connection_limit must be greater than 0"));
        }

        for group in self
            .notify_disconnect
            .iter()
            .chain(self.disabled_groups.iter())
            .chain(self.group_size_limits.keys())
        {
            if !group.starts_with('@') {
                errors.push(format!("[{section}] group name '{group}' must start with '@'"));
            }
        }

        for (group, limit) in &self.group_size_limits {
            if *limit == 0 {
                errors.push(format!("[{section}] size limit of {group} must be greater than 0"));
            }
        }

        for command in self.user_levels.keys() {
            if normalize_command_key(command).split('.').count() != 2 {
                errors.push(format!(
                    "[{section}] user level key '{command}' must be 'namespace.command'"
                ));
            }
        }

        errors
    }

    /// Required-level table keyed by normalized `NAMESPACE.COMMAND`.
    pub fn command_levels(&self) -> HashMap<String, i32> {
        self.user_levels
            .iter()
            .map(|(k, v)| (normalize_command_key(k), *v))
            .collect()
    }
}

/// Uppercases a command key and strips an optional `system.` prefix.
pub fn normalize_command_key(key: &str) -> String {
    let upper = key.trim().to_ascii_uppercase();
    match upper.strip_prefix("SYSTEM.") {
        Some(rest) => rest.to_string(),
        None => upper,
    }
}

/// Field-by-field overrides for one movie
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MovieOverrides {
    pub connection_limit: Option<usize>,
    pub messaging_user_level: Option<i32>,
    pub messaging_all_user_level: Option<i32>,
    pub notify_disconnect: Option<Vec<String>>,
    pub group_size_limits: Option<HashMap<String, usize>>,
    pub disabled_groups: Option<Vec<String>>,
    /// Merged into the defaults rather than replacing them
    pub user_levels: Option<HashMap<String, i32>>,
    pub persistent: Option<bool>,
    pub extensions: Option<Vec<String>>,
}

impl MovieOverrides {
    pub fn apply(&self, config: &mut MovieConfig) {
        if let Some(v) = self.connection_limit {
            config.connection_limit = v;
        }
        if let Some(v) = self.messaging_user_level {
            config.messaging_user_level = v;
        }
        if let Some(v) = self.messaging_all_user_level {
            config.messaging_all_user_level = v;
        }
        if let Some(v) = &self.notify_disconnect {
            config.notify_disconnect = v.clone();
        }
        if let Some(v) = &self.group_size_limits {
            config.group_size_limits = v.clone();
        }
        if let Some(v) = &self.disabled_groups {
            config.disabled_groups = v.clone();
        }
        if let Some(levels) = &self.user_levels {
            config
                .user_levels
                .extend(levels.iter().map(|(k, v)| (k.clone(), *v)));
        }
        if let Some(v) = self.persistent {
            config.persistent = v;
        }
        if let Some(v) = &self.extensions {
            config.extensions = v.clone();
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub app_name: String,

    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    pub log_to_console: bool,

    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("multiuser-server"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
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

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Durations are written as integer milliseconds
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

mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        level.as_str().to_ascii_lowercase().serialize(serializer)
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
