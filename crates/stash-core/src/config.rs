//! Stash Configuration Management
//!
//! Handles configuration from environment variables and TOML config files
//! with sensible defaults for development. Read once at process start.

use crate::OwnershipPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Development-only signing secret; a warning is logged when it is in use
pub const DEFAULT_JWT_SECRET: &str = "supersecretkey";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database connection
    pub database: DatabaseConfig,

    /// Token, password and revocation settings
    pub auth: AuthConfig,

    /// Item access settings
    pub items: ItemsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|message| ConfigError::ParseError { path, message })
    }

    fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Apply environment variables on top of this configuration (env wins)
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        // Server
        if let Some(host) = lookup("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("API_PORT") {
            self.server.port = parse_value("API_PORT", port)?;
        }
        if let Some(origins) = lookup("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Database
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(max) = lookup("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_value("DATABASE_MAX_CONNECTIONS", max)?;
        }

        // Auth
        if let Some(secret) = lookup("JWT_SECRET_KEY") {
            self.auth.jwt_secret = secret;
        }
        if let Some(issuer) = lookup("JWT_ISSUER") {
            self.auth.jwt_issuer = issuer;
        }
        if let Some(secs) = lookup("JWT_ACCESS_EXPIRATION_SECS") {
            self.auth.access_expiration_secs = parse_value("JWT_ACCESS_EXPIRATION_SECS", secs)?;
        }
        if let Some(backend) = lookup("STASH_REVOCATION_BACKEND") {
            self.auth.revocation_backend = backend.parse()?;
        }
        if let Some(secs) = lookup("STASH_REVOCATION_PURGE_SECS") {
            self.auth.revocation_purge_interval_secs =
                parse_value("STASH_REVOCATION_PURGE_SECS", secs)?;
        }

        // Items
        if let Some(hide) = lookup("STASH_HIDE_FOREIGN_ITEMS") {
            self.items.hide_foreign_items = parse_value("STASH_HIDE_FOREIGN_ITEMS", hide)?;
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.json_format = format.eq_ignore_ascii_case("json");
        }

        Ok(self)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::MissingRequired("JWT_SECRET_KEY".to_string()));
        }
        if self.auth.access_expiration_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "JWT_ACCESS_EXPIRATION_SECS".to_string(),
                value: "0".to_string(),
            });
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DATABASE_MAX_CONNECTIONS".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Whether the built-in development secret is still in use
    pub fn uses_default_secret(&self) -> bool {
        self.auth.jwt_secret == DEFAULT_JWT_SECRET
    }
}

fn parse_value<T: FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed origins for CORS (empty allows any origin)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec![],
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,

    /// Connection pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://local.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret used to sign access tokens
    pub jwt_secret: String,

    /// Issuer claim written into and required from tokens
    pub jwt_issuer: String,

    /// Access token validity window in seconds
    pub access_expiration_secs: u64,

    /// Where revoked token ids are kept
    pub revocation_backend: RevocationBackend,

    /// How often expired revocation entries are dropped
    pub revocation_purge_interval_secs: u64,

    /// Argon2 cost parameters
    pub password: PasswordParams,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            jwt_issuer: "stash-api".to_string(),
            access_expiration_secs: 900, // 15 minutes
            revocation_backend: RevocationBackend::Database,
            revocation_purge_interval_secs: 3600,
            password: PasswordParams::default(),
        }
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordParams {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Iterations
    pub time_cost: u32,
    /// Lanes
    pub parallelism: u32,
}

impl Default for PasswordParams {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MB
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Storage backend for the revocation registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevocationBackend {
    /// Process-lifetime set, lost on restart
    Memory,
    /// `revoked_tokens` table, survives restarts
    Database,
}

impl FromStr for RevocationBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "database" | "db" => Ok(Self::Database),
            _ => Err(ConfigError::InvalidValue {
                key: "STASH_REVOCATION_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Item access configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemsConfig {
    /// Report items owned by someone else as missing (404) instead of 403
    pub hide_foreign_items: bool,
}

impl ItemsConfig {
    pub fn ownership_policy(&self) -> OwnershipPolicy {
        if self.hide_foreign_items {
            OwnershipPolicy::ConcealAsNotFound
        } else {
            OwnershipPolicy::RevealForbidden
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
