//! Configuration module for TALKING.

use serde::Deserialize;
use std::path::Path;

use crate::{Result, TalkingError};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/talking.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/talking.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Token verification configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the token issuer.
    #[serde(default)]
    pub jwt_secret: String,
}

/// Chat behaviour configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Prefix that marks a message as a bot command.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Number of messages returned by room history queries.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
}

fn default_command_prefix() -> String {
    "!".to_string()
}

fn default_history_limit() -> u32 {
    100
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            history_limit: default_history_limit(),
        }
    }
}

/// Where an auto role lands when a user enters a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoRolePolicy {
    /// Overwrite the user's global role.
    #[default]
    Global,
    /// Keep the role as an in-memory overlay for that room only.
    Room,
}

/// Moderation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ModerationConfig {
    /// Scope of roles applied from the auto role table.
    #[serde(default)]
    pub auto_role_policy: AutoRolePolicy,
    /// Reason used when `!kick` is given none.
    #[serde(default = "default_kick_reason")]
    pub default_kick_reason: String,
    /// Reason used when `!ban`/`!gban` is given none.
    #[serde(default = "default_ban_reason")]
    pub default_ban_reason: String,
}

fn default_kick_reason() -> String {
    "No reason given".to_string()
}

fn default_ban_reason() -> String {
    "Violation of the rules".to_string()
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            auto_role_policy: AutoRolePolicy::default(),
            default_kick_reason: default_kick_reason(),
            default_ban_reason: default_ban_reason(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Token verification.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Chat behaviour.
    #[serde(default)]
    pub chat: ChatConfig,
    /// Moderation behaviour.
    #[serde(default)]
    pub moderation: ModerationConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(TalkingError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| TalkingError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `TALKING_JWT_SECRET`: token verification secret
    /// - `TALKING_DATABASE_PATH`: SQLite file path
    /// - `TALKING_PORT`: listen port
    pub fn apply_env_overrides(&mut self) {
        if let Ok(jwt_secret) = std::env::var("TALKING_JWT_SECRET") {
            if !jwt_secret.is_empty() {
                self.auth.jwt_secret = jwt_secret;
            }
        }

        if let Ok(path) = std::env::var("TALKING_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }

        if let Ok(port) = std::env::var("TALKING_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid TALKING_PORT value: {port}"),
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - the JWT secret is not set
    /// - the command prefix is empty or contains whitespace
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(TalkingError::Config(
                "jwt_secret is not set. \
                 Set it in config.toml or via TALKING_JWT_SECRET environment variable."
                    .to_string(),
            ));
        }
        if self.chat.command_prefix.is_empty()
            || self.chat.command_prefix.chars().any(char::is_whitespace)
        {
            return Err(TalkingError::Config(format!(
                "invalid command_prefix: {:?}",
                self.chat.command_prefix
            )));
        }
        Ok(())
    }
}
