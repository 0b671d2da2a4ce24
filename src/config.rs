//! Configuration management for glowdcc
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files with support for environment variable
//! overrides of the account credentials.
//!
//! Refresh and staleness constants are deliberately absent: they are fixed
//! policy owned by [`crate::coordinator::RefreshPolicy`].

use crate::error::{GlowError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod defaults;

pub use defaults::{DEFAULT_APPLICATION_ID, DEFAULT_BASE_URL};

/// Environment variable overriding `account.username`
pub const USERNAME_ENV: &str = "GLOWDCC_USERNAME";

/// Environment variable overriding `account.password`
pub const PASSWORD_ENV: &str = "GLOWDCC_PASSWORD";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Glowmarkt account credentials and endpoint
    pub account: AccountConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Sensor state API binding configuration
    pub web: WebConfig,

    /// Host polling cadence in seconds
    pub poll_interval_secs: u64,

    /// IANA timezone used for day boundaries
    pub timezone: String,
}

/// Account credentials
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Bright app username (e-mail)
    pub username: String,

    /// Bright app password
    pub password: String,

    /// Glowmarkt application id
    pub application_id: String,

    /// API base URL
    pub base_url: String,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("application_id", &self.application_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Whether to serve the sensor state API
    pub enabled: bool,

    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "glowdcc.yaml",
            "/data/glowdcc.yaml",
            "/etc/glowdcc/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Credentials from the environment take precedence over the file
    fn apply_env_overrides(&mut self) {
        if let Ok(username) = std::env::var(USERNAME_ENV)
            && !username.trim().is_empty()
        {
            self.account.username = username;
        }
        if let Ok(password) = std::env::var(PASSWORD_ENV)
            && !password.is_empty()
        {
            self.account.password = password;
        }
    }

    /// Parsed timezone
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| GlowError::validation("timezone", e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.account.username.trim().is_empty() {
            return Err(GlowError::validation(
                "account.username",
                "Username cannot be empty",
            ));
        }

        if self.account.password.is_empty() {
            return Err(GlowError::validation(
                "account.password",
                "Password cannot be empty",
            ));
        }

        if !self.account.base_url.starts_with("http://")
            && !self.account.base_url.starts_with("https://")
        {
            return Err(GlowError::validation(
                "account.base_url",
                "Must be an http(s) URL",
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(GlowError::validation(
                "poll_interval_secs",
                "Must be greater than 0",
            ));
        }

        if self.web.enabled && self.web.port == 0 {
            return Err(GlowError::validation(
                "web.port",
                "Port must be greater than 0",
            ));
        }

        self.tz()?;
        crate::logging::parse_log_level(&self.logging.level)?;

        Ok(())
    }
}
