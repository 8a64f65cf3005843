use crate::core::db::ConnectOptions;
use crate::core::{OperatorError, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variable naming the configuration file for process defaults.
pub const CONFIG_ENV: &str = "SQL_OPERATOR_CONFIG";
pub const HOST_NAME_ENV: &str = "SQL_OPERATOR_HOST_NAME";
pub const USER_ENV: &str = "SQL_OPERATOR_USER";
pub const PASSWORD_ENV: &str = "SQL_OPERATOR_PASSWORD";

static DEFAULTS: Lazy<Settings> = Lazy::new(Settings::resolve);

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub retry: RetrySettings,
}

/// Default connection target.
#[derive(Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseSettings {
    pub host_name: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            host_name: "test.db".to_string(),
            user: "root".to_string(),
            password: String::new(),
        }
    }
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host_name", &self.host_name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection retry configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: 3,
            delay_ms: 1000,
        }
    }
}

/// How often and how patiently a connection is (re)established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connection attempts, never less than one
    pub max_attempts: u32,
    /// Pause before every attempt after the first
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetrySettings::default().policy()
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.delay_ms))
    }
}

impl Settings {
    /// Parses settings from TOML; missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| OperatorError::Config(e.to_string()))
    }

    /// Loads settings from a TOML file at the given path.
    ///
    /// # Example
    ///
    /// ```no_run
    /// let settings = sql_operator::config::Settings::load("config.toml").expect("Failed to load config");
    /// println!("{:?}", settings);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// `<config dir>/sql-operator/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sql-operator").join("config.toml"))
    }

    /// Overrides connection fields from `SQL_OPERATOR_*` environment variables.
    pub fn apply_env(mut self) -> Self {
        self.apply_vars(|name| std::env::var(name).ok());
        self
    }

    fn apply_vars<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(host_name) = lookup(HOST_NAME_ENV) {
            self.database.host_name = host_name;
        }
        if let Some(user) = lookup(USER_ENV) {
            self.database.user = user;
        }
        if let Some(password) = lookup(PASSWORD_ENV) {
            self.database.password = password;
        }
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions::new(
            self.database.host_name.as_str(),
            self.database.user.as_str(),
            self.database.password.as_str(),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }

    fn resolve() -> Self {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(|| Self::default_path().filter(|p| p.exists()));
        let settings = match path {
            Some(path) => match Self::load(&path) {
                Ok(settings) => {
                    debug!("loaded operator defaults from {:?}", path);
                    settings
                }
                Err(e) => {
                    warn!("ignoring config {:?}: {}", path, e);
                    Settings::default()
                }
            },
            None => Settings::default(),
        };
        settings.apply_env()
    }
}

/// Process-wide defaults, resolved once on first use.
pub fn defaults() -> &'static Settings {
    &DEFAULTS
}
