//! Environment-driven settings, resolved once at startup.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `ENVIRONMENT_MODE` | `development` | `development` or `production`: console format, stack exposure, health-log suppression |
//! | `LOG_LEVEL` | `info` | global severity floor |
//! | `SERVICE_NAME` | `express-app` | `service` tag on every event |
//! | `HOST` | `localhost` | listen host |
//! | `PORT` | `3000` | listen port |
//! | `LOG_DIR` | `logs` | directory for log files |
//!
//! A `.env` file in the working directory is loaded first if present; real
//! environment variables win over it.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::log::{Level, ParseLevelError};

/// Running mode.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production  => "production",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "production"  => Ok(Self::Production),
            _             => Err(ConfigError::Mode(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("ENVIRONMENT_MODE must be `development` or `production`, got `{0}`")]
    Mode(String),
    #[error("LOG_LEVEL: {0}")]
    Level(#[from] ParseLevelError),
    #[error("PORT must be a number between 0 and 65535, got `{0}`")]
    Port(String),
}

/// Immutable process configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub mode: Mode,
    pub log_level: Level,
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub log_dir: PathBuf,
    /// Keep diagnostic traces out of client responses. True outside development.
    pub redact_stack: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::Development,
            log_level: Level::Info,
            service_name: "express-app".to_owned(),
            host: "localhost".to_owned(),
            port: 3000,
            log_dir: PathBuf::from("logs"),
            redact_stack: false,
        }
    }
}

impl Settings {
    /// Read the process environment (after loading `.env`, if any).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let mode = get("ENVIRONMENT_MODE").map(|v| v.parse::<Mode>()).transpose()?.unwrap_or(defaults.mode);
        let log_level = get("LOG_LEVEL").map(|v| v.parse::<Level>()).transpose()?.unwrap_or(defaults.log_level);
        let port = match get("PORT") {
            Some(v) => v.trim().parse::<u16>().map_err(|_| ConfigError::Port(v))?,
            None => defaults.port,
        };

        Ok(Self {
            mode,
            log_level,
            service_name: get("SERVICE_NAME").unwrap_or(defaults.service_name),
            host: get("HOST").unwrap_or(defaults.host),
            port,
            log_dir: get("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
            redact_stack: mode != Mode::Development,
        })
    }
}
