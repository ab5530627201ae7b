//! Event severity.
//!
//! Five levels, ordered by severity:
//!
//! ```text
//! error > warn > info > http > debug
//! ```
//!
//! `http` sits between `info` and `debug` and is used only by the access log.
//! A floor of `info` therefore hides access-log lines; set `LOG_LEVEL=http`
//! to see them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Severity of a [`LogEvent`](super::LogEvent).
///
/// The derived `Ord` follows declaration order, so `Level::Debug` is the
/// least severe and `Level::Error` the most.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Http,
    Info,
    Warn,
    Error,
}

impl Level {
    /// Lowercase name as written to log records (e.g. `"warn"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Http  => "http",
            Self::Info  => "info",
            Self::Warn  => "warn",
            Self::Error => "error",
        }
    }

    /// Whether a floor of `self` lets an event of `event` severity through.
    pub fn admits(self, event: Level) -> bool {
        event >= self
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a level name is not one of the five known levels.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level `{0}` (expected error, warn, info, http or debug)")]
pub struct ParseLevelError(pub String);

/// Case-insensitive: `"WARN"`, `"warn"` and `"Warn"` all parse.
impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "http"  => Ok(Self::Http),
            "info"  => Ok(Self::Info),
            "warn"  => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _       => Err(ParseLevelError(s.to_owned())),
        }
    }
}

/// `tracing` has no `http` level; `TRACE` folds into `debug`.
impl From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => Self::Error,
            tracing::Level::WARN  => Self::Warn,
            tracing::Level::INFO  => Self::Info,
            _                     => Self::Debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order_matches_names() {
        assert!(Level::Error > Level::Warn);
        assert!(Level::Warn > Level::Info);
        assert!(Level::Info > Level::Http);
        assert!(Level::Http > Level::Debug);
    }

    #[test]
    fn info_floor_rejects_http_but_admits_warn() {
        assert!(!Level::Info.admits(Level::Http));
        assert!(Level::Info.admits(Level::Info));
        assert!(Level::Info.admits(Level::Warn));
        assert!(Level::Error.admits(Level::Error));
        assert!(!Level::Error.admits(Level::Warn));
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("HTTP".parse::<Level>(), Ok(Level::Http));
        assert_eq!(" warn ".parse::<Level>(), Ok(Level::Warn));
        assert!("verbose".parse::<Level>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Level::Warn).unwrap(), r#""warn""#);
    }
}
