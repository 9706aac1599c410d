//! # Server configuration: `notes.toml` plus environment overrides
//!
//! [`ServerConfig::load`] reads the TOML file named by `NOTES_CONFIG` (default
//! [`ServerConfig::filename`]), where a missing file means defaults, then applies
//! environment variables (a `.env` file is honoured through `dotenvy`).
//!
//! ## Structure
//!
//! ```toml
//! bind = "127.0.0.1:8080"
//! database_url = "postgres://notes@localhost/notes"   # omit for the in-memory store
//! secure_cookies = false
//!
//! [session]
//! backend = "file"               # or "postgres"
//! file = "sessions.json"
//! inactivity_secs = 604800       # 7 days
//! fallback_ttl_secs = 86400
//! sweep_interval_secs = 60
//! ```
//!
//! ## Environment
//!
//! | Variable | Field |
//! |----------|-------|
//! | `DATABASE_URL` | `database_url` |
//! | `NOTES_BIND` | `bind` |
//! | `NOTES_SECURE_COOKIES` | `secure_cookies` |
//! | `NOTES_SESSION_BACKEND` | `session.backend` |
//! | `NOTES_SESSION_FILE` | `session.file` |

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Postgres connection string. None runs on the in-memory store.
    pub database_url: Option<String>,
    /// Mark the session cookie `Secure`; enable behind HTTPS.
    pub secure_cookies: bool,
    pub session: SessionConfig,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackendKind {
    #[default]
    File,
    Postgres,
}

impl std::str::FromStr for SessionBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(SessionBackendKind::File),
            "postgres" | "postgresql" => Ok(SessionBackendKind::Postgres),
            other => Err(format!("unknown session backend: {}", other)),
        }
    }
}

/// Session configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub backend: SessionBackendKind,
    /// JSON snapshot path for the file backend.
    pub file: PathBuf,
    /// Sessions expire after this much inactivity.
    pub inactivity_secs: u64,
    /// Lifetime of a record whose cookie carries no expiry.
    pub fallback_ttl_secs: u64,
    /// How often expired records are swept. 0 disables the sweep.
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            database_url: None,
            secure_cookies: false,
            session: SessionConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackendKind::File,
            file: PathBuf::from("sessions.json"),
            inactivity_secs: 60 * 60 * 24 * 7,
            fallback_ttl_secs: 60 * 60 * 24,
            sweep_interval_secs: 60,
        }
    }
}

/// Upper bound for every duration setting: 100 years.
const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

fn checked_secs(var: &'static str, secs: u64) -> Result<u64, ConfigError> {
    if secs > MAX_DURATION_SECS {
        return Err(ConfigError::Invalid {
            var,
            value: secs.to_string(),
        });
    }
    Ok(secs)
}

fn duration(secs: u64) -> time::Duration {
    let secs = i64::try_from(secs.min(MAX_DURATION_SECS)).unwrap_or(i64::MAX);
    time::Duration::seconds(secs)
}

impl SessionConfig {
    /// Reject durations that would overflow date arithmetic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        checked_secs("session.inactivity_secs", self.inactivity_secs)?;
        checked_secs("session.fallback_ttl_secs", self.fallback_ttl_secs)?;
        checked_secs("session.sweep_interval_secs", self.sweep_interval_secs)?;
        Ok(())
    }

    pub fn inactivity(&self) -> time::Duration {
        duration(self.inactivity_secs)
    }

    pub fn fallback_ttl(&self) -> time::Duration {
        duration(self.fallback_ttl_secs)
    }

    /// None when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<std::time::Duration> {
        (self.sweep_interval_secs > 0)
            .then(|| std::time::Duration::from_secs(self.sweep_interval_secs.min(MAX_DURATION_SECS)))
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        }),
    }
}

impl ServerConfig {
    /// The default config filename.
    pub fn filename() -> &'static str {
        "notes.toml"
    }

    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load from the config file and process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let path = std::env::var("NOTES_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(Self::filename()));

        let mut config = match std::fs::read_to_string(&path) {
            Ok(s) => Self::from_toml(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.session.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = var("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(bind) = var("NOTES_BIND") {
            self.bind = bind;
        }
        if let Some(secure) = var("NOTES_SECURE_COOKIES") {
            self.secure_cookies = parse_bool("NOTES_SECURE_COOKIES", &secure)?;
        }
        if let Some(backend) = var("NOTES_SESSION_BACKEND") {
            self.session.backend = backend.parse().map_err(|_| ConfigError::Invalid {
                var: "NOTES_SESSION_BACKEND",
                value: backend.clone(),
            })?;
        }
        if let Some(file) = var("NOTES_SESSION_FILE") {
            self.session.file = PathBuf::from(file);
        }
        Ok(())
    }
}
