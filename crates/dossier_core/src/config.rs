//! Core runtime configuration.
//!
//! # Responsibility
//! - Describe service endpoints, timeouts and matching knobs in one record.
//! - Load it from JSON or `DOSSIER_*` environment variables and validate it.
//!
//! # Invariants
//! - Every field has a default; an empty JSON object is a valid config.
//! - Validated configs have non-zero timeouts and http(s) endpoints.

use crate::logging::default_log_level;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SWITCH_SAVE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_CANDIDATE_LIMIT: usize = 3;
const DEFAULT_MIN_AUTO_PLACE_SCORE: u32 = 1;

/// Configuration loading/validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    InvalidValue { key: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "invalid config document: {message}"),
            Self::InvalidValue { key, message } => write!(f, "invalid config `{key}`: {message}"),
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// External requirement-parsing endpoint. `None` disables the remote path.
    pub parse_url: Option<String>,
    /// External matching endpoint. `None` disables remote suggestions.
    pub match_url: Option<String>,
    pub request_timeout_ms: u64,
    /// Upper bound for the save that guards a project switch.
    pub switch_save_timeout_ms: u64,
    /// Number of ranked candidates attached to a placeholder.
    pub candidate_limit: usize,
    /// Minimum local score for auto-placement.
    pub min_auto_place_score: u32,
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            parse_url: None,
            match_url: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            switch_save_timeout_ms: DEFAULT_SWITCH_SAVE_TIMEOUT_MS,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            min_auto_place_score: DEFAULT_MIN_AUTO_PLACE_SCORE,
            log_level: default_log_level().to_string(),
        }
    }
}

impl CoreConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a config from `DOSSIER_*` environment variables over defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = non_empty("DOSSIER_PARSE_URL") {
            config.parse_url = Some(value.trim().to_string());
        }
        if let Some(value) = non_empty("DOSSIER_MATCH_URL") {
            config.match_url = Some(value.trim().to_string());
        }
        if let Some(value) = non_empty("DOSSIER_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = parse_millis("request_timeout_ms", &value)?;
        }
        if let Some(value) = non_empty("DOSSIER_SWITCH_SAVE_TIMEOUT_MS") {
            config.switch_save_timeout_ms = parse_millis("switch_save_timeout_ms", &value)?;
        }
        if let Some(value) = non_empty("DOSSIER_CANDIDATE_LIMIT") {
            config.candidate_limit = parse_number("candidate_limit", &value)?;
        }
        if let Some(value) = non_empty("DOSSIER_MIN_AUTO_PLACE_SCORE") {
            config.min_auto_place_score = parse_number("min_auto_place_score", &value)?;
        }
        if let Some(value) = non_empty("DOSSIER_LOG_LEVEL") {
            config.log_level = value.trim().to_string();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.switch_save_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "switch_save_timeout_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        validate_url("parse_url", self.parse_url.as_deref())?;
        validate_url("match_url", self.match_url.as_deref())?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn switch_save_timeout(&self) -> Duration {
        Duration::from_millis(self.switch_save_timeout_ms)
    }
}

fn parse_millis(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            message: format!("`{}` is not a millisecond count: {err}", raw.trim()),
        })
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            message: format!("`{}` is not a non-negative integer: {err}", raw.trim()),
        })
}

fn validate_url(key: &'static str, url: Option<&str>) -> Result<(), ConfigError> {
    let Some(url) = url else {
        return Ok(());
    };
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(());
    }
    Err(ConfigError::InvalidValue {
        key,
        message: format!("`{url}` must start with http:// or https://"),
    })
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig};
    use std::collections::HashMap;

    #[test]
    fn empty_document_yields_defaults() {
        let config = CoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.switch_save_timeout().as_millis(), 2000);
    }

    #[test]
    fn json_rejects_zero_timeout() {
        let err = CoreConfig::from_json_str(r#"{"switch_save_timeout_ms": 0}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "switch_save_timeout_ms",
                ..
            }
        ));
    }

    #[test]
    fn lookup_overrides_defaults_and_validates_urls() {
        let vars = HashMap::from([
            ("DOSSIER_PARSE_URL", "http://127.0.0.1:8000/parse"),
            ("DOSSIER_REQUEST_TIMEOUT_MS", "250"),
            ("DOSSIER_MATCH_URL", "  "),
        ]);
        let config =
            CoreConfig::from_lookup(|key| vars.get(key).map(|value| value.to_string())).unwrap();
        assert_eq!(config.parse_url.as_deref(), Some("http://127.0.0.1:8000/parse"));
        assert_eq!(config.match_url, None);
        assert_eq!(config.request_timeout_ms, 250);

        let knobs = HashMap::from([
            ("DOSSIER_CANDIDATE_LIMIT", "5"),
            ("DOSSIER_MIN_AUTO_PLACE_SCORE", " 4 "),
        ]);
        let config =
            CoreConfig::from_lookup(|key| knobs.get(key).map(|value| value.to_string())).unwrap();
        assert_eq!(config.candidate_limit, 5);
        assert_eq!(config.min_auto_place_score, 4);

        let bad = HashMap::from([("DOSSIER_CANDIDATE_LIMIT", "-1")]);
        assert!(CoreConfig::from_lookup(|key| bad.get(key).map(|v| v.to_string())).is_err());

        let bad = HashMap::from([("DOSSIER_MATCH_URL", "ftp://host/match")]);
        assert!(CoreConfig::from_lookup(|key| bad.get(key).map(|v| v.to_string())).is_err());
    }
}
