//! Catalog configuration.
//!
//! # Invariants
//! - Missing fields fall back to defaults; unknown fields are rejected.
//! - A config returned by `from_json_*` has already passed `validate`.

use crate::extension::kernel::DEFAULT_MRU_CAPACITY;
use crate::logging::normalize_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Largest accepted MRU ring size.
pub const MAX_MRU_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// MRU slots per registry, `1..=MAX_MRU_CAPACITY`.
    pub mru_capacity: usize,
    /// Optional log level for hosts that bootstrap logging from this config.
    pub log_level: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            mru_capacity: DEFAULT_MRU_CAPACITY,
            log_level: None,
        }
    }
}

impl CatalogConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mru_capacity == 0 || self.mru_capacity > MAX_MRU_CAPACITY {
            return Err(ConfigError::MruCapacityOutOfRange(self.mru_capacity));
        }
        if let Some(level) = &self.log_level {
            normalize_level(level).map_err(|_| ConfigError::InvalidLogLevel(level.clone()))?;
        }
        Ok(())
    }
}

/// Config loading and validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    Io { path: String, reason: String },
    MruCapacityOutOfRange(usize),
    InvalidLogLevel(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(reason) => write!(f, "config is not valid JSON: {reason}"),
            Self::Io { path, reason } => write!(f, "failed to read config `{path}`: {reason}"),
            Self::MruCapacityOutOfRange(value) => write!(
                f,
                "mru_capacity must be within 1..={MAX_MRU_CAPACITY}, got {value}"
            ),
            Self::InvalidLogLevel(value) => write!(f, "log_level is unsupported: `{value}`"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::{CatalogConfig, ConfigError, MAX_MRU_CAPACITY};

    #[test]
    fn defaults_to_eight_slots() {
        let config = CatalogConfig::default();
        assert_eq!(config.mru_capacity, 8);
        assert!(config.log_level.is_none());
        config.validate().expect("default config is valid");
    }

    #[test]
    fn rejects_out_of_range_capacity() {
        for capacity in [0, MAX_MRU_CAPACITY + 1] {
            let config = CatalogConfig {
                mru_capacity: capacity,
                log_level: None,
            };
            assert_eq!(
                config.validate().expect_err("capacity must be rejected"),
                ConfigError::MruCapacityOutOfRange(capacity)
            );
        }
    }

    #[test]
    fn accepts_known_log_levels_only() {
        let mut config = CatalogConfig {
            log_level: Some("Warning".to_string()),
            ..CatalogConfig::default()
        };
        config.validate().expect("warning is an alias of warn");

        config.log_level = Some("verbose".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }
}
