//! Runtime configuration for the state layer.
//!
//! # Responsibility
//! - Collect platform, storage location and policy inputs in one value.
//! - Read overrides from `AUTHFLOW_*` environment variables.
//!
//! # Invariants
//! - Config is resolved once at startup; backend routing derived from it
//!   never changes afterwards.

use crate::onboarding::BootstrapOptions;
use crate::storage::{Platform, SecureFallback};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const ENV_DATA_DIR: &str = "AUTHFLOW_DATA_DIR";
pub const ENV_PLATFORM: &str = "AUTHFLOW_PLATFORM";
pub const ENV_SECURE_FALLBACK: &str = "AUTHFLOW_SECURE_FALLBACK";
pub const ENV_DEV_MODE: &str = "AUTHFLOW_DEV_MODE";
pub const ENV_INITIAL_STEP: &str = "AUTHFLOW_INITIAL_STEP";
pub const ENV_MAX_STEP: &str = "AUTHFLOW_MAX_STEP";

/// Last step index of the onboarding flow unless the UI says otherwise.
pub const DEFAULT_MAX_STEP: u32 = 20;

const KV_DB_FILE_NAME: &str = "authflow_state.sqlite3";
const LOCAL_STORAGE_FILE_NAME: &str = "local_storage.json";
const CREDENTIALS_DIR_NAME: &str = "credentials";
const LOG_DIR_NAME: &str = "logs";
const DEFAULT_DATA_DIR_NAME: &str = "authflow";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue { var: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { var, message } => write!(f, "invalid {var}: {message}"),
        }
    }
}

impl Error for ConfigError {}

/// Resolved state-layer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateConfig {
    pub data_dir: PathBuf,
    pub platform: Platform,
    pub secure_fallback: SecureFallback,
    /// Development builds start fresh installs at a later step.
    pub dev_mode: bool,
    /// Raw starting-step override; clamped by the onboarding bootstrap.
    pub initial_step: Option<i64>,
    pub max_step: u32,
}

impl StateConfig {
    /// Defaults for `data_dir` on the current platform.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            platform: Platform::current(),
            secure_fallback: SecureFallback::default(),
            dev_mode: cfg!(debug_assertions),
            initial_step: None,
            max_step: DEFAULT_MAX_STEP,
        }
    }

    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds config from an arbitrary variable lookup. Blank values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let data_dir = read(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_DATA_DIR_NAME));
        let mut config = Self::new(data_dir);

        if let Some(raw) = read(ENV_PLATFORM) {
            config.platform = raw.parse().map_err(|message| ConfigError::InvalidValue {
                var: ENV_PLATFORM,
                message,
            })?;
        }
        if let Some(raw) = read(ENV_SECURE_FALLBACK) {
            config.secure_fallback =
                raw.parse().map_err(|message| ConfigError::InvalidValue {
                    var: ENV_SECURE_FALLBACK,
                    message,
                })?;
        }
        if let Some(raw) = read(ENV_DEV_MODE) {
            config.dev_mode = parse_flag(ENV_DEV_MODE, &raw)?;
        }
        if let Some(raw) = read(ENV_INITIAL_STEP) {
            config.initial_step =
                Some(raw.parse::<i64>().map_err(|err| ConfigError::InvalidValue {
                    var: ENV_INITIAL_STEP,
                    message: format!("`{raw}` is not an integer: {err}"),
                })?);
        }
        if let Some(raw) = read(ENV_MAX_STEP) {
            config.max_step = raw.parse::<u32>().map_err(|err| ConfigError::InvalidValue {
                var: ENV_MAX_STEP,
                message: format!("`{raw}` is not a non-negative integer: {err}"),
            })?;
        }

        Ok(config)
    }

    pub fn kv_db_path(&self) -> PathBuf {
        self.data_dir.join(KV_DB_FILE_NAME)
    }

    pub fn local_storage_path(&self) -> PathBuf {
        self.data_dir.join(LOCAL_STORAGE_FILE_NAME)
    }

    pub fn credentials_dir(&self) -> PathBuf {
        self.data_dir.join(CREDENTIALS_DIR_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIR_NAME)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn bootstrap_options(&self) -> BootstrapOptions {
        BootstrapOptions {
            platform: self.platform,
            dev_mode: self.dev_mode,
            initial_step: self.initial_step,
            max_step: self.max_step,
        }
    }
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            var,
            message: format!("`{other}` is not a boolean flag"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ConfigError, StateConfig, DEFAULT_MAX_STEP, ENV_DATA_DIR, ENV_DEV_MODE, ENV_INITIAL_STEP,
        ENV_MAX_STEP, ENV_PLATFORM, ENV_SECURE_FALLBACK,
    };
    use crate::storage::{Platform, SecureFallback};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = StateConfig::from_lookup(lookup(&[])).expect("defaults should resolve");
        assert_eq!(config.platform, Platform::current());
        assert_eq!(config.secure_fallback, SecureFallback::PlainStorage);
        assert_eq!(config.initial_step, None);
        assert_eq!(config.max_step, DEFAULT_MAX_STEP);
        assert!(config.data_dir.ends_with("authflow"));
    }

    #[test]
    fn overrides_are_applied() {
        let config = StateConfig::from_lookup(lookup(&[
            (ENV_DATA_DIR, "/data/app"),
            (ENV_PLATFORM, "web"),
            (ENV_SECURE_FALLBACK, "refuse"),
            (ENV_DEV_MODE, "off"),
            (ENV_INITIAL_STEP, "-4"),
            (ENV_MAX_STEP, "12"),
        ]))
        .expect("overrides should resolve");

        assert_eq!(config.data_dir, PathBuf::from("/data/app"));
        assert_eq!(config.platform, Platform::Web);
        assert_eq!(config.secure_fallback, SecureFallback::Refuse);
        assert!(!config.dev_mode);
        assert_eq!(config.initial_step, Some(-4));
        assert_eq!(config.max_step, 12);
        assert_eq!(config.kv_db_path(), PathBuf::from("/data/app/authflow_state.sqlite3"));
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = StateConfig::from_lookup(lookup(&[(ENV_INITIAL_STEP, "   ")]))
            .expect("blank value should be ignored");
        assert_eq!(config.initial_step, None);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = StateConfig::from_lookup(lookup(&[(ENV_INITIAL_STEP, "five")]))
            .expect_err("non-integer step must fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                var: ENV_INITIAL_STEP,
                ..
            }
        ));

        let err = StateConfig::from_lookup(lookup(&[(ENV_DEV_MODE, "maybe")]))
            .expect_err("unknown flag must fail");
        assert!(err.to_string().contains(ENV_DEV_MODE));
    }
}
