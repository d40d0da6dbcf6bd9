//! Process configuration (ferry.toml)
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. the TOML file named by `FERRY_CONFIG`
//! 3. environment: `PANDA_SDK_PATH`, `PANDA_CLASS_PATH`, `FERRY_LOG`
//!
//! ```toml
//! sdk_path = "/opt/panda-sdk"
//! failure_policy = "propagate"
//! log_filter = "ferry=debug"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "FERRY_CONFIG";

/// Environment variable overriding `sdk_path`
pub const SDK_PATH_ENV: &str = "PANDA_SDK_PATH";

/// Environment variable overriding `class_path` and the VM loader directory
pub const CLASS_PATH_ENV: &str = "PANDA_CLASS_PATH";

/// Environment variable overriding `log_filter`
pub const LOG_ENV: &str = "FERRY_LOG";

/// Filter used when nothing else is configured
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Errors that can occur while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File that was attempted
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// File that was parsed
        path: PathBuf,
        /// Underlying parse error
        #[source]
        source: toml::de::Error,
    },
}

/// What to do when the compiler library cannot be loaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log and terminate the process
    #[default]
    Abort,
    /// Raise a recoverable error through the calling runtime
    Propagate,
}

/// Process-wide settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FerryConfig {
    /// Root of the Panda SDK (host tool directories live below it)
    pub sdk_path: Option<PathBuf>,

    /// Directory holding the compiler library, when not under the SDK
    pub library_path: Option<PathBuf>,

    /// Class path handed to the virtual machine loader
    pub class_path: Option<String>,

    /// Directory holding the VM loader library
    pub vm_loader_dir: Option<PathBuf>,

    /// Compiler library load failure handling
    pub failure_policy: FailurePolicy,

    /// `env_logger` filter directives
    pub log_filter: String,
}

impl Default for FerryConfig {
    fn default() -> Self {
        Self {
            sdk_path: None,
            library_path: None,
            class_path: None,
            vm_loader_dir: None,
            failure_policy: FailurePolicy::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl FerryConfig {
    /// Load from the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_sources(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for environment variables
    pub fn from_sources<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_ENV).filter(|p| !p.is_empty()) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(lookup);
        Ok(config)
    }

    /// Parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(sdk) = lookup(SDK_PATH_ENV).filter(|v| !v.is_empty()) {
            self.sdk_path = Some(PathBuf::from(sdk));
        }
        if let Some(class_path) = lookup(CLASS_PATH_ENV).filter(|v| !v.is_empty()) {
            self.class_path = Some(class_path);
        }
        if let Some(filter) = lookup(LOG_ENV).filter(|v| !v.is_empty()) {
            self.log_filter = filter;
        }
    }
}
