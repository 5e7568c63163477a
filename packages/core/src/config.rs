//! Tree service configuration
//!
//! Loaded from a JSON file or built from defaults, then adjusted through
//! `SITETREE_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Upper bound on parent hops when walking toward a root
///
/// Any walk that needs more hops than this is treated as a corrupt tree (cycle
/// or runaway depth) and abandoned.
pub const MAX_PATH_HOPS: usize = 1000;

/// Default busy timeout for database connections (milliseconds)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

pub const ENV_DB_PATH: &str = "SITETREE_DB_PATH";
pub const ENV_MAX_PATH_HOPS: &str = "SITETREE_MAX_PATH_HOPS";
pub const ENV_LOGIN_GATE_TYPE: &str = "SITETREE_LOGIN_GATE_TYPE";
pub const ENV_SINGLE_ROOT: &str = "SITETREE_SINGLE_ROOT";
pub const ENV_BUSY_TIMEOUT_MS: &str = "SITETREE_BUSY_TIMEOUT_MS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid value '{value}' for {variable}")]
    InvalidEnv { variable: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the tree services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Location of the libsql database file
    pub database_path: PathBuf,

    /// Bound on parent hops for path, breadcrumb and lock walks
    pub max_path_hops: usize,

    /// Content type whose own placements always start with `login_required`
    pub login_gate_content_type: Option<i64>,

    /// Reject a second top-level node under the virtual root
    pub single_root: bool,

    /// Busy timeout applied to every connection (milliseconds)
    pub busy_timeout_ms: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("sitetree.db"),
            max_path_hops: MAX_PATH_HOPS,
            login_gate_content_type: None,
            single_root: false,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl TreeConfig {
    /// Defaults with a specific database location
    pub fn with_database_path(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: path.into(),
            ..Self::default()
        }
    }

    /// Load a configuration file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `SITETREE_*` overrides from the process environment
    pub fn apply_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(value) = lookup(ENV_MAX_PATH_HOPS) {
            self.max_path_hops = parse_env(ENV_MAX_PATH_HOPS, &value)?;
        }
        if let Some(value) = lookup(ENV_LOGIN_GATE_TYPE) {
            self.login_gate_content_type = if value.trim().is_empty() {
                None
            } else {
                Some(parse_env(ENV_LOGIN_GATE_TYPE, &value)?)
            };
        }
        if let Some(value) = lookup(ENV_SINGLE_ROOT) {
            self.single_root = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        variable: ENV_SINGLE_ROOT,
                        value,
                    })
                }
            };
        }
        if let Some(value) = lookup(ENV_BUSY_TIMEOUT_MS) {
            self.busy_timeout_ms = parse_env(ENV_BUSY_TIMEOUT_MS, &value)?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_path_hops == 0 {
            return Err(ConfigError::Invalid(
                "max_path_hops must be greater than 0".to_string(),
            ));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "database_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(variable: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        variable,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TreeConfig::default();
        assert_eq!(config.max_path_hops, 1000);
        assert_eq!(config.busy_timeout_ms, 5000);
        assert!(!config.single_root);
        assert!(config.login_gate_content_type.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = TreeConfig::default()
            .apply_overrides(lookup(&[
                (ENV_DB_PATH, "/tmp/tree.db"),
                (ENV_MAX_PATH_HOPS, "50"),
                (ENV_LOGIN_GATE_TYPE, "7"),
                (ENV_SINGLE_ROOT, "true"),
            ]))
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/tree.db"));
        assert_eq!(config.max_path_hops, 50);
        assert_eq!(config.login_gate_content_type, Some(7));
        assert!(config.single_root);
    }

    #[test]
    fn test_invalid_env_value_is_rejected() {
        let result = TreeConfig::default().apply_overrides(lookup(&[(ENV_MAX_PATH_HOPS, "lots")]));
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));

        let result = TreeConfig::default().apply_overrides(lookup(&[(ENV_MAX_PATH_HOPS, "0")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tree.json");
        std::fs::write(&path, r#"{ "single_root": true, "login_gate_content_type": 3 }"#).unwrap();

        let config = TreeConfig::from_json_file(&path).unwrap();
        assert!(config.single_root);
        assert_eq!(config.login_gate_content_type, Some(3));
        assert_eq!(config.max_path_hops, MAX_PATH_HOPS);
    }
}
