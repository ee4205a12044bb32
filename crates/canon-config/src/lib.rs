//! # canon-config
//!
//! Configuration management for canonpath.
//!
//! Loads configuration from:
//! 1. `~/.canon/config.toml` (global)
//! 2. `.canon/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod logging;

pub use logging::{init_logging, LogLevel};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard};
use tracing::debug;

/// Base32 characters available from a 32-byte fingerprint.
pub const MAX_NONCE_LEN: usize = 52;

/// Shortest nonce accepted; 16 base32 chars carry 80 bits.
pub const MIN_NONCE_LEN: usize = 16;

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::load().unwrap_or_default()));

/// Get global config (read-only)
pub fn config() -> RwLockReadGuard<'static, Config> {
    CONFIG.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reload config from disk
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    *CONFIG.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = new_config;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remap: RemapSettings,
    pub requirements: RequirementKeys,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        let mut config = Self::load_layers(global.as_deref(), Path::new(".canon/config.toml"))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load the global file (if any) and overlay the project file (if it exists).
    pub fn load_layers(global: Option<&Path>, project: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = global {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                let contents = std::fs::read_to_string(global_path)?;
                config = toml::from_str(&contents)?;
            }
        }

        if project.exists() {
            debug!("Loading project config from {:?}", project);
            let contents = std::fs::read_to_string(project)?;
            let project_config: Config = toml::from_str(&contents)?;
            config.merge(project_config);
        }

        Ok(config)
    }

    /// Global config path: ~/.canon/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".canon/config.toml"))
    }

    /// Merge another config; any field the other side changed from its default wins.
    fn merge(&mut self, other: Config) {
        let remap_default = RemapSettings::default();
        if other.remap.config_segment != remap_default.config_segment {
            self.remap.config_segment = other.remap.config_segment;
        }
        if other.remap.output_segment != remap_default.output_segment {
            self.remap.output_segment = other.remap.output_segment;
        }
        if other.remap.runfiles_segment != remap_default.runfiles_segment {
            self.remap.runfiles_segment = other.remap.runfiles_segment;
        }
        if other.remap.nonce_len != remap_default.nonce_len {
            self.remap.nonce_len = other.remap.nonce_len;
        }

        let keys_default = RequirementKeys::default();
        if other.requirements.supports_remapping != keys_default.supports_remapping {
            self.requirements.supports_remapping = other.requirements.supports_remapping;
        }
        if other.requirements.materialize_inputs != keys_default.materialize_inputs {
            self.requirements.materialize_inputs = other.requirements.materialize_inputs;
        }

        if other.logging.level != LoggingConfig::default().level {
            self.logging.level = other.logging.level;
        }
    }

    /// Apply overrides from a key lookup (the process environment in [`Config::load`]).
    ///
    /// Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(index) = lookup("CANON_CONFIG_SEGMENT").and_then(|v| v.parse().ok()) {
            self.remap.config_segment = index;
        }
        if let Some(len) = lookup("CANON_NONCE_LEN").and_then(|v| v.parse().ok()) {
            self.remap.nonce_len = len;
        }
        if let Some(level) = lookup("CANON_LOG").and_then(|v| v.parse().ok()) {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.remap.validate()?;
        self.requirements.validate()
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Config::default())?)
    }
}

/// Path remapping settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemapSettings {
    /// Index of the configuration-specific segment in an exec path
    pub config_segment: usize,
    /// Literal substituted for outputs of the current action
    pub output_segment: String,
    /// Literal substituted when building runfiles-relative paths
    pub runfiles_segment: String,
    /// Number of base32 characters kept from the per-action fingerprint
    pub nonce_len: usize,
}

impl Default for RemapSettings {
    fn default() -> Self {
        Self {
            config_segment: 0,
            output_segment: "out".to_string(),
            runfiles_segment: "run".to_string(),
            nonce_len: 25,
        }
    }
}

impl RemapSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_NONCE_LEN..=MAX_NONCE_LEN).contains(&self.nonce_len) {
            return Err(ConfigError::Invalid {
                field: "remap.nonce_len",
                reason: format!(
                    "{} is outside {}..={}",
                    self.nonce_len, MIN_NONCE_LEN, MAX_NONCE_LEN
                ),
            });
        }
        validate_segment("remap.output_segment", &self.output_segment)?;
        validate_segment("remap.runfiles_segment", &self.runfiles_segment)
    }
}

/// Execution-requirement flags recognized on an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequirementKeys {
    /// The action's tool accepts remapped paths
    pub supports_remapping: String,
    /// The tool opens inputs by path, so virtual paths must exist on disk
    pub materialize_inputs: String,
}

impl Default for RequirementKeys {
    fn default() -> Self {
        Self {
            supports_remapping: "supports-path-remapping".to_string(),
            materialize_inputs: "requires-materialized-input-paths".to_string(),
        }
    }
}

impl RequirementKeys {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supports_remapping.is_empty() {
            return Err(ConfigError::Invalid {
                field: "requirements.supports_remapping",
                reason: "must not be empty".to_string(),
            });
        }
        if self.materialize_inputs.is_empty() {
            return Err(ConfigError::Invalid {
                field: "requirements.materialize_inputs",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

fn validate_segment(field: &'static str, segment: &str) -> Result<(), ConfigError> {
    if segment.is_empty() || segment.contains('/') || segment == "." || segment == ".." {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{:?} is not a single path segment", segment),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.remap.config_segment, 0);
        assert_eq!(config.remap.output_segment, "out");
        assert_eq!(config.remap.runfiles_segment, "run");
        assert_eq!(config.remap.nonce_len, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml().unwrap();
        assert!(toml_str.contains("[remap]"));
        assert!(toml_str.contains("[requirements]"));
        assert!(toml_str.contains("supports-path-remapping"));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("CANON_CONFIG_SEGMENT", "1"),
            ("CANON_NONCE_LEN", "32"),
            ("CANON_LOG", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.remap.config_segment, 1);
        assert_eq!(config.remap.nonce_len, 32);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_unparseable_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|k| (k == "CANON_NONCE_LEN").then(|| "many".to_string()));
        assert_eq!(config.remap.nonce_len, 25);
    }

    #[test]
    fn test_nonce_len_bounds() {
        let mut settings = RemapSettings::default();
        settings.nonce_len = MIN_NONCE_LEN - 1;
        assert!(settings.validate().is_err());
        settings.nonce_len = MAX_NONCE_LEN + 1;
        assert!(settings.validate().is_err());
        settings.nonce_len = MAX_NONCE_LEN;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_segment_literals_must_be_single_segments() {
        let mut settings = RemapSettings::default();
        settings.output_segment = "a/b".to_string();
        assert!(settings.validate().is_err());
        settings.output_segment = "..".to_string();
        assert!(settings.validate().is_err());
        settings.output_segment = String::new();
        assert!(settings.validate().is_err());
    }
}
