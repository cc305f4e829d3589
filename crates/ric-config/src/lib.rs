// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

use ric_core::DepsUsagePolicy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors raised while loading or validating a [`RuntimeConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The TOML file could not be read from disk.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML file's contents did not parse.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path whose contents failed to parse.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// The merged document failed schema validation.
    #[error("config failed validation: {0}")]
    Invalid(String),

    /// An environment variable held a value of the wrong shape.
    #[error("environment variable {name} has an invalid value: {value}")]
    InvalidEnvVar {
        /// The offending variable name.
        name: String,
        /// The value that failed to parse.
        value: String,
    },
}

/// Log output format selected for the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, colorized terminal output.
    #[default]
    Pretty,
    /// Newline-delimited JSON, suitable for log aggregation.
    Json,
}

/// Process-wide configuration for the worker orchestration runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Root directory under which the artifact store persists `<key>.json`
    /// / `<key>.meta.json` files.
    pub cache_root: PathBuf,
    /// Path to the usage-ledger JSON file (§4.5 layer 7).
    pub ledger_path: PathBuf,
    /// Policy applied to declared-but-unread `requires` keys (§4.2).
    pub deps_usage_policy: DepsUsagePolicy,
    /// Extra string folded into every worker's model-defaults salt, on top
    /// of the registry's own `defaultsSalt()` (§4.6).
    pub default_salt_extra: String,
    /// Prefix list tried, in order, by the env-driven rate limiter (§6).
    pub env_prefixes: Vec<String>,
    /// `tracing` subscriber output format.
    pub log_format: LogFormat,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from(".ric-cache"),
            ledger_path: PathBuf::from(".ric-cache/usage-ledger.json"),
            deps_usage_policy: DepsUsagePolicy::Error,
            default_salt_extra: String::new(),
            env_prefixes: vec!["RIC".to_string()],
            log_format: LogFormat::Pretty,
        }
    }
}

impl RuntimeConfig {
    /// Build a config by merging, in order: built-in defaults, an optional
    /// TOML file at `path`, then `RIC_*` environment overrides, validating
    /// the merged document against this struct's JSON Schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, if
    /// an environment override has the wrong shape, or if the merged
    /// document fails schema validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = path {
            if path.exists() {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                let file_config: PartialConfig =
                    toml::from_str(&text).map_err(|source| ConfigError::Parse {
                        path: path.to_path_buf(),
                        source,
                    })?;
                file_config.apply(&mut config);
            }
        }

        apply_env_overrides(&mut config)?;
        validate(&config)?;
        Ok(config)
    }
}

/// Mirror of [`RuntimeConfig`] with every field optional, for partial TOML
/// documents that only override a few settings.
#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    cache_root: Option<PathBuf>,
    ledger_path: Option<PathBuf>,
    deps_usage_policy: Option<DepsUsagePolicy>,
    default_salt_extra: Option<String>,
    env_prefixes: Option<Vec<String>>,
    log_format: Option<LogFormat>,
}

impl PartialConfig {
    fn apply(self, config: &mut RuntimeConfig) {
        if let Some(v) = self.cache_root {
            config.cache_root = v;
        }
        if let Some(v) = self.ledger_path {
            config.ledger_path = v;
        }
        if let Some(v) = self.deps_usage_policy {
            config.deps_usage_policy = v;
        }
        if let Some(v) = self.default_salt_extra {
            config.default_salt_extra = v;
        }
        if let Some(v) = self.env_prefixes {
            config.env_prefixes = v;
        }
        if let Some(v) = self.log_format {
            config.log_format = v;
        }
    }
}

fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<(), ConfigError> {
    if let Ok(v) = std::env::var("RIC_CACHE_ROOT") {
        config.cache_root = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("RIC_LEDGER_PATH") {
        config.ledger_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("RIC_DEPS_USAGE_POLICY") {
        config.deps_usage_policy = match v.to_lowercase().as_str() {
            "error" => DepsUsagePolicy::Error,
            "warn" => DepsUsagePolicy::Warn,
            "ignore" => DepsUsagePolicy::Ignore,
            _ => {
                return Err(ConfigError::InvalidEnvVar {
                    name: "RIC_DEPS_USAGE_POLICY".into(),
                    value: v,
                })
            }
        };
    }
    if let Ok(v) = std::env::var("RIC_LOG_FORMAT") {
        config.log_format = match v.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            _ => {
                return Err(ConfigError::InvalidEnvVar {
                    name: "RIC_LOG_FORMAT".into(),
                    value: v,
                })
            }
        };
    }
    Ok(())
}

fn validate(config: &RuntimeConfig) -> Result<(), ConfigError> {
    let schema = schemars::schema_for!(RuntimeConfig);
    let schema_value = serde_json::to_value(&schema).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    let validator =
        jsonschema::validator_for(&schema_value).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    let instance = serde_json::to_value(config).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    if let Err(err) = validator.validate(&instance) {
        return Err(ConfigError::Invalid(err.to_string()));
    }
    if config.env_prefixes.is_empty() {
        return Err(ConfigError::Invalid("env_prefixes must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = RuntimeConfig::load(None).unwrap();
        assert_eq!(config.deps_usage_policy, DepsUsagePolicy::Error);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn missing_file_path_falls_back_to_defaults() {
        let config = RuntimeConfig::load(Some(Path::new("/nonexistent/ric.toml"))).unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ric.toml");
        std::fs::write(&path, "cache_root = \"/tmp/custom-cache\"\n").unwrap();
        let config = RuntimeConfig::load(Some(&path)).unwrap();
        assert_eq!(config.cache_root, PathBuf::from("/tmp/custom-cache"));
    }

    #[test]
    fn env_overrides_beat_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ric.toml");
        std::fs::write(&path, "cache_root = \"/tmp/from-file\"\n").unwrap();
        // SAFETY-equivalent: test runs single-threaded per #[test] fn; no
        // other test reads this key concurrently within this process.
        std::env::set_var("RIC_CACHE_ROOT", "/tmp/from-env");
        let config = RuntimeConfig::load(Some(&path)).unwrap();
        std::env::remove_var("RIC_CACHE_ROOT");
        assert_eq!(config.cache_root, PathBuf::from("/tmp/from-env"));
    }

    #[test]
    fn invalid_deps_usage_policy_env_var_is_rejected() {
        std::env::set_var("RIC_DEPS_USAGE_POLICY", "nonsense");
        let result = RuntimeConfig::load(None);
        std::env::remove_var("RIC_DEPS_USAGE_POLICY");
        assert!(result.is_err());
    }
}
