//! Engine configuration (§4.15).
//!
//! `EngineConfig` is loaded through `ConfigManager`: optional TOML/JSON
//! file, then environment-variable overrides. There is no CLI layer here —
//! this crate has no CLI — so the precedence chain stops at file then env,
//! and embedders that want neither can just construct `EngineConfig::default()`
//! directly.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Abstracts environment variable access so tests can inject a fake one.
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("configuration validation error: {0}")]
    Validation(String),

    #[error("environment variable error: {0}")]
    Environment(String),

    #[error("unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Bridges this module's file/env-loading errors onto
/// [`crate::error::EngineError::Config`], so a real `ConfigManager` failure
/// can actually surface through the engine's error type.
impl From<ConfigError> for crate::error::ConfigError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Io(io_err) => crate::error::ConfigError::InvalidFormat {
                details: format!("I/O error: {}", io_err),
            },
            ConfigError::TomlParsing(err) => crate::error::ConfigError::InvalidFormat {
                details: format!("TOML parsing error: {}", err),
            },
            ConfigError::JsonParsing(err) => crate::error::ConfigError::InvalidFormat {
                details: format!("JSON parsing error: {}", err),
            },
            ConfigError::UnsupportedFormat(ext) => crate::error::ConfigError::InvalidFormat {
                details: format!("unsupported configuration file format: {}", ext),
            },
            ConfigError::Validation(reason) => crate::error::ConfigError::InvalidValue {
                field: "config".to_string(),
                value: String::new(),
                reason,
            },
            ConfigError::Environment(reason) => crate::error::ConfigError::InvalidValue {
                field: "environment".to_string(),
                value: String::new(),
                reason,
            },
        }
    }
}

/// Top-level engine configuration (§4.15).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub network: NetworkConfig,
    pub schema_cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// On-disk schema cache directory.
    pub directory: PathBuf,
    pub ttl_hours: u64,
    pub max_memory_entries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: dirs::cache_dir().unwrap_or_else(std::env::temp_dir).join("netex-validate"),
            ttl_hours: 24,
            max_memory_entries: 64,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_ms: 500,
        }
    }
}

pub struct ConfigManager;

impl ConfigManager {
    /// Like [`ConfigManager::load`], but surfaces a failure as
    /// [`crate::error::EngineError::Config`] instead of this module's own
    /// `ConfigError`, for embedders who want config problems to fail the
    /// call rather than fall back to defaults.
    pub async fn load_strict() -> crate::error::EngineResult<EngineConfig> {
        Self::load().await.map_err(|e| crate::error::EngineError::Config(e.into()))
    }

    /// Load configuration with precedence: defaults -> file -> environment.
    pub async fn load() -> Result<EngineConfig> {
        let mut config = EngineConfig::default();

        if let Some(found) = Self::find_config_file().await? {
            config = found;
        }

        config = Self::apply_environment_overrides(config)?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub async fn load_from_file(path: &Path) -> Result<EngineConfig> {
        let content = tokio::fs::read_to_string(path).await?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => toml::from_str(&content).or_else(|_| Ok(serde_json::from_str(&content)?)),
        }
    }

    /// Checks `netex-validate.{toml,json}` in the current directory, then
    /// in the platform config directory.
    pub async fn find_config_file() -> Result<Option<EngineConfig>> {
        let names = ["netex-validate.toml", "netex-validate.json", ".netex-validate.toml", ".netex-validate.json"];

        for name in &names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("netex-validate");
            for name in &names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    pub fn apply_environment_overrides(config: EngineConfig) -> Result<EngineConfig> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    pub fn apply_environment_overrides_with(env: &impl EnvProvider, mut config: EngineConfig) -> Result<EngineConfig> {
        if let Some(cache_dir) = env.get("NETEX_VALIDATE_CACHE_DIR") {
            config.cache.directory = PathBuf::from(cache_dir);
        }

        if let Some(ttl) = env.get("NETEX_VALIDATE_CACHE_TTL_HOURS") {
            config.cache.ttl_hours = ttl
                .parse()
                .map_err(|_| ConfigError::Environment(format!("invalid NETEX_VALIDATE_CACHE_TTL_HOURS value: {}", ttl)))?;
        }

        if let Some(entries) = env.get("NETEX_VALIDATE_MAX_MEMORY_ENTRIES") {
            config.cache.max_memory_entries = entries
                .parse()
                .map_err(|_| ConfigError::Environment(format!("invalid NETEX_VALIDATE_MAX_MEMORY_ENTRIES value: {}", entries)))?;
        }

        if let Some(timeout) = env.get("NETEX_VALIDATE_TIMEOUT_SECONDS") {
            config.network.timeout_seconds = timeout
                .parse()
                .map_err(|_| ConfigError::Environment(format!("invalid NETEX_VALIDATE_TIMEOUT_SECONDS value: {}", timeout)))?;
        }

        if let Some(retries) = env.get("NETEX_VALIDATE_RETRY_ATTEMPTS") {
            config.network.retry_attempts = retries
                .parse()
                .map_err(|_| ConfigError::Environment(format!("invalid NETEX_VALIDATE_RETRY_ATTEMPTS value: {}", retries)))?;
        }

        Ok(config)
    }

    /// Rejects zero TTL, zero timeout, and retry counts above 10.
    pub fn validate(config: &EngineConfig) -> Result<()> {
        if config.cache.ttl_hours == 0 {
            return Err(ConfigError::Validation("cache TTL must be greater than 0".to_string()));
        }
        if config.network.timeout_seconds == 0 {
            return Err(ConfigError::Validation("timeout must be greater than 0".to_string()));
        }
        if config.network.retry_attempts > 10 {
            return Err(ConfigError::Validation("retry attempts cannot exceed 10".to_string()));
        }
        Ok(())
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        ConfigManager::validate(self)
    }
}
