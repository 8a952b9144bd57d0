
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cache::CacheConfig;
use crate::cost::PricingConfig;
use crate::retrieval::ChunkingConfig;
use crate::router::RoutingConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error(
        "Invalid strategy thresholds: direct-cache below {0} min, smart-rag below {1} min (need 0 < direct < smart)"
    )]
    InvalidThresholds(u64, u64),
    #[error("Invalid {0} budget: {1} tokens (must be at least 100)")]
    InvalidBudget(&'static str, usize),
    #[error("Invalid chunk limits: {0} chunks, {1} for detailed queries (need 0 < normal <= detailed)")]
    InvalidChunkLimits(usize, usize),
    #[error("Invalid timestamp window: {0} seconds (must be between 0 and 3600)")]
    InvalidTimestampWindow(f64),
    #[error("Invalid minimum similarity: {0} (must be between 0.0 and 1.0)")]
    InvalidMinSimilarity(f32),
    #[error("Invalid target chunk size: {0} characters (must be between 100 and 10000)")]
    InvalidTargetChunkChars(usize),
    #[error("Overlap ({0} characters) must be smaller than the target chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid {0} TTL: {1} seconds (must be between 1 and the maximum TTL of {2})")]
    InvalidTtl(&'static str, u64, u64),
    #[error("Invalid cache registry capacity: {0} (must be at least 1)")]
    InvalidRegistryCapacity(usize),
    #[error("Invalid {0} price: {1} (must be a non-negative number)")]
    InvalidPrice(&'static str, f64),
    #[error("Invalid tokens per minute: {0} (must be at least 1)")]
    InvalidTokensPerMinute(u64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default data directory, `~/.transcript-router`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".transcript-router"))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("transcript-router"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the SQLite database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("router.db")
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_routing()?;
        self.validate_chunking()?;
        self.validate_cache()?;
        self.validate_pricing()?;
        Ok(())
    }

    fn validate_routing(&self) -> Result<(), ConfigError> {
        let config = &self.routing;

        if config.direct_cache_max_minutes == 0
            || config.direct_cache_max_minutes >= config.smart_rag_max_minutes
        {
            return Err(ConfigError::InvalidThresholds(
                config.direct_cache_max_minutes,
                config.smart_rag_max_minutes,
            ));
        }

        for (name, budget) in [
            ("smart-rag", config.smart_rag_budget_tokens),
            ("aggressive", config.aggressive_budget_tokens),
        ] {
            if budget < 100 {
                return Err(ConfigError::InvalidBudget(name, budget));
            }
        }

        if config.max_chunks == 0 || config.detailed_max_chunks < config.max_chunks {
            return Err(ConfigError::InvalidChunkLimits(
                config.max_chunks,
                config.detailed_max_chunks,
            ));
        }

        if !(0.0..=3600.0).contains(&config.timestamp_window_seconds) {
            return Err(ConfigError::InvalidTimestampWindow(
                config.timestamp_window_seconds,
            ));
        }

        if !(0.0..=1.0).contains(&config.min_similarity) {
            return Err(ConfigError::InvalidMinSimilarity(config.min_similarity));
        }

        Ok(())
    }

    fn validate_chunking(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(100..=10_000).contains(&config.target_chunk_chars) {
            return Err(ConfigError::InvalidTargetChunkChars(
                config.target_chunk_chars,
            ));
        }

        if config.overlap_chars >= config.target_chunk_chars {
            return Err(ConfigError::OverlapTooLarge(
                config.overlap_chars,
                config.target_chunk_chars,
            ));
        }

        Ok(())
    }

    fn validate_cache(&self) -> Result<(), ConfigError> {
        let config = &self.cache;

        for (name, ttl) in [
            ("direct", config.direct_ttl_seconds),
            ("chunk", config.chunk_ttl_seconds),
            ("query", config.query_ttl_seconds),
        ] {
            if ttl == 0 || ttl > config.max_ttl_seconds {
                return Err(ConfigError::InvalidTtl(name, ttl, config.max_ttl_seconds));
            }
        }

        if config.registry_capacity == 0 {
            return Err(ConfigError::InvalidRegistryCapacity(
                config.registry_capacity,
            ));
        }

        Ok(())
    }

    fn validate_pricing(&self) -> Result<(), ConfigError> {
        let config = &self.pricing;

        for (name, price) in [
            ("input", config.input_per_million),
            ("cached input", config.cached_input_per_million),
            ("output", config.output_per_million),
            ("storage", config.storage_per_million_hour),
        ] {
            if !price.is_finite() || price < 0.0 {
                return Err(ConfigError::InvalidPrice(name, price));
            }
        }

        if config.tokens_per_minute == 0 {
            return Err(ConfigError::InvalidTokensPerMinute(
                config.tokens_per_minute,
            ));
        }

        Ok(())
    }
}
