//! Loader configuration with precedence and validation
//!
//! Precedence, lowest first: built-in defaults, a JSON config file,
//! `LUMEN_*` environment variables, then explicit builder calls (the CLI
//! flags).

use crate::constants::*;
use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration shared by the tiered cache and the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Root directory of the durable tier
    pub cache_dir: PathBuf,
    /// Total weight (decoded bytes) the memory tier may hold
    pub memory_budget_bytes: u64,
    /// Number of tasks allowed to run at once
    pub worker_count: usize,
    /// Whether durable payloads are zstd compressed
    pub compress_durable: bool,
    pub compression_level: i32,
    /// Length of the fade-in transition handed to the renderer
    pub fade_duration_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET_BYTES,
            worker_count: default_worker_count(),
            compress_durable: true,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            fade_duration_ms: DEFAULT_FADE_DURATION_MS,
        }
    }
}

/// Source of configuration for debugging and precedence tracking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Default,
    ConfigFile(PathBuf),
    EnvironmentVariable(String),
    CommandLine,
}

impl LoaderConfig {
    /// Load a JSON config file; missing fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("failed to read {}: {e}", path.display()))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            Error::configuration(format!("invalid config file {}: {e}", path.display()))
        })
    }

    /// Apply `LUMEN_*` overrides from the process environment
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(LUMEN_CACHE_DIR_VAR) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(budget) = lookup(LUMEN_MEMORY_BUDGET_VAR) {
            self.memory_budget_bytes = parse_var(LUMEN_MEMORY_BUDGET_VAR, &budget)?;
        }
        if let Some(workers) = lookup(LUMEN_WORKERS_VAR) {
            self.worker_count = parse_var(LUMEN_WORKERS_VAR, &workers)?;
        }
        if let Some(compress) = lookup(LUMEN_COMPRESS_VAR) {
            self.compress_durable = matches!(
                compress.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(level) = lookup(LUMEN_COMPRESSION_LEVEL_VAR) {
            self.compression_level = parse_var(LUMEN_COMPRESSION_LEVEL_VAR, &level)?;
        }
        if let Some(fade) = lookup(LUMEN_FADE_MS_VAR) {
            self.fade_duration_ms = parse_var(LUMEN_FADE_MS_VAR, &fade)?;
        }
        Ok(self)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.memory_budget_bytes == 0 {
            return Err(Error::configuration("memory budget must be at least 1 byte"));
        }
        if self.worker_count == 0 {
            return Err(Error::configuration("worker count must be at least 1"));
        }
        // The level is ignored while compression is off
        if self.compress_durable && !(1..=22).contains(&self.compression_level) {
            return Err(Error::configuration(format!(
                "compression level {} is outside 1..=22",
                self.compression_level
            )));
        }
        Ok(())
    }

    pub fn fade_duration(&self) -> Duration {
        Duration::from_millis(self.fade_duration_ms)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::configuration(format!("{name}={value:?}: {e}")))
}

/// `$XDG_CACHE_HOME/lumen`, falling back to `~/.cache/lumen`
pub fn default_cache_dir() -> PathBuf {
    std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|home| home.join(".cache"))
                .unwrap_or_else(|| PathBuf::from(".cache"))
        })
        .join(CACHE_DIR_NAME)
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_DEFAULT_WORKERS)
        .clamp(MIN_DEFAULT_WORKERS, MAX_DEFAULT_WORKERS)
}

/// Builder for creating loader configurations
pub struct LoaderConfigBuilder {
    config: LoaderConfig,
    source: ConfigSource,
}

impl LoaderConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LoaderConfig::default(),
            source: ConfigSource::Default,
        }
    }

    /// Start from an already loaded configuration
    pub fn from_config(config: LoaderConfig, source: ConfigSource) -> Self {
        Self { config, source }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self.source = ConfigSource::CommandLine;
        self
    }

    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.config.memory_budget_bytes = bytes;
        self.source = ConfigSource::CommandLine;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.worker_count = workers;
        self.source = ConfigSource::CommandLine;
        self
    }

    pub fn with_compression(mut self, enabled: bool, level: i32) -> Self {
        self.config.compress_durable = enabled;
        self.config.compression_level = level;
        self.source = ConfigSource::CommandLine;
        self
    }

    pub fn with_fade_duration(mut self, duration: Duration) -> Self {
        self.config.fade_duration_ms = duration.as_millis() as u64;
        self.source = ConfigSource::CommandLine;
        self
    }

    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<LoaderConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for LoaderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = LoaderConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.cache_dir.ends_with(CACHE_DIR_NAME));
        assert!((MIN_DEFAULT_WORKERS..=MAX_DEFAULT_WORKERS).contains(&config.worker_count));
    }

    #[test]
    fn test_env_overrides_defaults() {
        let config = LoaderConfig::default()
            .apply_env_from(lookup(&[
                (LUMEN_CACHE_DIR_VAR, "/var/cache/lumen"),
                (LUMEN_MEMORY_BUDGET_VAR, "1024"),
                (LUMEN_WORKERS_VAR, " 3 "),
                (LUMEN_COMPRESS_VAR, "off"),
                (LUMEN_FADE_MS_VAR, "120"),
            ]))
            .unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/lumen"));
        assert_eq!(config.memory_budget_bytes, 1024);
        assert_eq!(config.worker_count, 3);
        assert!(!config.compress_durable);
        assert_eq!(config.fade_duration(), Duration::from_millis(120));
    }

    #[test]
    fn test_unparseable_env_value_is_configuration_error() {
        let err = LoaderConfig::default()
            .apply_env_from(lookup(&[(LUMEN_WORKERS_VAR, "many")]))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_file_fields_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lumen.json");
        std::fs::write(&path, r#"{ "memory_budget_bytes": 4096, "worker_count": 2 }"#).unwrap();

        let config = LoaderConfig::from_file(&path).unwrap();
        assert_eq!(config.memory_budget_bytes, 4096);
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.fade_duration_ms, DEFAULT_FADE_DURATION_MS);
    }

    #[test]
    fn test_builder_validates() {
        assert!(LoaderConfigBuilder::new().with_workers(0).build().is_err());
        assert!(LoaderConfigBuilder::new().with_memory_budget(0).build().is_err());
        assert!(LoaderConfigBuilder::new()
            .with_compression(true, 40)
            .build()
            .is_err());

        assert!(LoaderConfigBuilder::new()
            .with_compression(false, 0)
            .build()
            .is_ok());

        let builder = LoaderConfigBuilder::new().with_memory_budget(3);
        assert_eq!(builder.source(), &ConfigSource::CommandLine);
        assert_eq!(builder.build().unwrap().memory_budget_bytes, 3);
    }
}
