//! Thread pool configuration.
//!
//! [`PoolConfig`] can be built in code with the builder-style setters,
//! deserialized with serde, overridden from the environment, or (with the
//! `config-file` feature) loaded from a TOML file.
//!
//! ```toml
//! workers = 4
//! thread_name_prefix = "tasklike-worker"
//! park_timeout_ms = 50
//! ```

use std::time::Duration;

/// Environment variable overriding [`PoolConfig::workers`].
pub const WORKERS_ENV: &str = "TASKLIKE_WORKERS";

const DEFAULT_THREAD_NAME_PREFIX: &str = "tasklike-worker";
const DEFAULT_PARK_TIMEOUT_MS: u64 = 100;

/// Errors produced while building or loading a [`PoolConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A pool needs at least one worker.
    #[error("worker count must be at least 1")]
    NoWorkers,
    /// Thread names must not be empty.
    #[error("thread name prefix must not be empty")]
    EmptyThreadName,
    /// Park timeout must be non-zero.
    #[error("park timeout must be non-zero")]
    ZeroParkTimeout,
    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv {
        /// The variable name.
        var: &'static str,
        /// The raw value found.
        value: String,
    },
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration file could not be parsed.
    #[cfg(feature = "config-file")]
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration of a [`ThreadPool`](crate::runtime::ThreadPool).
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Worker threads are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
    /// How long an idle worker parks before re-checking the queue.
    pub park_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(1, std::num::NonZero::get),
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            park_timeout_ms: DEFAULT_PARK_TIMEOUT_MS,
        }
    }
}

impl PoolConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker count.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Sets the idle park timeout.
    #[must_use]
    pub fn park_timeout(mut self, timeout: Duration) -> Self {
        self.park_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The idle park timeout as a `Duration`.
    #[must_use]
    pub const fn park_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.park_timeout_ms)
    }

    /// Checks invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.thread_name_prefix.is_empty() {
            return Err(ConfigError::EmptyThreadName);
        }
        if self.park_timeout_ms == 0 {
            return Err(ConfigError::ZeroParkTimeout);
        }
        Ok(())
    }

    /// Applies [`WORKERS_ENV`] if it is set.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        match std::env::var(WORKERS_ENV) {
            Ok(raw) => self.with_workers_override(&raw),
            Err(_) => Ok(self),
        }
    }

    fn with_workers_override(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.workers = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv {
                var: WORKERS_ENV,
                value: raw.to_string(),
            })?;
        Ok(self)
    }

    /// Parses and validates a TOML document.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    #[cfg(feature = "config-file")]
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}
