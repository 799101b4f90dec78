//! Configuration types for opendeck-pipeline
//!
//! Every tunable of the pipeline lives in [`Config`] and is handed to the
//! orchestrator and the task runner at construction time.

use crate::error::{Error, Result};
use crate::types::Difficulty;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Main configuration for the processing pipeline
///
/// Fields are organized into sub-configs:
/// - [`retry`](RetryConfig) - batch-level retry of whole `process_batch` invocations
/// - [`generation`](GenerationConfig) - card limits, prompt shaping, generator retry
/// - [`runner`](RunnerConfig) - execution budgets, concurrency, shutdown
/// - [`persistence`](PersistenceConfig) - database and upload storage locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Batch-level retry policy (default: 3 attempts, 60s base, doubling)
    #[serde(default = "RetryConfig::batch_default")]
    pub retry: RetryConfig,

    /// Flashcard generation settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Task runner settings
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Data storage settings
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry: RetryConfig::batch_default(),
            generation: GenerationConfig::default(),
            runner: RunnerConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl Config {
    /// Check the configuration for values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        self.retry.validate("retry")?;
        self.generation.retry.validate("generation.retry")?;

        if self.generation.max_cards == 0 {
            return Err(config_error(
                "max_cards must be at least 1",
                "generation.max_cards",
            ));
        }
        if self.generation.max_prompt_chars == 0 {
            return Err(config_error(
                "max_prompt_chars must be at least 1",
                "generation.max_prompt_chars",
            ));
        }
        if self.runner.max_concurrent_batches == 0 {
            return Err(config_error(
                "max_concurrent_batches must be at least 1",
                "runner.max_concurrent_batches",
            ));
        }
        if self.runner.soft_time_limit > self.runner.hard_time_limit {
            return Err(config_error(
                format!(
                    "soft_time_limit ({}s) must not exceed hard_time_limit ({}s)",
                    self.runner.soft_time_limit.as_secs(),
                    self.runner.hard_time_limit.as_secs()
                ),
                "runner.soft_time_limit",
            ));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>, key: &str) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

/// Retry configuration with exponential backoff
///
/// `max_attempts` counts every invocation, the first one included: with the
/// batch defaults a persistent fault produces 3 attempts separated by 60s and
/// 120s. Delays serialize as milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first
    pub max_attempts: u32,

    /// Delay before the second attempt
    #[serde(with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    #[serde(with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl RetryConfig {
    /// Batch-level policy: 3 attempts, 60s then 120s
    pub fn batch_default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(600),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }

    /// Generator-internal policy: 3 attempts, exponential between 2s and 10s
    pub fn generator_default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }

    /// Policy without any waiting, for tests and synchronous tooling
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    fn validate(&self, key: &str) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(config_error(
                "max_attempts must be at least 1",
                &format!("{key}.max_attempts"),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(config_error(
                "backoff_multiplier must be a finite number >= 1.0",
                &format!("{key}.backoff_multiplier"),
            ));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::batch_default()
    }
}

/// Flashcard generation settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum flashcards kept per document (default: 20)
    #[serde(default = "default_max_cards")]
    pub max_cards: usize,

    /// Difficulty preference passed to the generator
    #[serde(default)]
    pub difficulty_hint: Option<Difficulty>,

    /// Document text beyond this many characters is cut before prompting (default: 15000)
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,

    /// Number of leading pages summarized in the prompt for citations (default: 10)
    #[serde(default = "default_page_summary_limit")]
    pub page_summary_limit: usize,

    /// Retry policy applied inside the generator (default: 3 attempts, 2s..10s)
    #[serde(default = "RetryConfig::generator_default")]
    pub retry: RetryConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_cards: default_max_cards(),
            difficulty_hint: None,
            max_prompt_chars: default_max_prompt_chars(),
            page_summary_limit: default_page_summary_limit(),
            retry: RetryConfig::generator_default(),
        }
    }
}

/// Task runner settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Soft execution budget per attempt; exceeding it requests cancellation (default: 600s)
    #[serde(default = "default_soft_time_limit", with = "duration_serde")]
    pub soft_time_limit: Duration,

    /// Hard execution budget per attempt; exceeding it terminates the attempt (default: 900s)
    #[serde(default = "default_hard_time_limit", with = "duration_serde")]
    pub hard_time_limit: Duration,

    /// Batches executed at the same time (default: 2)
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,

    /// How long `shutdown` waits for active batches (default: 30s)
    #[serde(default = "default_shutdown_grace_period", with = "duration_serde")]
    pub shutdown_grace_period: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            soft_time_limit: default_soft_time_limit(),
            hard_time_limit: default_hard_time_limit(),
            max_concurrent_batches: default_max_concurrent_batches(),
            shutdown_grace_period: default_shutdown_grace_period(),
        }
    }
}

/// Data storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./opendeck.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Root directory of uploaded files for [`LocalStorage`](crate::storage::LocalStorage)
    /// (default: "./uploads")
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            storage_root: default_storage_root(),
        }
    }
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_cards() -> usize {
    20
}

fn default_max_prompt_chars() -> usize {
    15_000
}

fn default_page_summary_limit() -> usize {
    10
}

fn default_soft_time_limit() -> Duration {
    Duration::from_secs(600)
}

fn default_hard_time_limit() -> Duration {
    Duration::from_secs(900)
}

fn default_max_concurrent_batches() -> usize {
    2
}

fn default_shutdown_grace_period() -> Duration {
    Duration::from_secs(30)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./opendeck.db")
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./uploads")
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
