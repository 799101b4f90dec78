//! Test configurations

use opendeck_pipeline::{Config, RetryConfig};
use std::path::Path;
use std::time::Duration;

/// Config rooted in `dir` with millisecond backoff so retries finish quickly
///
/// Batch retry keeps its shape (3 attempts, doubling) with a 20ms base;
/// the generator does not retry at all.
pub fn fast_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("opendeck.db");
    config.persistence.storage_root = dir.join("uploads");
    config.retry = RetryConfig {
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_secs(1),
        ..RetryConfig::batch_default()
    };
    config.generation.retry = RetryConfig::immediate(1);
    config.runner.shutdown_grace_period = Duration::from_secs(5);
    config
}
