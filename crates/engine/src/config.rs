//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional; defaults are production-reasonable.
//!
//! - `DRIFTWOOD_DECREMENT_RETRIES` - Attempts for a conflicted checkout
//!   decrement before giving up (default: 4, range 1-10)
//! - `DRIFTWOOD_RETRY_BASE_MS` - Base backoff delay in milliseconds
//!   (default: 25, range 10-10000)
//! - `DRIFTWOOD_RETRY_MAX_MS` - Backoff delay ceiling in milliseconds
//!   (default: 1000, range 100-300000)
//! - `DRIFTWOOD_STORE_TIMEOUT_MS` - Per-operation remote store timeout in
//!   milliseconds (default: 5000)
//! - `DRIFTWOOD_MIRROR_DIR` - Directory for the local cart fallback mirror
//!   (default: `.driftwood/carts`)

use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Invalid configuration: {0}")]
    OutOfRange(String),
}

/// Retry behavior for the checkout decrement transaction.
///
/// A conflicted commit is retried from a fresh read with exponential
/// backoff plus jitter; the bound keeps a starved loop from retrying
/// forever.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (1-10).
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per attempt after that.
    pub base_delay: Duration,
    /// Ceiling on the computed delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(25),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// The backoff before the attempt after `attempt` (1-based), with up
    /// to 50% jitter so concurrent losers don't retry in lockstep.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(exp))
            .min(self.max_delay);
        let jitter_ms = rand::rng().random_range(0..=base.as_millis() as u64 / 2);
        base + Duration::from_millis(jitter_ms)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if !(1..=10).contains(&self.max_attempts) {
            return Err(ConfigError::OutOfRange(format!(
                "decrement retries must be between 1 and 10, got {}",
                self.max_attempts
            )));
        }
        if !(10..=10_000).contains(&(self.base_delay.as_millis() as u64)) {
            return Err(ConfigError::OutOfRange(format!(
                "retry base delay must be 10-10000 ms, got {:?}",
                self.base_delay
            )));
        }
        if self.max_delay < self.base_delay {
            return Err(ConfigError::OutOfRange(
                "retry max delay must be at least the base delay".to_owned(),
            ));
        }
        Ok(self)
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retry behavior for the checkout decrement.
    pub retry: RetryPolicy,
    /// Bound on every remote store operation.
    pub store_timeout: Duration,
    /// Directory the file-backed cart mirror writes under.
    pub mirror_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            store_timeout: Duration::from_secs(5),
            mirror_dir: PathBuf::from(".driftwood/carts"),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the environment (and a `.env` file when
    /// present), falling back to defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is set but unparsable or out
    /// of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let retry = RetryPolicy {
            max_attempts: env_parse("DRIFTWOOD_DECREMENT_RETRIES", defaults.retry.max_attempts)?,
            base_delay: Duration::from_millis(env_parse(
                "DRIFTWOOD_RETRY_BASE_MS",
                defaults.retry.base_delay.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(env_parse(
                "DRIFTWOOD_RETRY_MAX_MS",
                defaults.retry.max_delay.as_millis() as u64,
            )?),
        }
        .validate()?;

        let store_timeout = Duration::from_millis(env_parse(
            "DRIFTWOOD_STORE_TIMEOUT_MS",
            defaults.store_timeout.as_millis() as u64,
        )?);

        let mirror_dir = std::env::var("DRIFTWOOD_MIRROR_DIR")
            .map_or(defaults.mirror_dir, PathBuf::from);

        Ok(Self {
            retry,
            store_timeout,
            mirror_dir,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(name.to_owned(), e.to_string())),
        Err(_) => Ok(default),
    }
}
