//! Population tuning.
//!
//! # Environment Variables
//!
//! - `SCHEMA_INDEX_MERGE_FACTOR`: blocks merged at a time per spill file (default: `8`)
//! - `SCHEMA_INDEX_BLOCK_SIZE`: bytes buffered before a block is spilled (default: 1 MiB)
//! - `SCHEMA_INDEX_BATCH_SIZE`: entries per merge batch (default: `100`)
//! - `SCHEMA_INDEX_QUEUE_CAPACITY`: batches buffered per merger (default: `10`)
//! - `SCHEMA_INDEX_POLL_INTERVAL_MS`: longest single wait on a merge queue (default: `10`)
//! - `SCHEMA_INDEX_MAX_KEY_SIZE`: largest encoded key accepted (default: `4096`)
//!
//! # Invariants
//!
//! - Every size and count is positive.
//! - `merge_factor` is at least 2.
//! - `max_key_size` fits the entry size header of the temporary storages.

use std::time::Duration;

use crate::merge::{DEFAULT_BATCH_SIZE, DEFAULT_POLL_INTERVAL, MergeSettings, QUEUE_SIZE};
use crate::storage::dynamic_size::MAX_KEY_SIZE;

/// Settings of a [`BlockBasedIndexPopulator`](crate::populator::BlockBasedIndexPopulator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopulationConfig {
    /// Blocks merged into one per pass when a spill file is compacted.
    pub merge_factor: usize,
    /// Encoded bytes buffered in memory before they are sorted and spilled.
    pub block_size: usize,
    pub batch_size: usize,
    pub queue_capacity: usize,
    pub poll_interval: Duration,
    /// Largest key, in bytes, the target tree accepts.
    pub max_key_size: usize,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            merge_factor: Self::DEFAULT_MERGE_FACTOR,
            block_size: Self::DEFAULT_BLOCK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: QUEUE_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_key_size: Self::DEFAULT_MAX_KEY_SIZE,
        }
    }
}

impl PopulationConfig {
    pub const DEFAULT_MERGE_FACTOR: usize = 8;
    pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;
    pub const DEFAULT_MAX_KEY_SIZE: usize = 4096;

    /// Load configuration from environment variables, falling back to the
    /// defaults for unset ones.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but is not a valid positive
    /// number, or if the merge factor is below 2.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let poll_interval_ms = load(
            &lookup,
            "SCHEMA_INDEX_POLL_INTERVAL_MS",
            duration_millis(defaults.poll_interval),
        )?;
        let config = Self {
            merge_factor: load(&lookup, "SCHEMA_INDEX_MERGE_FACTOR", defaults.merge_factor)?,
            block_size: load(&lookup, "SCHEMA_INDEX_BLOCK_SIZE", defaults.block_size)?,
            batch_size: load(&lookup, "SCHEMA_INDEX_BATCH_SIZE", defaults.batch_size)?,
            queue_capacity: load(&lookup, "SCHEMA_INDEX_QUEUE_CAPACITY", defaults.queue_capacity)?,
            poll_interval: Duration::from_millis(poll_interval_ms as u64),
            max_key_size: load(&lookup, "SCHEMA_INDEX_MAX_KEY_SIZE", defaults.max_key_size)?,
        };
        if config.merge_factor < 2 {
            return Err(ConfigError::InvalidValue {
                name: "SCHEMA_INDEX_MERGE_FACTOR".to_string(),
                message: format!("{} is below the minimum of 2", config.merge_factor),
            });
        }
        if config.max_key_size > MAX_KEY_SIZE {
            return Err(ConfigError::InvalidValue {
                name: "SCHEMA_INDEX_MAX_KEY_SIZE".to_string(),
                message: format!(
                    "{} is above the maximum of {MAX_KEY_SIZE}",
                    config.max_key_size
                ),
            });
        }
        Ok(config)
    }

    /// Settings for the stream mergers of a merge tree.
    #[must_use]
    pub const fn merge_settings(&self) -> MergeSettings {
        MergeSettings {
            batch_size: self.batch_size,
            queue_capacity: self.queue_capacity,
            poll_interval: self.poll_interval,
        }
    }
}

#[allow(clippy::cast_possible_truncation)] // intervals are milliseconds, not years
const fn duration_millis(duration: Duration) -> usize {
    duration.as_millis() as usize
}

/// Parse a positive number, or return `default` if the variable is unset.
fn load(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    let Some(value) = lookup(name) else {
        return Ok(default);
    };
    match value.trim().parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a positive number"),
        }),
    }
}
