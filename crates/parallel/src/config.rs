//! Dispatcher configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// What the executor does with a record decoded despite a field mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldMismatchPolicy {
    /// Hand the best-effort populated entity to the worker.
    #[default]
    Deliver,
    /// Log it, count it as skipped, and move to the next record.
    Skip,
}

impl std::str::FromStr for FieldMismatchPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deliver" => Ok(Self::Deliver),
            "skip" => Ok(Self::Skip),
            other => Err(ConfigError::InvalidSetting {
                key: "field_mismatch",
                value: other.to_string(),
            }),
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Upper bound on one batch execution (paging plus per-record loop)
    pub batch_timeout: Duration,
    /// Batch size used by callers that do not pick one
    pub default_batch_size: usize,
    /// Force every dispatch down to one record per batch
    pub test_mode: bool,
    pub field_mismatch: FieldMismatchPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_timeout: Duration::from_secs(30),
            default_batch_size: 100,
            test_mode: false,
            field_mismatch: FieldMismatchPolicy::Deliver,
        }
    }
}

impl DispatchConfig {
    pub const ENV_BATCH_TIMEOUT_SECS: &'static str = "PARALLEL_BATCH_TIMEOUT_SECS";
    pub const ENV_DEFAULT_BATCH_SIZE: &'static str = "PARALLEL_DEFAULT_BATCH_SIZE";
    pub const ENV_TEST_MODE: &'static str = "PARALLEL_TEST_MODE";
    pub const ENV_FIELD_MISMATCH: &'static str = "PARALLEL_FIELD_MISMATCH";

    /// Load from the process environment, keeping defaults for unset or
    /// unparsable values.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(Self::ENV_BATCH_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.batch_timeout = Duration::from_secs(secs),
                _ => warn!(key = Self::ENV_BATCH_TIMEOUT_SECS, value = %raw, "ignoring invalid setting"),
            }
        }

        if let Some(raw) = lookup(Self::ENV_DEFAULT_BATCH_SIZE) {
            match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => config.default_batch_size = size,
                _ => warn!(key = Self::ENV_DEFAULT_BATCH_SIZE, value = %raw, "ignoring invalid setting"),
            }
        }

        if let Some(raw) = lookup(Self::ENV_TEST_MODE) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => config.test_mode = true,
                "0" | "false" | "no" | "" => config.test_mode = false,
                _ => warn!(key = Self::ENV_TEST_MODE, value = %raw, "ignoring invalid setting"),
            }
        }

        if let Some(raw) = lookup(Self::ENV_FIELD_MISMATCH) {
            match raw.parse::<FieldMismatchPolicy>() {
                Ok(policy) => config.field_mismatch = policy,
                Err(_) => warn!(key = Self::ENV_FIELD_MISMATCH, value = %raw, "ignoring invalid setting"),
            }
        }

        config
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    pub fn with_default_batch_size(mut self, size: usize) -> Self {
        self.default_batch_size = size;
        self
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    pub fn with_field_mismatch(mut self, policy: FieldMismatchPolicy) -> Self {
        self.field_mismatch = policy;
        self
    }

    /// Batch size actually used for a dispatch.
    ///
    /// Test mode (from either the config or the caller) overrides the
    /// request with 1. A zero request is rejected.
    pub fn effective_batch_size(
        &self,
        requested: usize,
        caller_test_mode: bool,
    ) -> Result<NonZeroUsize, ConfigError> {
        let requested = NonZeroUsize::new(requested).ok_or(ConfigError::ZeroBatchSize)?;
        if self.test_mode || caller_test_mode {
            return Ok(NonZeroUsize::MIN);
        }
        Ok(requested)
    }
}
