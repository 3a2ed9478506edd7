//! Retry policy for every network call in the pipeline.
//!
//! A policy is a plain value: which errors to retry, how many attempts, and
//! an exponential backoff clamped to a `[min, max]` window of time units.

use crate::config::RetryConfig;
use crate::utils::error::{EtlError, Result};
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
    min_units: u64,
    max_units: u64,
    unit: Duration,
}

impl RetryPolicy {
    pub fn exponential(min_units: u64, max_units: u64) -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            min_units,
            max_units,
            unit: Duration::from_secs(1),
        }
    }

    /// Source reads: window [1, 8], 5 attempts.
    pub fn read() -> Self {
        Self::exponential(1, 8)
    }

    /// Sink writes: window [2, 10], 5 attempts.
    pub fn write() -> Self {
        Self::exponential(2, 10)
    }

    /// Listing pagination: window [2, 60].
    pub fn pagination() -> Self {
        Self::exponential(2, 60)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    /// 不限次數，靠呼叫端的外層錯誤處理收尾
    pub fn unbounded(mut self) -> Self {
        self.max_attempts = None;
        self
    }

    pub fn with_time_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn should_retry(&self, error: &EtlError) -> bool {
        error.is_transient()
    }

    /// Delay after the `attempt`-th failure (1-based): `unit * clamp(2^(attempt-1), min, max)`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exp = 2u64
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        let units = exp.min(self.max_units).max(self.min_units);
        let units = u32::try_from(units).unwrap_or(u32::MAX);
        self.unit.saturating_mul(units)
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    /// The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !self.should_retry(&error) {
                tracing::debug!(operation, attempt, error = %error, "Permanent failure, not retrying");
                return Err(error);
            }

            if self.max_attempts.is_some_and(|max| attempt >= max) {
                tracing::error!(
                    operation,
                    attempt,
                    error = %error,
                    "Giving up after exhausting retry attempts"
                );
                return Err(error);
            }

            let delay = self.next_delay(attempt);
            tracing::warn!(
                operation,
                attempt,
                max_attempts = ?self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after transient error"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// The three policies one run uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicies {
    pub read: RetryPolicy,
    pub write: RetryPolicy,
    pub pagination: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicies {
    fn from(config: &RetryConfig) -> Self {
        let unit = config.time_unit();

        let pagination = RetryPolicy::exponential(config.pagination_min, config.pagination_max)
            .with_time_unit(unit);
        let pagination = if config.pagination_max_attempts == 0 {
            pagination.unbounded()
        } else {
            pagination.with_max_attempts(config.pagination_max_attempts)
        };

        Self {
            read: RetryPolicy::exponential(config.read_min, config.read_max)
                .with_max_attempts(config.read_max_attempts)
                .with_time_unit(unit),
            write: RetryPolicy::exponential(config.write_min, config.write_max)
                .with_max_attempts(config.write_max_attempts)
                .with_time_unit(unit),
            pagination,
        }
    }
}
