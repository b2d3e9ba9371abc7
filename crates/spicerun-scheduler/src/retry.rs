//! Retry policy.

use std::time::Duration;

use spicerun_spec::{JobError, RetryClass, SimulationJob};

use crate::config::SchedulerConfig;

/// What the coordinator does with a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue on the same backend after `delay`.
    Retry { delay: Duration },
    /// Requeue immediately on another backend.
    Fallback { backend: String },
    /// The job fails with the attempt's error.
    Fail,
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: config.retry_backoff(),
            max: config.retry_backoff_max(),
        }
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
    /// capped at `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Classifies a failed attempt of `job`.
    ///
    /// Artifact timeouts switch to the configured fallback once; without a
    /// fallback (or after switching) they are terminal. Transient launch
    /// failures retry on the same backend. Both count against the bound.
    pub fn decide(
        &self,
        job: &SimulationJob,
        error: &JobError,
        config: &SchedulerConfig,
    ) -> RetryDecision {
        if job.retry_count() >= self.max_retries {
            return RetryDecision::Fail;
        }
        match error.retry_class() {
            RetryClass::Transient => RetryDecision::Retry {
                delay: self.delay(job.retry_count() + 1),
            },
            RetryClass::Fallback if job.fallback_from.is_none() => {
                match config.fallback_for(&job.backend) {
                    Some(backend) => RetryDecision::Fallback {
                        backend: backend.to_string(),
                    },
                    None => RetryDecision::Fail,
                }
            }
            _ => RetryDecision::Fail,
        }
    }
}
