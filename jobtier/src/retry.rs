use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Longest backoff a policy may configure: 30 days.
pub const MAX_RETRY_DELAY_MS: u64 = 30 * 24 * 60 * 60 * 1_000;

/// Retry and backoff behavior for one priority tier.
///
/// `max_attempts` counts retries, not executions: a policy with
/// `max_attempts = 3` runs a job at most four times. `0` means the first
/// failure is terminal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries before dead-lettering.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound for any computed delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Growth factor between consecutive retries.
    pub backoff_multiplier: f64,
    /// When false every retry waits `initial_delay_ms`.
    pub exponential: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_policy()
    }
}

/// What to do with an execution that just failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryDecision {
    /// Run again as `attempt` once `delay` has elapsed.
    Retry { attempt: u32, delay: Duration },
    /// The ceiling is reached; dead-letter it.
    Exhausted,
}

impl RetryPolicy {
    /// 3 retries, exponential 1s to 5m with a 2x multiplier.
    pub fn default_policy() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 300_000,
            backoff_multiplier: 2.0,
            exponential: true,
        }
    }

    /// 5 retries, exponential 500ms to 30s with a 1.5x multiplier.
    ///
    /// Intended for latency-sensitive tiers.
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 1.5,
            exponential: true,
        }
    }

    /// Fail fast: the first failure goes straight to the dead-letter sink.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
            exponential: false,
        }
    }

    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Backoff before retry number `attempt` (1 = first retry).
    ///
    /// Formula: delay = min(initial * multiplier^(attempt-1), max)
    ///
    /// The result never exceeds [`MAX_RETRY_DELAY_MS`], even for a policy
    /// that skipped validation.
    pub fn delay(&self, attempt: u32) -> Duration {
        if !self.exponential || attempt == 0 || self.initial_delay_ms == 0 {
            return clamp_millis(self.initial_delay_ms);
        }

        let exp = (attempt - 1).min(i32::MAX as u32) as i32;
        let scaled = (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(exp);
        let capped = scaled
            .min(self.max_delay_ms as f64)
            .min(MAX_RETRY_DELAY_MS as f64);

        clamp_millis(capped.max(0.0) as u64)
    }

    /// Whether retry number `next_attempt` is still allowed.
    pub fn allows(&self, next_attempt: u32) -> bool {
        next_attempt <= self.max_attempts
    }

    /// Decide the fate of an execution whose upcoming attempt would be
    /// `next_attempt`.
    pub fn decide(&self, next_attempt: u32) -> RetryDecision {
        if self.allows(next_attempt) {
            RetryDecision::Retry {
                attempt: next_attempt,
                delay: self.delay(next_attempt),
            }
        } else {
            RetryDecision::Exhausted
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 0.0 {
            return Err(ConfigError::InvalidMultiplier(self.backoff_multiplier));
        }
        for delay_ms in [self.initial_delay_ms, self.max_delay_ms] {
            if delay_ms > MAX_RETRY_DELAY_MS {
                return Err(ConfigError::DelayTooLarge {
                    delay_ms,
                    limit_ms: MAX_RETRY_DELAY_MS,
                });
            }
        }
        if self.exponential && self.max_delay_ms < self.initial_delay_ms {
            return Err(ConfigError::DelayRange {
                initial_delay_ms: self.initial_delay_ms,
                max_delay_ms: self.max_delay_ms,
            });
        }
        Ok(())
    }
}

fn clamp_millis(ms: u64) -> Duration {
    let ms = i64::try_from(ms.min(MAX_RETRY_DELAY_MS)).unwrap_or(i64::MAX);
    Duration::milliseconds(ms)
}

/// Builder for [`RetryPolicy`]; starts from [`RetryPolicy::default_policy`].
#[derive(Clone, Debug, Default)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.policy.max_attempts = max_attempts;
        self
    }

    pub fn initial_delay(mut self, delay: std::time::Duration) -> Self {
        self.policy.initial_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn max_delay(mut self, delay: std::time::Duration) -> Self {
        self.policy.max_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.policy.backoff_multiplier = multiplier;
        self
    }

    pub fn exponential(mut self, exponential: bool) -> Self {
        self.policy.exponential = exponential;
        self
    }

    pub fn build(self) -> Result<RetryPolicy, ConfigError> {
        self.policy.validate()?;
        Ok(self.policy)
    }
}
