use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::priority::JobPriority;
use crate::retry::RetryPolicy;

/// Capacity used for tiers without an explicit bound.
pub const UNBOUNDED: usize = usize::MAX;

/// How retries wait out their backoff.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryScheduling {
    /// Hold the retry until its backoff elapses, then push it to the back
    /// of its priority queue.
    #[default]
    Deferred,
    /// Push the retry to the back of its queue right away; the computed
    /// backoff is advisory only.
    Immediate,
}

/// Per-tier settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    /// Retry policy applied to failures at this tier.
    pub retry: RetryPolicy,
    /// Maximum number of pending executions.
    pub capacity: usize,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default_policy(),
            capacity: UNBOUNDED,
        }
    }
}

/// Registry mapping each priority to its retry policy and queue capacity.
///
/// Defaults (see [`JobConfig::defaults`]):
///
/// | Priority | Retry        | Capacity  |
/// |----------|--------------|-----------|
/// | critical | aggressive   | 1 000     |
/// | high     | default      | 5 000     |
/// | default  | default      | 10 000    |
/// | low      | default      | 10 000    |
/// | bulk     | no retry     | unbounded |
///
/// Tiers missing from the registry use the default retry policy with an
/// unbounded queue.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Per-priority overrides.
    pub priorities: HashMap<JobPriority, PriorityConfig>,
    /// Whether retries honor their backoff before re-entering a queue.
    pub retry_scheduling: RetryScheduling,
}

impl JobConfig {
    pub fn builder() -> JobConfigBuilder {
        JobConfigBuilder::default()
    }

    /// The documented production defaults.
    pub fn defaults() -> Self {
        let tiers = [
            (JobPriority::Critical, RetryPolicy::aggressive(), 1_000),
            (JobPriority::High, RetryPolicy::default_policy(), 5_000),
            (JobPriority::Default, RetryPolicy::default_policy(), 10_000),
            (JobPriority::Low, RetryPolicy::default_policy(), 10_000),
            (JobPriority::Bulk, RetryPolicy::no_retry(), UNBOUNDED),
        ];

        Self {
            priorities: tiers
                .into_iter()
                .map(|(priority, retry, capacity)| {
                    (priority, PriorityConfig { retry, capacity })
                })
                .collect(),
            retry_scheduling: RetryScheduling::Deferred,
        }
    }

    /// Parse and validate a JSON document.
    ///
    /// Missing fields fall back to the same values as an empty registry.
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        let config: JobConfig = serde_json::from_str(input)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn retry_policy(&self, priority: JobPriority) -> RetryPolicy {
        self.priorities
            .get(&priority)
            .map(|tier| tier.retry.clone())
            .unwrap_or_default()
    }

    pub fn queue_capacity(&self, priority: JobPriority) -> usize {
        self.priorities
            .get(&priority)
            .map_or(UNBOUNDED, |tier| tier.capacity)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (priority, tier) in &self.priorities {
            if tier.capacity == 0 {
                return Err(ConfigError::ZeroCapacity {
                    priority: *priority,
                });
            }
            tier.retry.validate().map_err(|source| ConfigError::Policy {
                priority: *priority,
                source: Box::new(source),
            })?;
        }
        Ok(())
    }
}

/// Incremental construction of a [`JobConfig`].
#[derive(Clone, Debug, Default)]
pub struct JobConfigBuilder {
    config: JobConfig,
}

impl JobConfigBuilder {
    pub fn retry_policy(mut self, priority: JobPriority, policy: RetryPolicy) -> Self {
        self.config.priorities.entry(priority).or_default().retry = policy;
        self
    }

    pub fn queue_capacity(mut self, priority: JobPriority, capacity: usize) -> Self {
        self.config.priorities.entry(priority).or_default().capacity = capacity;
        self
    }

    pub fn retry_scheduling(mut self, scheduling: RetryScheduling) -> Self {
        self.config.retry_scheduling = scheduling;
        self
    }

    pub fn build(self) -> Result<JobConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_table() {
        let config = JobConfig::defaults();
        assert_eq!(config.retry_policy(JobPriority::Critical), RetryPolicy::aggressive());
        assert_eq!(config.retry_policy(JobPriority::Low), RetryPolicy::default_policy());
        assert_eq!(config.retry_policy(JobPriority::Bulk), RetryPolicy::no_retry());
        assert_eq!(config.queue_capacity(JobPriority::Critical), 1_000);
        assert_eq!(config.queue_capacity(JobPriority::High), 5_000);
        assert_eq!(config.queue_capacity(JobPriority::Default), 10_000);
        assert_eq!(config.queue_capacity(JobPriority::Bulk), UNBOUNDED);
        assert_eq!(config.retry_scheduling, RetryScheduling::Deferred);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_tier_falls_back() {
        let config = JobConfig::builder()
            .queue_capacity(JobPriority::High, 7)
            .build()
            .unwrap();
        assert_eq!(config.queue_capacity(JobPriority::High), 7);
        assert_eq!(config.retry_policy(JobPriority::High), RetryPolicy::default_policy());
        assert_eq!(config.queue_capacity(JobPriority::Low), UNBOUNDED);
        assert_eq!(config.retry_policy(JobPriority::Low), RetryPolicy::default_policy());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = JobConfig::builder()
            .queue_capacity(JobPriority::Default, 0)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::ZeroCapacity {
                priority: JobPriority::Default
            }
        );
    }

    #[test]
    fn test_from_json() {
        let config = JobConfig::from_json(
            r#"{
                "retry_scheduling": "immediate",
                "priorities": {
                    "critical": { "capacity": 10, "retry": { "max_attempts": 7 } },
                    "bulk": { "retry": { "max_attempts": 0, "exponential": false } }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.retry_scheduling, RetryScheduling::Immediate);
        assert_eq!(config.queue_capacity(JobPriority::Critical), 10);
        let critical = config.retry_policy(JobPriority::Critical);
        assert_eq!(critical.max_attempts, 7);
        assert_eq!(critical.initial_delay_ms, 1_000);
        assert_eq!(config.retry_policy(JobPriority::Bulk).max_attempts, 0);
        assert_eq!(config.queue_capacity(JobPriority::Bulk), UNBOUNDED);
    }

    #[test]
    fn test_from_json_rejects_invalid_policy() {
        let err = JobConfig::from_json(
            r#"{ "priorities": { "low": { "retry": { "backoff_multiplier": -1.0 } } } }"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Policy {
                priority: JobPriority::Low,
                ..
            }
        ));

        let err = JobConfig::from_json(
            r#"{ "priorities": { "high": { "retry": {
                "max_delay_ms": 18446744073709551615,
                "backoff_multiplier": 1e300
            } } } }"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Policy {
                priority: JobPriority::High,
                ..
            }
        ));

        assert!(matches!(
            JobConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
