use std::fmt;

use thiserror::Error;

use crate::execution::JobExecution;
use crate::priority::JobPriority;

/// Returned when a priority label does not name a known tier.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown job priority: {0}")]
pub struct ParsePriorityError(pub String);

/// Invalid job framework configuration.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("backoff multiplier must be finite and > 0, got {0}")]
    InvalidMultiplier(f64),
    #[error(
        "max delay ({max_delay_ms}ms) must not be below initial delay ({initial_delay_ms}ms)"
    )]
    DelayRange {
        initial_delay_ms: u64,
        max_delay_ms: u64,
    },
    #[error("retry delay {delay_ms}ms exceeds the {limit_ms}ms limit")]
    DelayTooLarge { delay_ms: u64, limit_ms: u64 },
    #[error("queue capacity for {priority} must be > 0")]
    ZeroCapacity { priority: JobPriority },
    #[error("invalid {priority} retry policy: {source}")]
    Policy {
        priority: JobPriority,
        #[source]
        source: Box<ConfigError>,
    },
    #[error("failed to parse job config: {0}")]
    Parse(String),
}

/// A priority queue rejected an insertion because it is at capacity.
///
/// The rejected execution is handed back so the caller can decide what to
/// do with it (shed, back off, or dead-letter).
#[derive(Error)]
#[error("queue {queue} at capacity for priority {priority} (limit: {capacity})")]
pub struct QueueFull<P> {
    pub queue: String,
    pub priority: JobPriority,
    pub capacity: usize,
    pub execution: JobExecution<P>,
}

impl<P> QueueFull<P> {
    /// Take back the execution that did not fit.
    pub fn into_execution(self) -> JobExecution<P> {
        self.execution
    }
}

impl<P> fmt::Debug for QueueFull<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueFull")
            .field("queue", &self.queue)
            .field("priority", &self.priority)
            .field("capacity", &self.capacity)
            .field("execution_id", &self.execution.execution_id())
            .finish_non_exhaustive()
    }
}
