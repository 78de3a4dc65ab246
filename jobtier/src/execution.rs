use std::fmt::Display;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::priority::JobPriority;

/// Unique identifier for one logical job, stable across its retries.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A payload wrapped with the scheduling metadata tracked across attempts.
///
/// Values are immutable. Retries and re-queues produce a new envelope
/// carrying the same `execution_id`, payload and original `enqueued_at`,
/// so the attempt count of one id never goes down. A dead-letter replay
/// starts a new logical job instead: fresh id, attempt 0, and a link back
/// to the id it was replayed from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobExecution<P> {
    execution_id: ExecutionId,
    payload: P,
    priority: JobPriority,
    enqueued_at: DateTime<Utc>,
    queued_at: DateTime<Utc>,
    attempt_number: u32,
    last_error: Option<String>,
    last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    replayed_from: Option<ExecutionId>,
}

impl<P> JobExecution<P> {
    /// Wrap a fresh payload: attempt 0, enqueued now.
    pub fn new(payload: P, priority: JobPriority) -> Self {
        let now = Utc::now();
        Self {
            execution_id: ExecutionId::new(),
            payload,
            priority,
            enqueued_at: now,
            queued_at: now,
            attempt_number: 0,
            last_error: None,
            last_attempt_at: None,
            replayed_from: None,
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    pub fn priority(&self) -> JobPriority {
        self.priority
    }

    /// Time of the original enqueue; never changes across retries.
    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    /// Time of the most recent insertion into a priority queue.
    pub fn queued_at(&self) -> DateTime<Utc> {
        self.queued_at
    }

    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at
    }

    /// Id of the dead-lettered execution this one replays, if any.
    pub fn replayed_from(&self) -> Option<ExecutionId> {
        self.replayed_from
    }

    /// Backlog age measured from the original enqueue.
    pub fn age(&self) -> Duration {
        Utc::now() - self.enqueued_at
    }

    /// Time spent waiting since the last insertion into a queue.
    pub fn wait_time(&self, now: DateTime<Utc>) -> Duration {
        now - self.queued_at
    }

    /// The envelope for the next attempt after a failure.
    pub fn with_retry(self, error: impl Into<String>) -> Self {
        Self {
            attempt_number: self.attempt_number.saturating_add(1),
            last_error: Some(error.into()),
            last_attempt_at: Some(Utc::now()),
            ..self
        }
    }

    /// Record a terminal reason without counting another attempt.
    pub(crate) fn with_reason(self, reason: impl Into<String>) -> Self {
        Self {
            last_error: Some(reason.into()),
            ..self
        }
    }

    /// Restamp the queue-insertion time.
    pub(crate) fn queued(self, at: DateTime<Utc>) -> Self {
        Self {
            queued_at: at,
            ..self
        }
    }

    /// A manual replay: a new logical job for the same payload. The last
    /// error stays for context. The returned origin undoes the replay if
    /// the new job cannot be queued.
    pub(crate) fn replayed(self) -> (Self, ReplayOrigin) {
        let origin = ReplayOrigin {
            execution_id: self.execution_id,
            enqueued_at: self.enqueued_at,
            queued_at: self.queued_at,
            attempt_number: self.attempt_number,
            last_attempt_at: self.last_attempt_at,
            replayed_from: self.replayed_from,
        };
        let now = Utc::now();
        let replay = Self {
            execution_id: ExecutionId::new(),
            enqueued_at: now,
            queued_at: now,
            attempt_number: 0,
            last_attempt_at: None,
            replayed_from: Some(self.execution_id),
            ..self
        };
        (replay, origin)
    }

    /// Turn a replay that was not queued back into the dead-lettered
    /// execution it came from.
    pub(crate) fn restored(self, origin: ReplayOrigin) -> Self {
        Self {
            execution_id: origin.execution_id,
            enqueued_at: origin.enqueued_at,
            queued_at: origin.queued_at,
            attempt_number: origin.attempt_number,
            last_attempt_at: origin.last_attempt_at,
            replayed_from: origin.replayed_from,
            ..self
        }
    }
}

/// Identity of a dead-lettered execution while its replay is in flight.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ReplayOrigin {
    execution_id: ExecutionId,
    enqueued_at: DateTime<Utc>,
    queued_at: DateTime<Utc>,
    attempt_number: u32,
    last_attempt_at: Option<DateTime<Utc>>,
    replayed_from: Option<ExecutionId>,
}
