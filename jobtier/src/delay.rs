//! Holding area for retries still waiting out their backoff.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::execution::JobExecution;
use crate::priority::JobPriority;

struct Deferred<P> {
    eligible_at: DateTime<Utc>,
    seq: u64,
    execution: JobExecution<P>,
}

impl<P> Deferred<P> {
    fn key(&self) -> (DateTime<Utc>, u64) {
        (self.eligible_at, self.seq)
    }
}

impl<P> PartialEq for Deferred<P> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<P> Eq for Deferred<P> {}

impl<P> PartialOrd for Deferred<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for Deferred<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

struct Inner<P> {
    heap: BinaryHeap<Reverse<Deferred<P>>>,
    next_seq: u64,
    per_priority: [usize; JobPriority::ALL.len()],
}

/// Retries ordered by the instant they become eligible.
///
/// Executions with the same eligibility instant come out in the order
/// they were deferred.
pub(crate) struct DelayedRetries<P> {
    inner: Mutex<Inner<P>>,
}

impl<P> DelayedRetries<P> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_seq: 0,
                per_priority: [0; JobPriority::ALL.len()],
            }),
        }
    }

    /// Hold `execution` until `eligible_at`. Returns the number now held at
    /// its priority.
    pub(crate) fn defer(
        &self,
        execution: JobExecution<P>,
        eligible_at: DateTime<Utc>,
    ) -> usize {
        let mut inner = self.inner.lock();
        let idx = execution.priority().index();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(Reverse(Deferred {
            eligible_at,
            seq,
            execution,
        }));
        inner.per_priority[idx] += 1;
        inner.per_priority[idx]
    }

    /// Remove every execution eligible at or before `now`, earliest first.
    pub(crate) fn take_due(&self, now: DateTime<Utc>) -> Vec<JobExecution<P>> {
        let mut inner = self.inner.lock();
        let mut due = Vec::new();
        while inner
            .heap
            .peek()
            .is_some_and(|Reverse(next)| next.eligible_at <= now)
        {
            if let Some(Reverse(next)) = inner.heap.pop() {
                inner.per_priority[next.execution.priority().index()] -= 1;
                due.push(next.execution);
            }
        }
        due
    }

    /// Remove everything regardless of eligibility, earliest first.
    pub(crate) fn take_all(&self) -> Vec<JobExecution<P>> {
        let mut inner = self.inner.lock();
        inner.per_priority = [0; JobPriority::ALL.len()];
        let mut all = Vec::with_capacity(inner.heap.len());
        while let Some(Reverse(next)) = inner.heap.pop() {
            all.push(next.execution);
        }
        all
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub(crate) fn len_for(&self, priority: JobPriority) -> usize {
        self.inner.lock().per_priority[priority.index()]
    }

    pub(crate) fn next_eligible_at(&self) -> Option<DateTime<Utc>> {
        self.inner
            .lock()
            .heap
            .peek()
            .map(|Reverse(next)| next.eligible_at)
    }
}
