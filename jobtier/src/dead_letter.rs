use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::execution::JobExecution;
use crate::metrics::JobMetrics;
use crate::queue::PriorityJobQueue;
use crate::telemetry;

/// Reason recorded for executions dead-lettered without an error message.
pub const UNKNOWN_ERROR: &str = "unknown error";

/// Terminal store for executions that exhausted their retries or could
/// not be re-queued.
///
/// Unbounded and never rejects. Entries stay until an operator drains,
/// replays or clears them.
pub struct DeadLetterQueue<P> {
    name: String,
    entries: Mutex<VecDeque<JobExecution<P>>>,
    depth: AtomicUsize,
    metrics: Arc<JobMetrics>,
}

impl<P> std::fmt::Debug for DeadLetterQueue<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadLetterQueue")
            .field("name", &self.name)
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

impl<P> DeadLetterQueue<P> {
    pub fn new(name: impl Into<String>, metrics: Arc<JobMetrics>) -> Self {
        let name = name.into();
        metrics.set_dead_letter_depth(&name, 0);
        Self {
            name,
            entries: Mutex::new(VecDeque::new()),
            depth: AtomicUsize::new(0),
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append an execution. An execution without a recorded error is
    /// stored with [`UNKNOWN_ERROR`].
    pub fn add(&self, execution: JobExecution<P>) {
        let execution = if execution.last_error().is_none() {
            execution.with_reason(UNKNOWN_ERROR)
        } else {
            execution
        };
        let id = execution.execution_id();
        let priority = execution.priority();
        let attempts = execution.attempt_number();
        let error = execution.last_error().unwrap_or(UNKNOWN_ERROR).to_string();

        let _span = telemetry::dead_letter_span(&self.name, id).entered();
        {
            let mut entries = self.entries.lock();
            entries.push_back(execution);
            self.store_depth(entries.len());
        }

        tracing::error!(
            execution_id = %id,
            %priority,
            attempts,
            error = %error,
            "job moved to dead letter queue"
        );
        self.metrics.inc_dead_letter_added(&self.name, priority);
    }

    /// Remove the oldest entry.
    pub fn poll(&self) -> Option<JobExecution<P>> {
        let execution = self.take_front()?;
        self.metrics.inc_dead_letter_removed(&self.name);
        Some(execution)
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    /// Discard every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut entries = self.entries.lock();
            let removed = entries.len();
            entries.clear();
            self.store_depth(0);
            removed
        };
        tracing::info!(queue = %self.name, removed, "dead letter queue cleared");
        removed
    }

    /// Move up to `limit` entries back into `queue` as fresh attempts.
    ///
    /// Each replay is a new execution with a fresh id and attempt count,
    /// linked to the dead-lettered one through
    /// [`JobExecution::replayed_from`]; the last error is kept. Replay stops
    /// at the first entry whose lane is full, leaving it and everything
    /// behind it in place. Returns the number replayed.
    pub fn requeue_into(&self, queue: &PriorityJobQueue<P>, limit: usize) -> usize {
        let mut replayed = 0;
        while replayed < limit {
            let Some(execution) = self.take_front() else {
                break;
            };
            let id = execution.execution_id();
            let (replay, origin) = execution.replayed();
            let replay_id = replay.execution_id();
            match queue.enqueue_execution(replay) {
                Ok(()) => {
                    replayed += 1;
                    self.metrics.inc_dead_letter_removed(&self.name);
                    tracing::info!(
                        execution_id = %id,
                        %replay_id,
                        queue = %queue.name(),
                        "dead letter replayed"
                    );
                }
                Err(full) => {
                    {
                        let mut entries = self.entries.lock();
                        entries.push_front(full.into_execution().restored(origin));
                        self.store_depth(entries.len());
                    }
                    tracing::warn!(
                        execution_id = %id,
                        queue = %queue.name(),
                        "dead letter replay stopped, queue at capacity"
                    );
                    break;
                }
            }
        }
        replayed
    }

    fn take_front(&self) -> Option<JobExecution<P>> {
        let mut entries = self.entries.lock();
        let execution = entries.pop_front()?;
        self.store_depth(entries.len());
        Some(execution)
    }

    /// Call with the entries lock held.
    fn store_depth(&self, depth: usize) {
        self.depth.store(depth, Ordering::Release);
        self.metrics.set_dead_letter_depth(&self.name, depth);
    }
}

impl<P: Clone> DeadLetterQueue<P> {
    /// Copy of every entry, oldest first.
    pub fn peek_all(&self) -> Vec<JobExecution<P>> {
        self.entries.lock().iter().cloned().collect()
    }
}
