use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::JobConfig;
use crate::error::QueueFull;
use crate::events::{InProcEventBus, JobEvent, JobEventPayload};
use crate::execution::{ExecutionId, JobExecution};
use crate::metrics::JobMetrics;
use crate::priority::JobPriority;
use crate::telemetry;

struct Lane<P> {
    items: Mutex<VecDeque<JobExecution<P>>>,
    depth: AtomicUsize,
    capacity: usize,
}

/// Bounded in-memory queue with one FIFO lane per priority.
///
/// `poll` always serves the highest non-empty priority first; there is no
/// aging, so a steady stream of critical work can starve lower tiers.
/// Each lane has its own lock and the capacity check happens under it, so
/// concurrent producers can never push a lane past its bound.
pub struct PriorityJobQueue<P> {
    name: String,
    lanes: [Lane<P>; JobPriority::ALL.len()],
    metrics: Arc<JobMetrics>,
    events: Option<Arc<InProcEventBus>>,
}

impl<P> std::fmt::Debug for PriorityJobQueue<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityJobQueue")
            .field("name", &self.name)
            .field("total_depth", &self.total_depth())
            .finish_non_exhaustive()
    }
}

impl<P> PriorityJobQueue<P> {
    pub fn new(name: impl Into<String>, config: &JobConfig, metrics: Arc<JobMetrics>) -> Self {
        let name = name.into();
        let lanes = JobPriority::ALL.map(|priority| Lane {
            items: Mutex::new(VecDeque::new()),
            depth: AtomicUsize::new(0),
            capacity: config.queue_capacity(priority),
        });
        for priority in JobPriority::ALL {
            metrics.set_queue_depth(&name, priority, 0);
        }
        Self {
            name,
            lanes,
            metrics,
            events: None,
        }
    }

    /// Publish lifecycle events for this queue on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<InProcEventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<JobMetrics> {
        &self.metrics
    }

    pub(crate) fn publish(&self, execution_id: ExecutionId, payload: JobEventPayload) {
        if let Some(bus) = &self.events {
            bus.publish_job(JobEvent::new(self.name.clone(), execution_id, payload));
        }
    }

    fn lane(&self, priority: JobPriority) -> &Lane<P> {
        &self.lanes[priority.index()]
    }

    /// Wrap `payload` in a fresh execution and append it to its lane.
    ///
    /// Never blocks. When the lane is full the execution is handed back in
    /// the error.
    pub fn enqueue(&self, payload: P, priority: JobPriority) -> Result<ExecutionId, QueueFull<P>> {
        let execution = JobExecution::new(payload, priority);
        let id = execution.execution_id();
        self.enqueue_execution(execution)?;
        Ok(id)
    }

    /// Append a pre-built execution (typically a retry) to the back of its
    /// lane, restamping its queue-insertion time.
    pub fn enqueue_execution(&self, execution: JobExecution<P>) -> Result<(), QueueFull<P>> {
        let priority = execution.priority();
        let _span = telemetry::enqueue_span(&self.name, priority).entered();
        let lane = self.lane(priority);
        let now = Utc::now();

        let mut items = lane.items.lock();
        if items.len() >= lane.capacity {
            drop(items);
            telemetry::record_overflow(&self.metrics, &self.name, priority, lane.capacity);
            self.publish(
                execution.execution_id(),
                JobEventPayload::Overflowed {
                    priority,
                    capacity: lane.capacity,
                },
            );
            return Err(QueueFull {
                queue: self.name.clone(),
                priority,
                capacity: lane.capacity,
                execution,
            });
        }

        let id = execution.execution_id();
        let attempt = execution.attempt_number();
        let age_secs = seconds(now - execution.enqueued_at());
        items.push_back(execution.queued(now));
        let depth = items.len();
        lane.depth.store(depth, Ordering::Release);
        self.metrics.set_queue_depth(&self.name, priority, depth);
        drop(items);

        telemetry::record_enqueued(&self.metrics, &self.name, priority, depth, age_secs);
        self.publish(id, JobEventPayload::Enqueued { priority, attempt });
        Ok(())
    }

    /// Take the oldest execution of the highest non-empty priority.
    pub fn poll(&self) -> Option<JobExecution<P>> {
        for priority in JobPriority::ALL {
            let lane = self.lane(priority);
            if lane.depth.load(Ordering::Acquire) == 0 {
                continue;
            }

            let mut items = lane.items.lock();
            let Some(execution) = items.pop_front() else {
                continue;
            };
            let depth = items.len();
            lane.depth.store(depth, Ordering::Release);
            self.metrics.set_queue_depth(&self.name, priority, depth);
            drop(items);

            let wait_secs = seconds(execution.wait_time(Utc::now()));
            telemetry::record_polled(&self.metrics, &self.name, priority, depth, wait_secs);
            self.publish(
                execution.execution_id(),
                JobEventPayload::Polled {
                    priority,
                    attempt: execution.attempt_number(),
                },
            );
            return Some(execution);
        }
        None
    }

    pub fn depth(&self, priority: JobPriority) -> usize {
        self.lane(priority).depth.load(Ordering::Acquire)
    }

    pub fn total_depth(&self) -> usize {
        JobPriority::ALL.iter().map(|p| self.depth(*p)).sum()
    }

    pub fn capacity(&self, priority: JobPriority) -> usize {
        self.lane(priority).capacity
    }

    pub fn is_empty(&self) -> bool {
        self.total_depth() == 0
    }

    /// Point-in-time view of every lane.
    pub fn snapshot(&self) -> QueueSnapshot {
        let sampled_at = Utc::now();
        let lanes = JobPriority::ALL
            .iter()
            .map(|&priority| {
                let lane = self.lane(priority);
                let items = lane.items.lock();
                QueueSnapshotEntry {
                    priority,
                    depth: items.len(),
                    capacity: lane.capacity,
                    oldest_enqueued_at: items.front().map(|e| e.enqueued_at()),
                }
            })
            .collect();
        QueueSnapshot {
            queue: self.name.clone(),
            sampled_at,
            lanes,
        }
    }

    /// Drop everything pending. Returns how many executions were removed.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        for priority in JobPriority::ALL {
            let lane = self.lane(priority);
            let mut items = lane.items.lock();
            removed += items.len();
            items.clear();
            lane.depth.store(0, Ordering::Release);
            self.metrics.set_queue_depth(&self.name, priority, 0);
        }
        if removed > 0 {
            tracing::info!(queue = %self.name, removed, "queue cleared");
        }
        removed
    }
}

fn seconds(duration: Duration) -> f64 {
    duration.num_milliseconds().max(0) as f64 / 1000.0
}

/// Snapshot of queue state at a point in time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub queue: String,
    pub sampled_at: DateTime<Utc>,
    /// One entry per priority, highest first.
    pub lanes: Vec<QueueSnapshotEntry>,
}

impl QueueSnapshot {
    pub fn entry(&self, priority: JobPriority) -> Option<&QueueSnapshotEntry> {
        self.lanes.iter().find(|lane| lane.priority == priority)
    }

    pub fn total_depth(&self) -> usize {
        self.lanes.iter().map(|lane| lane.depth).sum()
    }
}

/// Statistics for a single priority lane.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueSnapshotEntry {
    pub priority: JobPriority,
    pub depth: usize,
    pub capacity: usize,
    /// Original enqueue time of the execution at the head of the lane.
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
}

impl QueueSnapshotEntry {
    /// Backlog age of the head of the lane relative to `now`.
    pub fn oldest_age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.oldest_enqueued_at.map(|at| now - at)
    }
}
