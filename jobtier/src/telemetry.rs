//! Tracing spans and lifecycle recording helpers.
//!
//! Every `record_*` function writes a structured log line and updates the
//! matching [`JobMetrics`] families, so call sites never have to keep the
//! two in sync by hand.

use std::time::Instant;

use tracing::{Span, info_span};

use crate::execution::ExecutionId;
use crate::metrics::{JobMetrics, JobStatus};
use crate::priority::JobPriority;

/// Span for an enqueue into a named queue.
#[must_use]
pub fn enqueue_span(queue: &str, priority: JobPriority) -> Span {
    info_span!(
        "jobtier.enqueue",
        queue = %queue,
        priority = %priority,
    )
}

/// Span wrapping one handler invocation.
#[must_use]
pub fn process_span(
    queue: &str,
    execution_id: ExecutionId,
    priority: JobPriority,
    attempt: u32,
) -> Span {
    info_span!(
        "jobtier.process",
        queue = %queue,
        execution_id = %execution_id,
        priority = %priority,
        attempt = attempt,
    )
}

/// Span for moving an execution into the dead-letter sink.
#[must_use]
pub fn dead_letter_span(queue: &str, execution_id: ExecutionId) -> Span {
    info_span!(
        "jobtier.dead_letter",
        queue = %queue,
        execution_id = %execution_id,
    )
}

pub(crate) fn record_enqueued(
    metrics: &JobMetrics,
    queue: &str,
    priority: JobPriority,
    depth: usize,
    age_secs: f64,
) {
    tracing::debug!(queue, %priority, depth, "job enqueued");
    metrics.inc_enqueued(queue, priority);
    metrics.observe_age(queue, priority, age_secs);
}

pub(crate) fn record_overflow(
    metrics: &JobMetrics,
    queue: &str,
    priority: JobPriority,
    capacity: usize,
) {
    tracing::warn!(queue, %priority, capacity, "queue at capacity, enqueue rejected");
    metrics.inc_overflow(queue, priority);
}

pub(crate) fn record_polled(
    metrics: &JobMetrics,
    queue: &str,
    priority: JobPriority,
    depth: usize,
    wait_secs: f64,
) {
    tracing::debug!(queue, %priority, depth, wait_secs, "job polled");
    metrics.inc_polled(queue, priority);
    metrics.observe_wait(queue, priority, wait_secs);
}

pub(crate) fn record_succeeded(
    metrics: &JobMetrics,
    queue: &str,
    priority: JobPriority,
    attempt: u32,
    timer: JobTimer,
) {
    let duration_secs = timer.elapsed_secs();
    tracing::info!(queue, %priority, attempt, duration_secs, "job completed");
    metrics.observe_duration(queue, priority, JobStatus::Success, duration_secs);
    metrics.inc_completed(queue, priority);
    if attempt > 0 {
        metrics.inc_retry_succeeded(queue, priority, attempt.saturating_add(1));
    }
}

pub(crate) fn record_failed(
    metrics: &JobMetrics,
    queue: &str,
    priority: JobPriority,
    attempt: u32,
    error: &str,
    timer: JobTimer,
) {
    let duration_secs = timer.elapsed_secs();
    tracing::error!(queue, %priority, attempt, duration_secs, error, "job failed");
    metrics.observe_duration(queue, priority, JobStatus::Failed, duration_secs);
    metrics.inc_failed(queue, priority, attempt.saturating_add(1));
}

/// Log a scheduled retry and its backoff. The retried counter moves only
/// once the retry is back in the queue.
pub(crate) fn record_retry_scheduled(
    metrics: &JobMetrics,
    queue: &str,
    priority: JobPriority,
    attempt: u32,
    max_attempts: u32,
    delay: chrono::Duration,
) {
    let delay_ms = delay.num_milliseconds();
    tracing::info!(
        queue,
        %priority,
        attempt,
        max_attempts,
        delay_ms,
        "scheduling retry"
    );
    metrics.observe_retry_delay(queue, priority, delay_ms as f64 / 1000.0);
}

pub(crate) fn record_exhausted(
    metrics: &JobMetrics,
    queue: &str,
    priority: JobPriority,
    attempts: u32,
) {
    tracing::warn!(queue, %priority, attempts, "retries exhausted");
    metrics.inc_exhausted(queue, priority);
}

/// Start timing a handler invocation.
pub(crate) fn start_timer() -> JobTimer {
    JobTimer {
        start: Instant::now(),
    }
}

/// Measures one handler invocation; consumed when the outcome is recorded.
#[derive(Debug)]
pub(crate) struct JobTimer {
    start: Instant,
}

impl JobTimer {
    fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_names() {
        let id = ExecutionId::new();
        // Without a subscriber spans are disabled and carry no metadata.
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::fmt().with_test_writer().finish(),
        );

        let span = enqueue_span("reports", JobPriority::High);
        assert_eq!(span.metadata().unwrap().name(), "jobtier.enqueue");

        let span = process_span("reports", id, JobPriority::High, 2);
        assert_eq!(span.metadata().unwrap().name(), "jobtier.process");

        let span = dead_letter_span("reports", id);
        assert_eq!(span.metadata().unwrap().name(), "jobtier.dead_letter");
    }

    #[test]
    fn test_success_after_retry_counts_retry_success() {
        let metrics = JobMetrics::new().unwrap();
        record_succeeded(&metrics, "q", JobPriority::Low, 0, start_timer());
        record_succeeded(&metrics, "q", JobPriority::Low, 2, start_timer());

        assert_eq!(metrics.completed_total("q", JobPriority::Low), 2);
        // Labels count runs from 1: attempt 2 is the third run.
        assert_eq!(metrics.retry_succeeded_total("q", JobPriority::Low, 3), 1);
        assert_eq!(metrics.retry_succeeded_total("q", JobPriority::Low, 1), 0);
        assert_eq!(
            metrics.duration_count("q", JobPriority::Low, JobStatus::Success),
            2
        );
    }

    #[test]
    fn test_failed_label_matches_retry_that_follows() {
        let metrics = JobMetrics::new().unwrap();
        record_failed(&metrics, "q", JobPriority::High, 0, "boom", start_timer());
        assert_eq!(metrics.failed_total("q", JobPriority::High, 1), 1);
        assert_eq!(metrics.failed_total("q", JobPriority::High, 0), 0);
    }

    #[test]
    fn test_retry_scheduled_leaves_retried_counter_alone() {
        let metrics = JobMetrics::new().unwrap();
        record_retry_scheduled(
            &metrics,
            "q",
            JobPriority::High,
            3,
            5,
            chrono::Duration::seconds(4),
        );
        assert_eq!(metrics.retried_total("q", JobPriority::High, 3), 0);
        let text = metrics.gather().unwrap();
        assert!(text.contains("jobtier_retry_delay_seconds_count"));
    }
}
