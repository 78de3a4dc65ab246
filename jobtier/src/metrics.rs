//! Prometheus instrumentation for job queues and processors.
//!
//! Each [`JobMetrics`] owns its metric families and registers them in one
//! [`Registry`]. Every family carries a `queue` label so several queues
//! (e.g. `media.processing`, `compliance.export`) can share one instance.
//!
//! # Metrics
//!
//! ## Counters
//! - `jobtier_jobs_enqueued_total` - executions accepted into a queue
//! - `jobtier_jobs_polled_total` - executions handed to a worker
//! - `jobtier_queue_overflow_total` - insertions rejected at capacity
//! - `jobtier_jobs_started_total` - handler invocations
//! - `jobtier_jobs_completed_total` - successful handler invocations
//! - `jobtier_jobs_failed_total` - failed invocations, by attempt
//! - `jobtier_jobs_retried_total` - retries that re-entered the queue, by attempt
//! - `jobtier_jobs_retry_succeeded_total` - successes after a retry, by attempt
//! - `jobtier_jobs_exhausted_total` - executions out of retries
//! - `jobtier_dead_letter_added_total` / `jobtier_dead_letter_removed_total`
//!
//! The `attempt` label counts runs starting at 1. `failed` and
//! `retry_succeeded` carry the run that failed or succeeded; `retried`
//! carries the retry number n, which follows the failure of run n. A job
//! that fails its first run is therefore `failed{attempt="1"}` followed by
//! `retried{attempt="1"}`.
//!
//! A retry that cannot re-enter a full lane is dead-lettered and never
//! counted as retried.
//!
//! ## Gauges
//! - `jobtier_queue_depth` - pending executions per priority
//! - `jobtier_deferred_retries` - retries waiting out their backoff
//! - `jobtier_dead_letter_depth` - dead-lettered executions
//!
//! ## Histograms
//! - `jobtier_queue_wait_seconds` - time between queue insertion and poll
//! - `jobtier_job_age_seconds` - backlog age at insertion
//! - `jobtier_job_duration_seconds` - handler duration, by status
//! - `jobtier_retry_delay_seconds` - computed backoff per scheduled retry

use std::fmt;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    exponential_buckets,
};

use crate::priority::JobPriority;

/// Handler outcome label for duration histograms.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobStatus {
    Success,
    Failed,
}

impl JobStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }
}

/// Metric families for the job framework.
pub struct JobMetrics {
    registry: Registry,
    enqueued: IntCounterVec,
    polled: IntCounterVec,
    overflow: IntCounterVec,
    started: IntCounterVec,
    completed: IntCounterVec,
    failed: IntCounterVec,
    retried: IntCounterVec,
    retry_succeeded: IntCounterVec,
    exhausted: IntCounterVec,
    dead_letter_added: IntCounterVec,
    dead_letter_removed: IntCounterVec,
    queue_depth: IntGaugeVec,
    deferred_retries: IntGaugeVec,
    dead_letter_depth: IntGaugeVec,
    wait_time: HistogramVec,
    job_age: HistogramVec,
    duration: HistogramVec,
    retry_delay: HistogramVec,
}

impl fmt::Debug for JobMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobMetrics")
            .field("families", &self.registry.gather().len())
            .finish_non_exhaustive()
    }
}

fn counter(name: &str, help: &str, labels: &[&str]) -> prometheus::Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
}

fn gauge(name: &str, help: &str, labels: &[&str]) -> prometheus::Result<IntGaugeVec> {
    IntGaugeVec::new(Opts::new(name, help), labels)
}

fn histogram(
    name: &str,
    help: &str,
    labels: &[&str],
    buckets: Vec<f64>,
) -> prometheus::Result<HistogramVec> {
    HistogramVec::new(HistogramOpts::new(name, help).buckets(buckets), labels)
}

impl JobMetrics {
    /// Create metrics registered in a fresh private registry.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Create metrics registered in `registry` (e.g. the application's
    /// scrape registry).
    pub fn with_registry(registry: Registry) -> anyhow::Result<Self> {
        const QP: &[&str] = &["queue", "priority"];
        const QPA: &[&str] = &["queue", "priority", "attempt"];

        // 1ms .. ~16s for handler durations, 10ms .. ~45h for waits.
        let duration_buckets = exponential_buckets(0.001, 2.0, 15)?;
        let wait_buckets = exponential_buckets(0.01, 4.0, 12)?;

        let metrics = Self {
            enqueued: counter(
                "jobtier_jobs_enqueued_total",
                "Total number of executions accepted into a queue",
                QP,
            )?,
            polled: counter(
                "jobtier_jobs_polled_total",
                "Total number of executions polled from a queue",
                QP,
            )?,
            overflow: counter(
                "jobtier_queue_overflow_total",
                "Total number of insertions rejected at capacity",
                QP,
            )?,
            started: counter(
                "jobtier_jobs_started_total",
                "Total number of handler invocations",
                QP,
            )?,
            completed: counter(
                "jobtier_jobs_completed_total",
                "Total number of successful handler invocations",
                QP,
            )?,
            failed: counter(
                "jobtier_jobs_failed_total",
                "Total number of failed handler invocations",
                QPA,
            )?,
            retried: counter(
                "jobtier_jobs_retried_total",
                "Total number of retries that re-entered a queue",
                QPA,
            )?,
            retry_succeeded: counter(
                "jobtier_jobs_retry_succeeded_total",
                "Total number of executions that succeeded on a retry",
                QPA,
            )?,
            exhausted: counter(
                "jobtier_jobs_exhausted_total",
                "Total number of executions that ran out of retries",
                QP,
            )?,
            dead_letter_added: counter(
                "jobtier_dead_letter_added_total",
                "Total number of executions moved to the dead-letter sink",
                QP,
            )?,
            dead_letter_removed: counter(
                "jobtier_dead_letter_removed_total",
                "Total number of executions taken out of the dead-letter sink",
                &["queue"],
            )?,
            queue_depth: gauge(
                "jobtier_queue_depth",
                "Current number of pending executions",
                QP,
            )?,
            deferred_retries: gauge(
                "jobtier_deferred_retries",
                "Current number of retries waiting out their backoff",
                QP,
            )?,
            dead_letter_depth: gauge(
                "jobtier_dead_letter_depth",
                "Current number of dead-lettered executions",
                &["queue"],
            )?,
            wait_time: histogram(
                "jobtier_queue_wait_seconds",
                "Time between queue insertion and poll",
                QP,
                wait_buckets.clone(),
            )?,
            job_age: histogram(
                "jobtier_job_age_seconds",
                "Age of an execution (since original enqueue) when inserted",
                QP,
                wait_buckets,
            )?,
            duration: histogram(
                "jobtier_job_duration_seconds",
                "Handler execution duration",
                &["queue", "priority", "status"],
                duration_buckets,
            )?,
            retry_delay: histogram(
                "jobtier_retry_delay_seconds",
                "Computed backoff for scheduled retries",
                QP,
                exponential_buckets(0.1, 2.0, 14)?,
            )?,
            registry,
        };

        metrics.register()?;
        Ok(metrics)
    }

    fn register(&self) -> anyhow::Result<()> {
        let collectors: [Box<dyn prometheus::core::Collector>; 18] = [
            Box::new(self.enqueued.clone()),
            Box::new(self.polled.clone()),
            Box::new(self.overflow.clone()),
            Box::new(self.started.clone()),
            Box::new(self.completed.clone()),
            Box::new(self.failed.clone()),
            Box::new(self.retried.clone()),
            Box::new(self.retry_succeeded.clone()),
            Box::new(self.exhausted.clone()),
            Box::new(self.dead_letter_added.clone()),
            Box::new(self.dead_letter_removed.clone()),
            Box::new(self.queue_depth.clone()),
            Box::new(self.deferred_retries.clone()),
            Box::new(self.dead_letter_depth.clone()),
            Box::new(self.wait_time.clone()),
            Box::new(self.job_age.clone()),
            Box::new(self.duration.clone()),
            Box::new(self.retry_delay.clone()),
        ];

        for collector in collectors {
            self.registry.register(collector)?;
        }
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every family in Prometheus text format.
    pub fn gather(&self) -> anyhow::Result<String> {
        let encoder = prometheus::TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .map_err(Into::into)
    }

    pub(crate) fn inc_enqueued(&self, queue: &str, priority: JobPriority) {
        self.enqueued.with_label_values(&[queue, priority.as_str()]).inc();
    }

    pub(crate) fn inc_polled(&self, queue: &str, priority: JobPriority) {
        self.polled.with_label_values(&[queue, priority.as_str()]).inc();
    }

    pub(crate) fn inc_overflow(&self, queue: &str, priority: JobPriority) {
        self.overflow.with_label_values(&[queue, priority.as_str()]).inc();
    }

    pub(crate) fn inc_started(&self, queue: &str, priority: JobPriority) {
        self.started.with_label_values(&[queue, priority.as_str()]).inc();
    }

    pub(crate) fn inc_completed(&self, queue: &str, priority: JobPriority) {
        self.completed.with_label_values(&[queue, priority.as_str()]).inc();
    }

    pub(crate) fn inc_failed(&self, queue: &str, priority: JobPriority, attempt: u32) {
        self.failed
            .with_label_values(&[queue, priority.as_str(), attempt.to_string().as_str()])
            .inc();
    }

    pub(crate) fn inc_retried(&self, queue: &str, priority: JobPriority, attempt: u32) {
        self.retried
            .with_label_values(&[queue, priority.as_str(), attempt.to_string().as_str()])
            .inc();
    }

    pub(crate) fn inc_retry_succeeded(&self, queue: &str, priority: JobPriority, attempt: u32) {
        self.retry_succeeded
            .with_label_values(&[queue, priority.as_str(), attempt.to_string().as_str()])
            .inc();
    }

    pub(crate) fn inc_exhausted(&self, queue: &str, priority: JobPriority) {
        self.exhausted.with_label_values(&[queue, priority.as_str()]).inc();
    }

    pub(crate) fn inc_dead_letter_added(&self, queue: &str, priority: JobPriority) {
        self.dead_letter_added
            .with_label_values(&[queue, priority.as_str()])
            .inc();
    }

    pub(crate) fn inc_dead_letter_removed(&self, queue: &str) {
        self.dead_letter_removed.with_label_values(&[queue]).inc();
    }

    pub(crate) fn set_queue_depth(&self, queue: &str, priority: JobPriority, depth: usize) {
        self.queue_depth
            .with_label_values(&[queue, priority.as_str()])
            .set(depth as i64);
    }

    pub(crate) fn set_deferred_retries(&self, queue: &str, priority: JobPriority, count: usize) {
        self.deferred_retries
            .with_label_values(&[queue, priority.as_str()])
            .set(count as i64);
    }

    pub(crate) fn set_dead_letter_depth(&self, queue: &str, depth: usize) {
        self.dead_letter_depth
            .with_label_values(&[queue])
            .set(depth as i64);
    }

    pub(crate) fn observe_wait(&self, queue: &str, priority: JobPriority, secs: f64) {
        self.wait_time
            .with_label_values(&[queue, priority.as_str()])
            .observe(secs);
    }

    pub(crate) fn observe_age(&self, queue: &str, priority: JobPriority, secs: f64) {
        self.job_age
            .with_label_values(&[queue, priority.as_str()])
            .observe(secs);
    }

    pub(crate) fn observe_duration(
        &self,
        queue: &str,
        priority: JobPriority,
        status: JobStatus,
        secs: f64,
    ) {
        self.duration
            .with_label_values(&[queue, priority.as_str(), status.as_str()])
            .observe(secs);
    }

    pub(crate) fn observe_retry_delay(&self, queue: &str, priority: JobPriority, secs: f64) {
        self.retry_delay
            .with_label_values(&[queue, priority.as_str()])
            .observe(secs);
    }

    /// Executions accepted into `queue` at `priority`.
    pub fn enqueued_total(&self, queue: &str, priority: JobPriority) -> u64 {
        self.enqueued.with_label_values(&[queue, priority.as_str()]).get()
    }

    pub fn polled_total(&self, queue: &str, priority: JobPriority) -> u64 {
        self.polled.with_label_values(&[queue, priority.as_str()]).get()
    }

    pub fn overflow_total(&self, queue: &str, priority: JobPriority) -> u64 {
        self.overflow.with_label_values(&[queue, priority.as_str()]).get()
    }

    pub fn started_total(&self, queue: &str, priority: JobPriority) -> u64 {
        self.started.with_label_values(&[queue, priority.as_str()]).get()
    }

    pub fn completed_total(&self, queue: &str, priority: JobPriority) -> u64 {
        self.completed.with_label_values(&[queue, priority.as_str()]).get()
    }

    pub fn failed_total(&self, queue: &str, priority: JobPriority, attempt: u32) -> u64 {
        self.failed
            .with_label_values(&[queue, priority.as_str(), attempt.to_string().as_str()])
            .get()
    }

    pub fn retried_total(&self, queue: &str, priority: JobPriority, attempt: u32) -> u64 {
        self.retried
            .with_label_values(&[queue, priority.as_str(), attempt.to_string().as_str()])
            .get()
    }

    pub fn retry_succeeded_total(&self, queue: &str, priority: JobPriority, attempt: u32) -> u64 {
        self.retry_succeeded
            .with_label_values(&[queue, priority.as_str(), attempt.to_string().as_str()])
            .get()
    }

    pub fn exhausted_total(&self, queue: &str, priority: JobPriority) -> u64 {
        self.exhausted.with_label_values(&[queue, priority.as_str()]).get()
    }

    pub fn dead_letter_added_total(&self, queue: &str, priority: JobPriority) -> u64 {
        self.dead_letter_added
            .with_label_values(&[queue, priority.as_str()])
            .get()
    }

    pub fn dead_letter_removed_total(&self, queue: &str) -> u64 {
        self.dead_letter_removed.with_label_values(&[queue]).get()
    }

    pub fn queue_depth(&self, queue: &str, priority: JobPriority) -> i64 {
        self.queue_depth
            .with_label_values(&[queue, priority.as_str()])
            .get()
    }

    pub fn deferred_retries(&self, queue: &str, priority: JobPriority) -> i64 {
        self.deferred_retries
            .with_label_values(&[queue, priority.as_str()])
            .get()
    }

    pub fn dead_letter_depth(&self, queue: &str) -> i64 {
        self.dead_letter_depth.with_label_values(&[queue]).get()
    }

    /// Number of handler durations observed for `status`.
    pub fn duration_count(&self, queue: &str, priority: JobPriority, status: JobStatus) -> u64 {
        self.duration
            .with_label_values(&[queue, priority.as_str(), status.as_str()])
            .get_sample_count()
    }

    /// Number of wait-time samples observed.
    pub fn wait_count(&self, queue: &str, priority: JobPriority) -> u64 {
        self.wait_time
            .with_label_values(&[queue, priority.as_str()])
            .get_sample_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        JobMetrics::new().expect("metrics initialization should succeed");
    }

    #[test]
    fn test_shared_registry_rejects_duplicates() {
        let registry = Registry::new();
        JobMetrics::with_registry(registry.clone()).unwrap();
        assert!(JobMetrics::with_registry(registry).is_err());
    }

    #[test]
    fn test_counters_are_labeled() {
        let metrics = JobMetrics::new().unwrap();
        metrics.inc_enqueued("reports", JobPriority::High);
        metrics.inc_enqueued("reports", JobPriority::High);
        metrics.inc_failed("reports", JobPriority::High, 2);

        assert_eq!(metrics.enqueued_total("reports", JobPriority::High), 2);
        assert_eq!(metrics.enqueued_total("reports", JobPriority::Low), 0);
        assert_eq!(metrics.enqueued_total("media", JobPriority::High), 0);
        assert_eq!(metrics.failed_total("reports", JobPriority::High, 2), 1);
        assert_eq!(metrics.failed_total("reports", JobPriority::High, 1), 0);
    }

    #[test]
    fn test_gauges_and_histograms() {
        let metrics = JobMetrics::new().unwrap();
        metrics.set_queue_depth("reports", JobPriority::Bulk, 42);
        metrics.set_dead_letter_depth("reports", 3);
        metrics.observe_duration("reports", JobPriority::Bulk, JobStatus::Failed, 0.2);

        assert_eq!(metrics.queue_depth("reports", JobPriority::Bulk), 42);
        assert_eq!(metrics.dead_letter_depth("reports"), 3);
        assert_eq!(
            metrics.duration_count("reports", JobPriority::Bulk, JobStatus::Failed),
            1
        );
        assert_eq!(
            metrics.duration_count("reports", JobPriority::Bulk, JobStatus::Success),
            0
        );
    }

    #[test]
    fn test_gather_metrics() {
        let metrics = JobMetrics::new().unwrap();
        metrics.inc_enqueued("reports", JobPriority::Default);
        metrics.inc_overflow("reports", JobPriority::Default);

        let output = metrics.gather().expect("gather should succeed");
        assert!(output.contains("jobtier_jobs_enqueued_total"));
        assert!(output.contains("jobtier_queue_overflow_total"));
        assert!(output.contains("priority=\"default\""));
    }
}
