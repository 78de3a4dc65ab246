//! Drives executions from the priority queue through the handler.
//!
//! One call to [`JobProcessor::process_next`] takes a single execution
//! through its whole lifecycle:
//!
//! ```text
//! polled -> running -> succeeded
//!                   -> retry scheduled (deferred or re-queued)
//!                   -> dead-lettered
//! ```
//!
//! Failures never escape to the caller. Handler errors and panics are
//! both treated as a failed attempt and routed by the priority's retry
//! policy.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tracing::Instrument;

use crate::config::{JobConfig, RetryScheduling};
use crate::dead_letter::DeadLetterQueue;
use crate::delay::DelayedRetries;
use crate::events::JobEventPayload;
use crate::execution::{ExecutionId, JobExecution};
use crate::handler::{JobContext, JobHandler, NoScope, ScopeExtractor};
use crate::metrics::JobMetrics;
use crate::priority::JobPriority;
use crate::queue::PriorityJobQueue;
use crate::retry::RetryDecision;
use crate::scope::with_scope;
use crate::telemetry;

/// What a single `process_next` call did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessOutcome {
    /// Nothing was pending.
    Idle,
    Succeeded,
    /// The attempt failed and a retry was queued or deferred.
    RetryScheduled,
    /// The attempt failed and the execution went to the dead-letter sink.
    DeadLettered,
}

pub struct JobProcessor<P> {
    queue: Arc<PriorityJobQueue<P>>,
    dead_letters: Arc<DeadLetterQueue<P>>,
    handler: Arc<dyn JobHandler<P>>,
    scope: Arc<dyn ScopeExtractor<P>>,
    config: JobConfig,
    delayed: DelayedRetries<P>,
}

impl<P> std::fmt::Debug for JobProcessor<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobProcessor")
            .field("queue", &self.queue)
            .field("dead_letters", &self.dead_letters)
            .field("retry_scheduling", &self.config.retry_scheduling)
            .field("pending_retries", &self.delayed.len())
            .finish_non_exhaustive()
    }
}

impl<P> JobProcessor<P>
where
    P: Send + Sync + 'static,
{
    pub fn builder(config: JobConfig) -> JobProcessorBuilder<P> {
        JobProcessorBuilder::new(config)
    }

    pub fn name(&self) -> &str {
        self.queue.name()
    }

    pub fn queue(&self) -> &Arc<PriorityJobQueue<P>> {
        &self.queue
    }

    pub fn dead_letters(&self) -> &Arc<DeadLetterQueue<P>> {
        &self.dead_letters
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    fn metrics(&self) -> &JobMetrics {
        self.queue.metrics()
    }

    /// Process at most one execution.
    ///
    /// Retries whose backoff has elapsed are moved back into the queue
    /// first, so they compete with fresh work in FIFO order.
    pub async fn process_next(&self) -> ProcessOutcome {
        self.release_due_retries();
        match self.queue.poll() {
            Some(execution) => self.run(execution).await,
            None => ProcessOutcome::Idle,
        }
    }

    /// Process until the queue reports no work. Returns how many
    /// executions were handled.
    ///
    /// Deferred retries that are not yet due do not keep this loop alive.
    pub async fn process_all_pending(&self) -> usize {
        let mut processed = 0;
        while self.process_next().await != ProcessOutcome::Idle {
            processed += 1;
        }
        processed
    }

    /// Move every deferred retry whose backoff has elapsed into the queue.
    pub fn release_due_retries(&self) -> usize {
        let due = self.delayed.take_due(Utc::now());
        self.release(due)
    }

    /// Move every deferred retry into the queue now, due or not.
    pub fn flush_retries(&self) -> usize {
        let all = self.delayed.take_all();
        let flushed = self.release(all);
        if flushed > 0 {
            tracing::info!(queue = %self.name(), flushed, "deferred retries flushed");
        }
        flushed
    }

    pub fn pending_retries(&self) -> usize {
        self.delayed.len()
    }

    /// When the earliest deferred retry becomes eligible.
    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        self.delayed.next_eligible_at()
    }

    fn release(&self, executions: Vec<JobExecution<P>>) -> usize {
        if executions.is_empty() {
            return 0;
        }
        let mut released = 0;
        for execution in executions {
            let id = execution.execution_id();
            let priority = execution.priority();
            let attempt = execution.attempt_number();
            match self.queue.enqueue_execution(execution) {
                Ok(()) => {
                    released += 1;
                    tracing::debug!(execution_id = %id, %priority, attempt, "retry released");
                    self.metrics().inc_retried(self.name(), priority, attempt);
                    self.queue
                        .publish(id, JobEventPayload::RetryReleased { priority, attempt });
                }
                Err(full) => {
                    tracing::warn!(
                        execution_id = %id,
                        %priority,
                        capacity = full.capacity,
                        "queue full on retry release, dead-lettering"
                    );
                    self.dead_letter(full.into_execution());
                }
            }
        }
        self.refresh_deferred_gauges();
        released
    }

    fn refresh_deferred_gauges(&self) {
        for priority in JobPriority::ALL {
            self.metrics().set_deferred_retries(
                self.name(),
                priority,
                self.delayed.len_for(priority),
            );
        }
    }

    async fn run(&self, execution: JobExecution<P>) -> ProcessOutcome {
        let id = execution.execution_id();
        let priority = execution.priority();
        let attempt = execution.attempt_number();
        let scope = self.scope.extract(execution.payload());
        let ctx = JobContext {
            execution_id: id,
            priority,
            attempt,
            scope: scope.clone(),
        };

        let span = telemetry::process_span(self.name(), id, priority, attempt);
        self.metrics().inc_started(self.name(), priority);
        let timer = telemetry::start_timer();

        let call =
            AssertUnwindSafe(self.handler.handle(execution.payload(), &ctx)).catch_unwind();
        let result = with_scope(scope, call).instrument(span.clone()).await;

        span.in_scope(|| match result {
            Ok(Ok(())) => {
                telemetry::record_succeeded(
                    self.metrics(),
                    self.name(),
                    priority,
                    attempt,
                    timer,
                );
                self.queue
                    .publish(id, JobEventPayload::Succeeded { priority, attempt });
                ProcessOutcome::Succeeded
            }
            Ok(Err(err)) => self.on_failure(execution, format!("{err:#}"), timer),
            Err(panic) => self.on_failure(execution, panic_message(&*panic), timer),
        })
    }

    fn on_failure(
        &self,
        execution: JobExecution<P>,
        error: String,
        timer: telemetry::JobTimer,
    ) -> ProcessOutcome {
        let id = execution.execution_id();
        let priority = execution.priority();
        let failed_attempt = execution.attempt_number();
        telemetry::record_failed(
            self.metrics(),
            self.name(),
            priority,
            failed_attempt,
            &error,
            timer,
        );
        self.queue.publish(
            id,
            JobEventPayload::Failed {
                priority,
                attempt: failed_attempt,
                error: error.clone(),
            },
        );

        let policy = self.config.retry_policy(priority);
        let next = failed_attempt.saturating_add(1);
        let retry = execution.with_retry(error);

        match policy.decide(next) {
            RetryDecision::Retry { attempt, delay } => match self.config.retry_scheduling {
                RetryScheduling::Immediate => match self.queue.enqueue_execution(retry) {
                    Ok(()) => {
                        self.retry_scheduled(id, priority, attempt, policy.max_attempts, delay);
                        self.metrics().inc_retried(self.name(), priority, attempt);
                        ProcessOutcome::RetryScheduled
                    }
                    Err(full) => {
                        tracing::warn!(
                            execution_id = %id,
                            %priority,
                            capacity = full.capacity,
                            "queue full on retry, dead-lettering"
                        );
                        self.dead_letter(full.into_execution());
                        ProcessOutcome::DeadLettered
                    }
                },
                RetryScheduling::Deferred => {
                    let eligible_at = Utc::now()
                        .checked_add_signed(delay)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC);
                    let held = self.delayed.defer(retry, eligible_at);
                    self.metrics()
                        .set_deferred_retries(self.name(), priority, held);
                    self.retry_scheduled(id, priority, attempt, policy.max_attempts, delay);
                    ProcessOutcome::RetryScheduled
                }
            },
            RetryDecision::Exhausted => {
                telemetry::record_exhausted(self.metrics(), self.name(), priority, next);
                self.dead_letter(retry);
                ProcessOutcome::DeadLettered
            }
        }
    }

    fn retry_scheduled(
        &self,
        id: ExecutionId,
        priority: JobPriority,
        attempt: u32,
        max_attempts: u32,
        delay: chrono::Duration,
    ) {
        telemetry::record_retry_scheduled(
            self.metrics(),
            self.name(),
            priority,
            attempt,
            max_attempts,
            delay,
        );
        self.queue.publish(
            id,
            JobEventPayload::RetryScheduled {
                priority,
                attempt,
                delay_ms: delay.num_milliseconds(),
            },
        );
    }

    fn dead_letter(&self, execution: JobExecution<P>) {
        self.queue.publish(
            execution.execution_id(),
            JobEventPayload::DeadLettered {
                priority: execution.priority(),
                attempt: execution.attempt_number(),
                error: execution
                    .last_error()
                    .unwrap_or(crate::dead_letter::UNKNOWN_ERROR)
                    .to_string(),
            },
        );
        self.dead_letters.add(execution);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("handler panicked: {detail}")
}

/// Builder for [`JobProcessor`].
///
/// The queue and handler are required. Without an explicit dead-letter
/// sink one is created sharing the queue's name and metrics; without a
/// scope extractor every job runs unscoped.
pub struct JobProcessorBuilder<P> {
    config: JobConfig,
    queue: Option<Arc<PriorityJobQueue<P>>>,
    dead_letters: Option<Arc<DeadLetterQueue<P>>>,
    handler: Option<Arc<dyn JobHandler<P>>>,
    scope: Option<Arc<dyn ScopeExtractor<P>>>,
}

impl<P> std::fmt::Debug for JobProcessorBuilder<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobProcessorBuilder")
            .field("config", &self.config)
            .field("queue_set", &self.queue.is_some())
            .field("dead_letters_set", &self.dead_letters.is_some())
            .field("handler_set", &self.handler.is_some())
            .field("scope_set", &self.scope.is_some())
            .finish()
    }
}

impl<P> JobProcessorBuilder<P>
where
    P: Send + Sync + 'static,
{
    pub fn new(config: JobConfig) -> Self {
        Self {
            config,
            queue: None,
            dead_letters: None,
            handler: None,
            scope: None,
        }
    }

    pub fn with_queue(mut self, queue: Arc<PriorityJobQueue<P>>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_dead_letters(mut self, dead_letters: Arc<DeadLetterQueue<P>>) -> Self {
        self.dead_letters = Some(dead_letters);
        self
    }

    pub fn with_handler(mut self, handler: impl JobHandler<P> + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn with_scope_extractor(mut self, extractor: impl ScopeExtractor<P> + 'static) -> Self {
        self.scope = Some(Arc::new(extractor));
        self
    }

    /// # Errors
    ///
    /// Returns an error if the queue or handler is missing, or the
    /// configuration does not validate.
    pub fn build(self) -> anyhow::Result<JobProcessor<P>> {
        self.config.validate()?;
        let queue = self
            .queue
            .ok_or_else(|| anyhow::anyhow!("queue dependency missing"))?;
        let handler = self
            .handler
            .ok_or_else(|| anyhow::anyhow!("handler dependency missing"))?;
        let dead_letters = self.dead_letters.unwrap_or_else(|| {
            Arc::new(DeadLetterQueue::new(queue.name(), queue.metrics().clone()))
        });
        let scope = self.scope.unwrap_or_else(|| Arc::new(NoScope));

        Ok(JobProcessor {
            queue,
            dead_letters,
            handler,
            scope,
            config: self.config,
            delayed: DelayedRetries::new(),
        })
    }
}
