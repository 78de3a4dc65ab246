//! jobtier - Priority-tiered background job processing.
//!
//! An in-process core for running background work with a fixed set of
//! priority tiers, per-tier retry policies with exponential backoff, and a
//! dead-letter sink for work that cannot complete.
//!
//! # Core Concepts
//!
//! - **Priority**: every job belongs to one [`JobPriority`] tier. Higher
//!   tiers are always served first; within a tier, order is FIFO.
//!
//! - **Execution**: a payload travels wrapped in a [`JobExecution`] that
//!   carries its id, attempt count and last error across retries.
//!
//! - **Queue**: [`PriorityJobQueue`] holds pending executions in bounded
//!   per-tier lanes. A full lane rejects with [`QueueFull`] and hands the
//!   execution back.
//!
//! - **Processor**: [`JobProcessor`] polls one execution at a time, runs
//!   the [`JobHandler`] under the job's [`ScopeId`], and routes failures
//!   through the tier's [`RetryPolicy`] to either a retry or the
//!   [`DeadLetterQueue`].
//!
//! - **Observability**: Prometheus families in [`JobMetrics`], tracing
//!   spans from [`telemetry`], and lifecycle events on [`InProcEventBus`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use jobtier::*;
//!
//! let config = JobConfig::defaults();
//! let metrics = Arc::new(JobMetrics::new()?);
//! let queue = Arc::new(PriorityJobQueue::new("reports", &config, metrics));
//!
//! let processor = JobProcessor::builder(config)
//!     .with_queue(queue.clone())
//!     .with_handler(handler_fn(|report: &String, _ctx: &JobContext| {
//!         let report = report.clone();
//!         async move { render(report).await }
//!     }))
//!     .build()?;
//!
//! queue.enqueue("monthly".to_string(), JobPriority::High)?;
//! processor.process_all_pending().await;
//! ```

/// Per-priority retry and capacity settings.
///
/// [`JobConfig`] maps each [`JobPriority`] to a [`PriorityConfig`] and
/// selects whether retries honor their backoff ([`RetryScheduling`]).
pub mod config;

/// Dead-letter sink for executions that cannot complete.
pub mod dead_letter;

mod delay;

/// Typed errors: [`ConfigError`], [`QueueFull`] and [`ParsePriorityError`].
pub mod error;

/// Lifecycle event publishing.
///
/// - [`JobEvent`] and [`JobEventPayload`] for event data
/// - [`EventPublisher`] and [`EventSubscriber`] for pub/sub patterns
/// - [`InProcEventBus`] for in-process broadcasting
pub mod events;

/// The execution envelope and its identifier.
pub mod execution;

/// The [`JobHandler`] seam, [`JobContext`], and scope extraction.
pub mod handler;

/// Prometheus metrics for queues, processing and the dead-letter sink.
pub mod metrics;

/// Priority tiers and their target latencies.
pub mod priority;

/// The [`JobProcessor`] and its builder.
pub mod processor;

/// Bounded per-priority FIFO queue.
///
/// The `queue` module provides [`PriorityJobQueue`] and the
/// [`QueueSnapshot`] view used for monitoring.
pub mod queue;

/// Retry policies and backoff computation.
pub mod retry;

/// Task-scoped execution scope (tenant) propagation.
pub mod scope;

/// Tracing spans for enqueue, processing and dead-lettering.
pub mod telemetry;

pub use config::*;
pub use dead_letter::*;
pub use error::*;
pub use events::*;
pub use execution::*;
pub use handler::*;
pub use metrics::*;
pub use priority::*;
pub use processor::*;
pub use queue::*;
pub use retry::*;
pub use scope::*;
