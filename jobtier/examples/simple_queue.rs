//! Simple queue example: enqueue mixed-priority work and drain it.
//!
//! Run with `RUST_LOG=jobtier=debug` to see the structured lifecycle logs.

use std::sync::Arc;

use async_trait::async_trait;
use jobtier::*;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Report {
    tenant: String,
    name: String,
    fail: bool,
}

/// Renders a report, failing on request to show retries.
struct ReportHandler;

#[async_trait]
impl JobHandler<Report> for ReportHandler {
    async fn handle(&self, report: &Report, ctx: &JobContext) -> anyhow::Result<()> {
        println!(
            "[HANDLE] {} for {:?} (priority {}, attempt {})",
            report.name,
            current_scope(),
            ctx.priority,
            ctx.attempt
        );
        anyhow::ensure!(!report.fail, "renderer unavailable");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = JobConfig::builder()
        .retry_policy(
            JobPriority::Default,
            RetryPolicy::builder()
                .max_attempts(2)
                .initial_delay(std::time::Duration::from_millis(100))
                .build()?,
        )
        .build()?;
    let metrics = Arc::new(JobMetrics::new()?);
    let queue = Arc::new(PriorityJobQueue::new("reports", &config, metrics.clone()));

    let processor = JobProcessor::builder(config)
        .with_queue(queue.clone())
        .with_handler(ReportHandler)
        .with_scope_extractor(|report: &Report| Some(ScopeId::from(report.tenant.as_str())))
        .build()?;

    let jobs = [
        ("acme", "monthly", JobPriority::Low, false),
        ("globex", "incident", JobPriority::Critical, false),
        ("acme", "flaky", JobPriority::Default, true),
    ];
    for (tenant, name, priority, fail) in jobs {
        let report = Report {
            tenant: tenant.into(),
            name: name.into(),
            fail,
        };
        queue.enqueue(report, priority)?;
    }

    while processor.process_all_pending().await > 0 || processor.pending_retries() > 0 {
        if let Some(at) = processor.next_retry_at() {
            let wait = (at - chrono::Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
        }
    }

    for entry in processor.dead_letters().peek_all() {
        println!(
            "[DEAD] {} after {} attempts: {}",
            entry.payload().name,
            entry.attempt_number(),
            entry.last_error().unwrap_or_default()
        );
    }
    println!("{}", metrics.gather()?);
    Ok(())
}
