//! Benchmarks for queue operations using criterion.
//!
//! These benchmarks measure the performance of basic queue operations:
//! - Single job enqueue + poll
//! - Batch enqueue across mixed priorities
//! - Poll with contention from concurrent workers
//! - Full lifecycle (enqueue -> process -> complete)

#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use jobtier::{
    JobConfig, JobContext, JobMetrics, JobPriority, JobProcessor, PriorityJobQueue, handler_fn,
};
use jobtier_testkit::TestJob;
use tokio::runtime::Runtime;

/// Creates a tokio runtime for async benchmarks.
fn create_runtime() -> Runtime {
    Runtime::new().expect("Failed to create tokio runtime")
}

fn create_queue(config: &JobConfig) -> Arc<PriorityJobQueue<TestJob>> {
    let metrics = Arc::new(JobMetrics::new().expect("metrics"));
    Arc::new(PriorityJobQueue::new("bench", config, metrics))
}

/// Benchmark: Enqueue then poll a single job.
fn bench_enqueue_poll_single(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue_poll_single");
    group.sample_size(100);

    group.bench_function("default_priority", |b| {
        let queue = create_queue(&JobConfig::default());
        let job = TestJob::simple("bench-job");

        b.iter(|| {
            queue
                .enqueue(job.clone(), JobPriority::Default)
                .expect("enqueue should succeed");
            queue.poll().expect("poll should return the job");
        });
    });

    group.finish();
}

/// Benchmark: Enqueue a batch spread across every priority, then drain.
fn bench_enqueue_batch(c: &mut Criterion) {
    let batch_sizes = [10usize, 100, 1000];

    let mut group = c.benchmark_group("enqueue_batch");
    group.sample_size(50);

    for batch_size in batch_sizes {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("mixed_priorities", batch_size),
            &batch_size,
            |b, &size| {
                let queue = create_queue(&JobConfig::default());
                let jobs: Vec<_> = (0..size)
                    .map(|i| {
                        (
                            TestJob::simple(format!("job-{i}")),
                            JobPriority::ALL[i % JobPriority::ALL.len()],
                        )
                    })
                    .collect();

                b.iter(|| {
                    for (job, priority) in &jobs {
                        queue.enqueue(job.clone(), *priority).expect("enqueue should succeed");
                    }
                    while queue.poll().is_some() {}
                });
            },
        );
    }

    group.finish();
}

/// Benchmark: Poll with contention.
///
/// Multiple workers poll the same queue concurrently; each iteration
/// refills the queue first.
fn bench_poll_contention(c: &mut Criterion) {
    let rt = create_runtime();
    let worker_counts = [1usize, 5, 10, 20];

    let mut group = c.benchmark_group("poll_contention");
    group.sample_size(50);

    for worker_count in worker_counts {
        group.bench_with_input(
            BenchmarkId::new("workers", worker_count),
            &worker_count,
            |b, &workers| {
                let queue = create_queue(&JobConfig::default());

                b.to_async(&rt).iter(|| {
                    let queue = queue.clone();
                    async move {
                        for i in 0..workers * 10 {
                            let job = TestJob::simple(format!("job-{i}"));
                            let _ = queue.enqueue(job, JobPriority::High);
                        }

                        let mut handles = Vec::with_capacity(workers);
                        for _ in 0..workers {
                            let queue = queue.clone();
                            handles.push(tokio::spawn(async move {
                                while queue.poll().is_some() {}
                            }));
                        }
                        for handle in handles {
                            let _ = handle.await;
                        }
                    }
                });
            },
        );
    }

    group.finish();
}

/// Benchmark: Full lifecycle through the processor.
fn bench_full_lifecycle(c: &mut Criterion) {
    let rt = create_runtime();

    let mut group = c.benchmark_group("full_lifecycle");
    group.sample_size(100);

    group.bench_function("enqueue_process", |b| {
        let config = JobConfig::default();
        let processor = JobProcessor::builder(config.clone())
            .with_queue(create_queue(&config))
            .with_handler(handler_fn(|_: &TestJob, _: &JobContext| async { Ok(()) }))
            .build()
            .expect("build processor");
        let job = TestJob::simple("bench-job");

        b.to_async(&rt).iter(|| async {
            processor
                .queue()
                .enqueue(job.clone(), JobPriority::Default)
                .expect("enqueue should succeed");
            processor.process_next().await;
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_enqueue_poll_single,
    bench_enqueue_batch,
    bench_poll_contention,
    bench_full_lifecycle
);
criterion_main!(benches);
