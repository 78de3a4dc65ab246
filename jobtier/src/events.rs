use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::execution::ExecutionId;
use crate::priority::JobPriority;

/// Metadata envelope attached to every job event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventMeta {
    pub version: u16,
    pub queue: String,
    pub execution_id: ExecutionId,
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    pub fn new(queue: impl Into<String>, execution_id: ExecutionId) -> Self {
        Self {
            version: 1,
            queue: queue.into(),
            execution_id,
            timestamp: Utc::now(),
        }
    }
}

/// Lifecycle event with metadata and payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobEvent {
    pub meta: EventMeta,
    pub payload: JobEventPayload,
}

impl JobEvent {
    pub fn new(
        queue: impl Into<String>,
        execution_id: ExecutionId,
        payload: JobEventPayload,
    ) -> Self {
        Self {
            meta: EventMeta::new(queue, execution_id),
            payload,
        }
    }
}

/// Event payload emitted for job lifecycle transitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum JobEventPayload {
    /// Execution entered its priority queue.
    Enqueued { priority: JobPriority, attempt: u32 },
    /// Execution was rejected because its priority queue is full.
    Overflowed { priority: JobPriority, capacity: usize },
    /// Execution was taken off its queue for processing.
    Polled { priority: JobPriority, attempt: u32 },
    /// Handler returned successfully.
    Succeeded { priority: JobPriority, attempt: u32 },
    /// Handler returned an error or panicked.
    Failed {
        priority: JobPriority,
        attempt: u32,
        error: String,
    },
    /// A retry was scheduled after `delay_ms`.
    RetryScheduled {
        priority: JobPriority,
        attempt: u32,
        delay_ms: i64,
    },
    /// A deferred retry left the delay area and re-entered its queue.
    RetryReleased { priority: JobPriority, attempt: u32 },
    /// Execution was moved to the dead-letter sink.
    DeadLettered {
        priority: JobPriority,
        attempt: u32,
        error: String,
    },
}

/// Generic event publisher trait for publishing events of type `E`.
#[async_trait]
pub trait EventPublisher<E>: Send + Sync
where
    E: Clone + Send + Sync + 'static,
{
    /// Publish an event to all subscribers.
    async fn publish(&self, event: E) -> anyhow::Result<()>;
}

/// Generic event subscriber trait for receiving events of type `E`.
pub trait EventSubscriber<E>: Send + Sync
where
    E: Clone + Send + Sync + 'static,
{
    /// Subscribe to events, returning a broadcast receiver.
    ///
    /// Multiple subscribers can receive the same events (fan-out).
    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// In-process event bus using tokio broadcast channels.
///
/// Publishing never waits for slow subscribers: a subscriber that falls
/// more than `capacity` events behind receives `RecvError::Lagged`. With
/// no subscribers, events are dropped.
pub struct InProcEventBus {
    sender: broadcast::Sender<JobEvent>,
    capacity: usize,
}

impl std::fmt::Debug for InProcEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcEventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl InProcEventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish an event without waiting.
    pub fn publish_job(&self, event: JobEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to job lifecycle events published from now on.
    pub fn subscribe_job_events(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventPublisher<JobEvent> for InProcEventBus {
    async fn publish(&self, event: JobEvent) -> anyhow::Result<()> {
        self.publish_job(event);
        Ok(())
    }
}

impl EventSubscriber<JobEvent> for InProcEventBus {
    fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.subscribe_job_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn enqueued(priority: JobPriority) -> JobEvent {
        JobEvent::new(
            "test",
            ExecutionId::new(),
            JobEventPayload::Enqueued {
                priority,
                attempt: 0,
            },
        )
    }

    #[tokio::test]
    async fn test_event_bus_broadcast_to_multiple_subscribers() {
        let bus = InProcEventBus::new(100);

        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        let mut rx3 = bus.subscribe();

        for _ in 0..5 {
            bus.publish(enqueued(JobPriority::Critical)).await.unwrap();
        }

        for _ in 0..5 {
            assert!(timeout(Duration::from_millis(100), rx1.recv()).await.is_ok());
            assert!(timeout(Duration::from_millis(100), rx2.recv()).await.is_ok());
            assert!(timeout(Duration::from_millis(100), rx3.recv()).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_lagged_subscriber_doesnt_block_publisher() {
        let bus = InProcEventBus::new(2);
        let mut rx = bus.subscribe();

        for _ in 0..5 {
            bus.publish_job(enqueued(JobPriority::Low));
        }

        let result = timeout(Duration::from_millis(100), rx.recv()).await;
        match result.unwrap() {
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                assert_eq!(skipped, 3);
            }
            other => panic!("expected lag, got {other:?}"),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = InProcEventBus::new(4);
        bus.publish_job(enqueued(JobPriority::Bulk));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_bus_debug_format() {
        let bus = InProcEventBus::new(100);
        let _rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();

        let debug_str = format!("{bus:?}");
        assert!(debug_str.contains("InProcEventBus"));
        assert!(debug_str.contains("subscribers: 2"));
        assert!(debug_str.contains("capacity: 100"));
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = JobEvent::new(
            "reports",
            ExecutionId::new(),
            JobEventPayload::DeadLettered {
                priority: JobPriority::High,
                attempt: 4,
                error: "boom".into(),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["meta"]["queue"], "reports");
        assert_eq!(json["meta"]["version"], 1);
        assert_eq!(json["payload"]["type"], "dead_lettered");
        assert_eq!(json["payload"]["priority"], "high");
        assert_eq!(json["payload"]["error"], "boom");
    }
}
