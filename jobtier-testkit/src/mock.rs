use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jobtier::{JobContext, JobHandler, JobPriority, ScopeId, current_scope};
use parking_lot::Mutex;

use crate::TestJob;

/// How a [`RecordingHandler`] responds to each call.
#[derive(Clone, Debug)]
pub enum HandlerBehavior {
    Succeed,
    /// Fail every call with `message`.
    Fail { message: String },
    /// Fail the next `remaining` calls, then succeed.
    FailTimes { remaining: u32, message: String },
    /// Panic with `message` on every call.
    Panic { message: String },
}

#[derive(Clone, Debug)]
pub struct HandleRecord {
    pub name: String,
    pub priority: JobPriority,
    pub attempt: u32,
    /// Scope passed in the [`JobContext`].
    pub context_scope: Option<ScopeId>,
    /// Scope observed through [`current_scope`] inside the call.
    pub ambient_scope: Option<ScopeId>,
}

/// Scripted handler that records every call it receives.
#[derive(Clone)]
pub struct RecordingHandler {
    records: Arc<Mutex<Vec<HandleRecord>>>,
    behavior: Arc<Mutex<HandlerBehavior>>,
    delay: Option<Duration>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::with_behavior(HandlerBehavior::Succeed)
    }

    pub fn with_behavior(behavior: HandlerBehavior) -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            behavior: Arc::new(Mutex::new(behavior)),
            delay: None,
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_behavior(HandlerBehavior::Fail {
            message: message.into(),
        })
    }

    pub fn failing_times(remaining: u32, message: impl Into<String>) -> Self {
        Self::with_behavior(HandlerBehavior::FailTimes {
            remaining,
            message: message.into(),
        })
    }

    pub fn panicking(message: impl Into<String>) -> Self {
        Self::with_behavior(HandlerBehavior::Panic {
            message: message.into(),
        })
    }

    /// Sleep for `delay` inside every call before responding.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_behavior(&self, behavior: HandlerBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn records(&self) -> Vec<HandleRecord> {
        self.records.lock().clone()
    }

    /// Names of handled jobs in call order.
    pub fn names(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.name.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.records.lock().len()
    }

    pub fn assert_handled_count_eq(&self, expected: usize) {
        let actual = self.records.lock().len();
        assert_eq!(
            actual, expected,
            "Expected {expected} handler calls, got {actual}"
        );
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    fn next_response(&self) -> Response {
        let mut behavior = self.behavior.lock();
        match &mut *behavior {
            HandlerBehavior::Succeed => Response::Ok,
            HandlerBehavior::Fail { message } => Response::Err(message.clone()),
            HandlerBehavior::FailTimes { remaining, message } => {
                if *remaining == 0 {
                    Response::Ok
                } else {
                    *remaining -= 1;
                    Response::Err(message.clone())
                }
            }
            HandlerBehavior::Panic { message } => Response::Panic(message.clone()),
        }
    }
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

enum Response {
    Ok,
    Err(String),
    Panic(String),
}

#[async_trait]
impl JobHandler<TestJob> for RecordingHandler {
    async fn handle(&self, job: &TestJob, ctx: &JobContext) -> anyhow::Result<()> {
        self.records.lock().push(HandleRecord {
            name: job.name.clone(),
            priority: ctx.priority,
            attempt: ctx.attempt,
            context_scope: ctx.scope.clone(),
            ambient_scope: current_scope(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_response() {
            Response::Ok => Ok(()),
            Response::Err(message) => Err(anyhow::anyhow!(message)),
            Response::Panic(message) => panic!("{message}"),
        }
    }
}
