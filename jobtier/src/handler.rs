use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::execution::ExecutionId;
use crate::priority::JobPriority;
use crate::scope::ScopeId;

/// What a handler knows about the execution it is running.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobContext {
    pub execution_id: ExecutionId,
    pub priority: JobPriority,
    /// Zero for the first try, incremented on every retry.
    pub attempt: u32,
    /// Scope extracted from the payload; also available through
    /// [`current_scope`](crate::scope::current_scope) for the duration of
    /// the call.
    pub scope: Option<ScopeId>,
}

/// Business logic for one payload type.
///
/// Returning `Err` (or panicking) counts as a failure and is subject to
/// the priority's retry policy.
#[async_trait]
pub trait JobHandler<P>: Send + Sync {
    async fn handle(&self, payload: &P, ctx: &JobContext) -> anyhow::Result<()>;
}

#[async_trait]
impl<P, H> JobHandler<P> for Arc<H>
where
    P: Sync,
    H: JobHandler<P> + ?Sized,
{
    async fn handle(&self, payload: &P, ctx: &JobContext) -> anyhow::Result<()> {
        (**self).handle(payload, ctx).await
    }
}

/// Handler built from a closure; see [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> std::fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerFn")
            .field("type", &std::any::type_name::<F>())
            .finish()
    }
}

/// Adapt a closure into a [`JobHandler`].
///
/// The returned future must be `'static`: clone what it needs from the
/// arguments instead of borrowing them.
///
/// ```ignore
/// let handler = handler_fn(|name: &String, _ctx: &JobContext| {
///     let name = name.clone();
///     async move {
///         tracing::info!(%name, "hello");
///         Ok(())
///     }
/// });
/// ```
pub fn handler_fn<P, F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(&P, &JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<P, F, Fut> JobHandler<P> for HandlerFn<F>
where
    P: Sync,
    F: Fn(&P, &JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, payload: &P, ctx: &JobContext) -> anyhow::Result<()> {
        (self.f)(payload, ctx).await
    }
}

/// Derives the execution scope of a payload.
pub trait ScopeExtractor<P>: Send + Sync {
    fn extract(&self, payload: &P) -> Option<ScopeId>;
}

impl<P, F> ScopeExtractor<P> for F
where
    F: Fn(&P) -> Option<ScopeId> + Send + Sync,
{
    fn extract(&self, payload: &P) -> Option<ScopeId> {
        self(payload)
    }
}

/// Extractor for payloads that carry no scope.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoScope;

impl<P> ScopeExtractor<P> for NoScope {
    fn extract(&self, _payload: &P) -> Option<ScopeId> {
        None
    }
}
