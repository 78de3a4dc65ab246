//! Execution scope (tenant) propagation.
//!
//! The scope a job runs under is established by the processor for exactly
//! the extent of one handler call. It lives in a task-local slot, so it is
//! visible only to code running inside that call and reverts to whatever
//! the worker had before once the call returns, fails, or panics. Handlers
//! also receive it explicitly through [`JobContext`](crate::handler::JobContext).

use std::fmt::Display;
use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of the scope (usually a tenant) a job executes under.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ScopeId(String);

impl ScopeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScopeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ScopeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<Uuid> for ScopeId {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}

tokio::task_local! {
    static CURRENT_SCOPE: Option<ScopeId>;
}

/// The scope of the job currently executing on this task, if any.
pub fn current_scope() -> Option<ScopeId> {
    CURRENT_SCOPE.try_with(Clone::clone).ok().flatten()
}

/// Run `future` with `scope` as the current scope.
///
/// `None` runs it with an explicitly empty scope, hiding any enclosing one.
/// The previous value is restored when the future completes or is dropped.
pub async fn with_scope<F>(scope: Option<ScopeId>, future: F) -> F::Output
where
    F: Future,
{
    CURRENT_SCOPE.scope(scope, future).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_scope_outside_call() {
        assert_eq!(current_scope(), None);
    }

    #[tokio::test]
    async fn test_scope_visible_inside_and_restored_after() {
        let seen = with_scope(Some("tenant-a".into()), async { current_scope() }).await;
        assert_eq!(seen, Some(ScopeId::from("tenant-a")));
        assert_eq!(current_scope(), None);
    }

    #[tokio::test]
    async fn test_nested_scope_restores_outer() {
        with_scope(Some("outer".into()), async {
            let inner = with_scope(Some("inner".into()), async { current_scope() }).await;
            assert_eq!(inner, Some(ScopeId::from("inner")));

            let hidden = with_scope(None, async { current_scope() }).await;
            assert_eq!(hidden, None);

            assert_eq!(current_scope(), Some(ScopeId::from("outer")));
        })
        .await;
    }

    #[test]
    fn test_scope_from_uuid() {
        let id = Uuid::nil();
        assert_eq!(ScopeId::from(id).as_str(), id.to_string());
    }
}
