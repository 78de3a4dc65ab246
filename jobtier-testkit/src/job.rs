use jobtier::ScopeId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload used across the test suites.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestJob {
    pub name: String,
    pub tenant: Option<String>,
}

impl TestJob {
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tenant: None,
        }
    }

    pub fn for_tenant(name: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tenant: Some(tenant.into()),
        }
    }

    pub fn scope(&self) -> Option<ScopeId> {
        self.tenant.as_deref().map(ScopeId::from)
    }
}

/// Scope extractor reading [`TestJob::tenant`].
pub fn tenant_scope(job: &TestJob) -> Option<ScopeId> {
    job.scope()
}

/// A fresh, unique tenant id.
pub fn random_tenant() -> String {
    Uuid::now_v7().to_string()
}
