//! Request tenant context.
//!
//! A [`TenantContext`] is carried explicitly into every repository, form and
//! admin call. The resolution stage also installs it as task-local state with
//! [`TenantContext::scope`], so code that cannot take a parameter can read it
//! back with [`TenantContext::current`]. The value lives exactly as long as the
//! scoped future: it is gone when the request finishes, whether it succeeded,
//! failed or unwound.

use std::future::Future;
use std::sync::Arc;

use crate::membership::UserId;
use crate::tenant::{Tenant, TenantId};

tokio::task_local! {
    static CURRENT: TenantContext;
}

/// Context carried with every tenancy operation.
///
/// "No tenant" ([`TenantContext::none`]) is a valid state: the root site and
/// maintenance tasks run without one.
#[derive(Debug, Clone, Default)]
pub struct TenantContext {
    tenant: Option<Arc<Tenant>>,
    user: Option<UserId>,
}

impl TenantContext {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn for_tenant(tenant: Arc<Tenant>) -> Self {
        Self {
            tenant: Some(tenant),
            user: None,
        }
    }

    pub fn with_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    pub fn tenant(&self) -> Option<&Tenant> {
        self.tenant.as_deref()
    }

    pub fn tenant_id(&self) -> Option<&TenantId> {
        self.tenant.as_ref().map(|t| &t.id)
    }

    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.tenant.is_none()
    }

    /// Run `fut` with `self` installed as the current context.
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(self, fut).await
    }

    /// The context installed by the enclosing [`TenantContext::scope`], or
    /// "no tenant" when called outside of one.
    pub fn current() -> TenantContext {
        CURRENT.try_with(|ctx| ctx.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;

    fn tenant(id: &str) -> Arc<Tenant> {
        let now = Utc::now();
        Arc::new(Tenant {
            id: TenantId::new(id),
            name: id.to_string(),
            domain: Some(format!("{id}.example.org")),
            path_key: None,
            aliases: vec![],
            preferred_domain: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            liveness: Default::default(),
        })
    }

    #[tokio::test]
    async fn current_outside_scope_is_no_tenant() {
        assert!(TenantContext::current().is_root());
    }

    #[tokio::test]
    async fn sequential_scopes_do_not_leak() {
        let seen_a = TenantContext::for_tenant(tenant("a"))
            .scope(async { TenantContext::current().tenant_id().cloned() })
            .await;
        assert_eq!(seen_a, Some(TenantId::new("a")));

        // The first request's tenant is gone once its scope ends.
        assert!(TenantContext::current().is_root());

        let seen_b = TenantContext::none()
            .scope(async { TenantContext::current().tenant_id().cloned() })
            .await;
        assert_eq!(seen_b, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_scopes_see_their_own_tenant() {
        let mut handles = Vec::new();
        for i in 0..16 {
            let id = format!("t{i}");
            let ctx = TenantContext::for_tenant(tenant(&id));
            handles.push(tokio::spawn(ctx.scope(async move {
                for _ in 0..10 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    let seen = TenantContext::current().tenant_id().cloned();
                    assert_eq!(seen, Some(TenantId::new(id.clone())));
                }
            })));
        }
        for h in handles {
            h.await.unwrap();
        }
    }

    #[tokio::test]
    async fn scope_is_cleared_when_request_fails() {
        let res: Result<(), &str> = TenantContext::for_tenant(tenant("a"))
            .scope(async { Err("boom") })
            .await;
        assert!(res.is_err());
        assert!(TenantContext::current().is_root());
    }
}
