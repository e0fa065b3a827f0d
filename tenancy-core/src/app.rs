use std::sync::Arc;

use anyhow::Result;
use arc_swap::ArcSwap;

use crate::config::{
    RoutingConfig, TenancyConfig, TenancyConfigSnapshot, ADMIN_ACCESS, ROOT_ACCESS, TENANTS_DELETION,
};
use crate::context::TenantContext;
use crate::errors::TenancyError;
use crate::membership::{MembershipRegistry, RootAccess, TenantAccess, UserId};
use crate::registry::{DeletionPolicy, TenantDependents, TenantRegistry};
use crate::resolver::{resolve, RequestMeta, Resolution};
use crate::tenant::{Tenant, TenantId};

struct TenancyAppInner {
    registry: TenantRegistry,
    memberships: MembershipRegistry,
    routing: RoutingConfig,
    root_access: RootAccess,
    admin_access: TenantAccess,
    config: ArcSwap<TenancyConfig>,
}

/// Central container for a multi-tenant deployment.
///
/// Framework-agnostic. Holds:
/// - the tenant registry
/// - user memberships and superadmins
/// - routing and root-site policy, read once from config
/// - the config store itself
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct TenancyApp {
    inner: Arc<TenancyAppInner>,
}

impl TenancyApp {
    /// Build from config. `routing.*`, `root.access`, `admin.access` and
    /// `tenants.deletion` are read here; later `set` calls do not change them.
    pub fn new(config: TenancyConfig) -> Result<Self> {
        let snapshot = config.snapshot();
        let routing = RoutingConfig::from_snapshot(&snapshot)?;
        let root_access = match snapshot.get(ROOT_ACCESS) {
            Some(raw) => raw.parse()?,
            None => RootAccess::default(),
        };
        let admin_access = match snapshot.get(ADMIN_ACCESS) {
            Some(raw) => raw.parse()?,
            None => TenantAccess::default(),
        };
        let policy = match snapshot.get(TENANTS_DELETION) {
            Some(raw) => raw.parse()?,
            None => DeletionPolicy::default(),
        };

        tracing::debug!(?routing, ?root_access, ?admin_access, ?policy, "tenancy app configured");

        Ok(Self {
            inner: Arc::new(TenancyAppInner {
                registry: TenantRegistry::new(&routing).with_policy(policy),
                memberships: MembershipRegistry::new(),
                routing,
                root_access,
                admin_access,
                config: ArcSwap::from_pointee(config),
            }),
        })
    }

    pub fn registry(&self) -> &TenantRegistry {
        &self.inner.registry
    }

    pub fn memberships(&self) -> &MembershipRegistry {
        &self.inner.memberships
    }

    pub fn routing(&self) -> &RoutingConfig {
        &self.inner.routing
    }

    pub fn root_access(&self) -> RootAccess {
        self.inner.root_access
    }

    pub fn set<K, V>(&self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (key, value) = (key.into(), value.into());
        self.inner.config.rcu(|current| {
            let mut next = TenancyConfig::clone(current);
            next.set(key.clone(), value.clone());
            next
        });
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.config.load().get(key).map(|v| v.to_string())
    }

    pub fn config_snapshot(&self) -> TenancyConfigSnapshot {
        self.inner.config.load().snapshot()
    }

    /// Resolve a request against the current registry snapshot.
    pub fn resolve(&self, request: &RequestMeta) -> Result<Resolution> {
        let snapshot = self.inner.registry.snapshot();
        let resolution = resolve(&snapshot, &self.inner.routing, request)?;
        tracing::debug!(
            host = request.host.as_deref().unwrap_or(""),
            path = %request.path,
            tenant = resolution.tenant.as_ref().map(|t| t.id.as_str()).unwrap_or("root"),
            matched = ?resolution.matched,
            "tenant resolved"
        );
        Ok(resolution)
    }

    pub fn register_dependent(&self, dependent: Arc<dyn TenantDependents>) {
        self.inner.registry.register_dependent(dependent);
    }

    pub fn admin_access(&self) -> TenantAccess {
        self.inner.admin_access
    }

    /// Delete a tenant and every membership in it.
    ///
    /// Memberships are dropped whenever the tenant itself is gone, including
    /// after a `PartialPurge`.
    pub async fn delete_tenant(&self, id: &TenantId) -> Result<Arc<Tenant>> {
        let outcome = self.inner.registry.delete(id).await;
        if outcome.is_ok() || outcome.as_ref().is_err_and(|e| TenancyError::is(e, "PartialPurge")) {
            let dropped = self.inner.memberships.remove_tenant(id).await;
            tracing::info!(tenant = %id, memberships = dropped, "tenant memberships removed");
        }
        outcome
    }

    /// May the context's user use a tenant site's admin routes?
    ///
    /// Superadmins always may. Everyone else needs an active membership in
    /// the resolved tenant, flagged as staff when `admin.access` is `staff`.
    /// On the root site only superadmins pass.
    pub async fn authorize_tenant_admin(&self, ctx: &TenantContext) -> Result<()> {
        let user = ctx
            .user()
            .ok_or_else(|| TenancyError::NotAuthenticated.into_anyhow())?;
        let memberships = &self.inner.memberships;
        if memberships.is_superadmin(user).await {
            return Ok(());
        }

        let Some(tenant) = ctx.tenant_id() else {
            return Err(TenancyError::forbidden("the root site's records require a superadmin").into_anyhow());
        };
        let admitted = match self.inner.admin_access {
            TenantAccess::Members => memberships.is_member(user, ctx).await,
            TenantAccess::Staff => memberships.is_staff(user, ctx).await,
        };
        if admitted {
            Ok(())
        } else {
            tracing::warn!(user = %user, tenant = %tenant, access = ?self.inner.admin_access, "tenant admin access denied");
            let role = match self.inner.admin_access {
                TenantAccess::Members => "a member",
                TenantAccess::Staff => "staff",
            };
            Err(TenancyError::forbidden(format!("not {role} of tenant {tenant}")).into_anyhow())
        }
    }

    /// May `user` use the root site under the configured policy?
    pub async fn can_enter_root(&self, user: &UserId) -> bool {
        self.inner
            .memberships
            .can_enter_root(user, self.inner.root_access)
            .await
    }
}
