//! User ↔ tenant association.
//!
//! Authentication lives elsewhere; this module only knows an already
//! established [`UserId`]. Every permission question is asked relative to the
//! tenant in the current [`TenantContext`], never globally: staff in tenant A
//! grants nothing in tenant B.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::{ADMIN_ACCESS, ROOT_ACCESS};
use crate::context::TenantContext;
use crate::errors::TenancyError;
use crate::tenant::TenantId;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user: UserId,
    pub tenant: TenantId,
    pub is_active: bool,
    pub is_staff: bool,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl Membership {
    fn new(user: UserId, tenant: TenantId) -> Self {
        Self {
            user,
            tenant,
            is_active: true,
            is_staff: false,
            permissions: BTreeSet::new(),
        }
    }
}

/// Who may use the root site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootAccess {
    /// Superadmins only.
    #[default]
    Superadmin,
    /// Anyone with at least one active membership.
    Members,
}

/// Who may use a tenant site's admin routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TenantAccess {
    /// Active members of the resolved tenant.
    #[default]
    Members,
    /// Active members flagged as staff in the resolved tenant.
    Staff,
}

impl FromStr for TenantAccess {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "members" => Ok(TenantAccess::Members),
            "staff" => Ok(TenantAccess::Staff),
            other => Err(TenancyError::validation(
                "Invalid tenancy configuration",
                serde_json::json!({ ADMIN_ACCESS: [format!("unknown admin access policy '{other}'")] }),
            )
            .into_anyhow()),
        }
    }
}

impl FromStr for RootAccess {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "superadmin" | "superadmins" => Ok(RootAccess::Superadmin),
            "members" => Ok(RootAccess::Members),
            other => Err(TenancyError::validation(
                "Invalid tenancy configuration",
                serde_json::json!({ ROOT_ACCESS: [format!("unknown root access policy '{other}'")] }),
            )
            .into_anyhow()),
        }
    }
}

#[derive(Default)]
struct Inner {
    memberships: HashMap<(UserId, TenantId), Membership>,
    superadmins: HashSet<UserId>,
}

impl Inner {
    fn membership_in(&self, user: &UserId, ctx: &TenantContext) -> Option<&Membership> {
        let tenant = ctx.tenant_id()?;
        self.memberships.get(&(user.clone(), tenant.clone()))
    }

    fn active_membership_in(&self, user: &UserId, ctx: &TenantContext) -> Option<&Membership> {
        self.membership_in(user, ctx).filter(|m| m.is_active)
    }
}

#[derive(Default)]
pub struct MembershipRegistry {
    inner: RwLock<Inner>,
}

impl MembershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adding an existing membership returns it unchanged.
    pub async fn add(&self, user: &UserId, tenant: &TenantId) -> Membership {
        let mut inner = self.inner.write().await;
        inner
            .memberships
            .entry((user.clone(), tenant.clone()))
            .or_insert_with(|| Membership::new(user.clone(), tenant.clone()))
            .clone()
    }

    pub async fn remove(&self, user: &UserId, tenant: &TenantId) -> Result<Membership> {
        let mut inner = self.inner.write().await;
        inner
            .memberships
            .remove(&(user.clone(), tenant.clone()))
            .ok_or_else(|| TenancyError::not_found("membership").into_anyhow())
    }

    pub async fn get(&self, user: &UserId, tenant: &TenantId) -> Option<Membership> {
        let inner = self.inner.read().await;
        inner.memberships.get(&(user.clone(), tenant.clone())).cloned()
    }

    pub async fn tenants_for(&self, user: &UserId) -> Vec<TenantId> {
        let inner = self.inner.read().await;
        let mut out: Vec<TenantId> = inner
            .memberships
            .values()
            .filter(|m| &m.user == user)
            .map(|m| m.tenant.clone())
            .collect();
        out.sort();
        out
    }

    pub async fn members_of(&self, tenant: &TenantId) -> Vec<Membership> {
        let inner = self.inner.read().await;
        let mut out: Vec<Membership> = inner
            .memberships
            .values()
            .filter(|m| &m.tenant == tenant)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.user.cmp(&b.user));
        out
    }

    async fn update<F>(&self, user: &UserId, tenant: &TenantId, f: F) -> Result<Membership>
    where
        F: FnOnce(&mut Membership),
    {
        let mut inner = self.inner.write().await;
        let membership = inner
            .memberships
            .get_mut(&(user.clone(), tenant.clone()))
            .ok_or_else(|| TenancyError::not_found("membership").into_anyhow())?;
        f(membership);
        Ok(membership.clone())
    }

    pub async fn set_staff(&self, user: &UserId, tenant: &TenantId, staff: bool) -> Result<Membership> {
        self.update(user, tenant, |m| m.is_staff = staff).await
    }

    pub async fn set_active(&self, user: &UserId, tenant: &TenantId, active: bool) -> Result<Membership> {
        self.update(user, tenant, |m| m.is_active = active).await
    }

    pub async fn grant(&self, user: &UserId, tenant: &TenantId, perm: &str) -> Result<Membership> {
        self.update(user, tenant, |m| {
            m.permissions.insert(perm.to_string());
        })
        .await
    }

    pub async fn revoke(&self, user: &UserId, tenant: &TenantId, perm: &str) -> Result<Membership> {
        self.update(user, tenant, |m| {
            m.permissions.remove(perm);
        })
        .await
    }

    pub async fn grant_superadmin(&self, user: &UserId) {
        self.inner.write().await.superadmins.insert(user.clone());
        tracing::info!(user = %user, "superadmin granted");
    }

    pub async fn revoke_superadmin(&self, user: &UserId) {
        self.inner.write().await.superadmins.remove(user);
        tracing::info!(user = %user, "superadmin revoked");
    }

    pub async fn is_superadmin(&self, user: &UserId) -> bool {
        self.inner.read().await.superadmins.contains(user)
    }

    /// The user's only tenant, if they hold exactly one active membership.
    /// The root console offers it as the user's home site.
    pub async fn implicit_tenant(&self, user: &UserId) -> Option<TenantId> {
        let inner = self.inner.read().await;
        let mut active = inner
            .memberships
            .values()
            .filter(|m| &m.user == user && m.is_active);
        match (active.next(), active.next()) {
            (Some(only), None) => Some(only.tenant.clone()),
            _ => None,
        }
    }

    pub async fn is_member(&self, user: &UserId, ctx: &TenantContext) -> bool {
        let inner = self.inner.read().await;
        inner.superadmins.contains(user) || inner.active_membership_in(user, ctx).is_some()
    }

    pub async fn is_staff(&self, user: &UserId, ctx: &TenantContext) -> bool {
        let inner = self.inner.read().await;
        inner.superadmins.contains(user)
            || inner
                .active_membership_in(user, ctx)
                .is_some_and(|m| m.is_staff)
    }

    /// Always false when the context has no tenant, unless superadmin.
    pub async fn has_permission(&self, user: &UserId, ctx: &TenantContext, perm: &str) -> bool {
        let inner = self.inner.read().await;
        inner.superadmins.contains(user)
            || inner
                .active_membership_in(user, ctx)
                .is_some_and(|m| m.permissions.contains(perm))
    }

    pub async fn can_enter_root(&self, user: &UserId, access: RootAccess) -> bool {
        let inner = self.inner.read().await;
        if inner.superadmins.contains(user) {
            return true;
        }
        match access {
            RootAccess::Superadmin => false,
            RootAccess::Members => inner
                .memberships
                .values()
                .any(|m| &m.user == user && m.is_active),
        }
    }

    pub async fn remove_tenant(&self, tenant: &TenantId) -> usize {
        let mut inner = self.inner.write().await;
        let before = inner.memberships.len();
        inner.memberships.retain(|(_, t), _| t != tenant);
        before - inner.memberships.len()
    }
}
