use std::sync::Arc;

use anyhow::Result;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;

use crate::config::{RoutingConfig, TENANTS_DELETION};
use crate::errors::TenancyError;
use crate::tenant::{validate_domain, validate_path_key, NewTenant, Tenant, TenantId};

/// What happens to tenant-owned records when their tenant is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletionPolicy {
    /// Refuse to delete a tenant that still owns records.
    #[default]
    Restrict,
    /// Purge every dependent's records, then delete the tenant.
    Cascade,
}

impl std::str::FromStr for DeletionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "restrict" => Ok(DeletionPolicy::Restrict),
            "cascade" => Ok(DeletionPolicy::Cascade),
            other => Err(TenancyError::validation(
                "Invalid tenancy configuration",
                json!({ TENANTS_DELETION: [format!("unknown deletion policy '{other}'")] }),
            )
            .into_anyhow()),
        }
    }
}

/// Something that owns records on behalf of tenants.
///
/// The registry consults every registered dependent before deleting a tenant.
#[async_trait]
pub trait TenantDependents: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn count_in_tenant(&self, tenant: &TenantId) -> Result<usize>;

    async fn purge_tenant(&self, tenant: &TenantId) -> Result<usize>;
}

/// Immutable view of the registry, in creation order.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    tenants: Vec<Arc<Tenant>>,
}

impl RegistrySnapshot {
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Tenant>> {
        self.tenants.iter()
    }

    pub fn active(&self) -> impl Iterator<Item = &Arc<Tenant>> {
        self.tenants.iter().filter(|t| t.is_active)
    }

    pub fn get(&self, id: &TenantId) -> Option<&Arc<Tenant>> {
        self.tenants.iter().find(|t| &t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    fn with(&self, tenant: Arc<Tenant>) -> Self {
        let mut tenants = self.tenants.clone();
        match tenants.iter().position(|t| t.id == tenant.id) {
            Some(i) => tenants[i] = tenant,
            None => tenants.push(tenant),
        }
        Self { tenants }
    }

    fn without(&self, id: &TenantId) -> Self {
        Self {
            tenants: self.tenants.iter().filter(|t| &t.id != id).cloned().collect(),
        }
    }
}

/// The durable set of tenants.
///
/// Reads hand out an `Arc` snapshot and never wait on writers for longer than
/// a pointer swap. Writes are serialized so the routing-uniqueness check and
/// the publish happen atomically with respect to other writes.
///
/// Deleting a tenant does not touch user memberships; go through
/// [`crate::TenancyApp::delete_tenant`] to drop those as well.
pub struct TenantRegistry {
    current: ArcSwap<RegistrySnapshot>,
    writer: Mutex<()>,
    policy: DeletionPolicy,
    base_domain: String,
    root_path: String,
    dependents: ArcSwap<Vec<Arc<dyn TenantDependents>>>,
}

impl TenantRegistry {
    pub fn new(routing: &RoutingConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(RegistrySnapshot::default()),
            writer: Mutex::new(()),
            policy: DeletionPolicy::default(),
            base_domain: routing.base_domain.clone(),
            root_path: routing.root_path.clone(),
            dependents: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn with_policy(mut self, policy: DeletionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> DeletionPolicy {
        self.policy
    }

    pub fn register_dependent(&self, dependent: Arc<dyn TenantDependents>) {
        self.dependents.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&dependent));
            next
        });
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    pub fn get(&self, id: &TenantId) -> Option<Arc<Tenant>> {
        self.snapshot().get(id).cloned()
    }

    pub fn require(&self, id: &TenantId) -> Result<Arc<Tenant>> {
        self.get(id)
            .ok_or_else(|| TenancyError::not_found("tenant").into_anyhow())
    }

    pub fn list(&self) -> Vec<Arc<Tenant>> {
        self.snapshot().iter().cloned().collect()
    }

    fn publish(&self, next: RegistrySnapshot) {
        self.current.store(Arc::new(next));
    }

    /// Reject `candidate` if any of its routing keys would match the same
    /// request as another active tenant or the root site.
    fn check_routing(&self, snapshot: &RegistrySnapshot, candidate: &Tenant) -> Result<()> {
        if !candidate.is_active {
            return Ok(());
        }
        let ambiguous = |key: &str| TenancyError::AmbiguousRouting { key: key.to_string() }.into_anyhow();

        for host in candidate.hostnames() {
            if host == self.base_domain {
                return Err(ambiguous(host));
            }
            let taken = snapshot
                .active()
                .filter(|t| t.id != candidate.id)
                .any(|t| t.hostnames().any(|h| h == host));
            if taken {
                return Err(ambiguous(host));
            }
        }

        if let Some(key) = candidate.path_key.as_deref() {
            if key == self.root_path {
                return Err(ambiguous(key));
            }
            let taken = snapshot
                .active()
                .filter(|t| t.id != candidate.id)
                .any(|t| t.path_key.as_deref() == Some(key));
            if taken {
                return Err(ambiguous(key));
            }
        }
        Ok(())
    }

    pub async fn create(&self, new: NewTenant) -> Result<Arc<Tenant>> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(TenancyError::validation(
                "Tenant validation failed",
                json!({"name": ["is required"]}),
            )
            .into_anyhow());
        }

        let domain = new.domain.as_deref().map(validate_domain).transpose()?;
        let path_key = new.path_key.as_deref().map(validate_path_key).transpose()?;
        if domain.is_none() && path_key.is_none() {
            return Err(TenancyError::validation(
                "Tenant validation failed",
                json!({"_schema": ["a tenant needs a domain or a path key"]}),
            )
            .into_anyhow());
        }

        let mut aliases: Vec<String> = Vec::with_capacity(new.aliases.len());
        for alias in &new.aliases {
            let alias = validate_domain(alias)?;
            if domain.as_deref() == Some(alias.as_str()) || aliases.contains(&alias) {
                return Err(TenancyError::AmbiguousRouting { key: alias }.into_anyhow());
            }
            aliases.push(alias);
        }

        let now = Utc::now();
        let tenant = Tenant {
            id: TenantId::generate(),
            name,
            domain,
            path_key,
            aliases,
            preferred_domain: None,
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
            liveness: Default::default(),
        };

        let _guard = self.writer.lock().await;
        let snapshot = self.snapshot();
        self.check_routing(&snapshot, &tenant)?;

        let tenant = Arc::new(tenant);
        self.publish(snapshot.with(Arc::clone(&tenant)));
        tracing::info!(tenant = %tenant.id, name = %tenant.name, "tenant created");
        Ok(tenant)
    }

    /// Management shortcut for a host-routed tenant.
    pub async fn create_site(&self, domain: &str, name: &str) -> Result<Arc<Tenant>> {
        self.create(NewTenant::with_domain(name, domain)).await
    }

    /// Management shortcut for a path-routed tenant.
    pub async fn create_path_site(&self, key: &str, name: &str) -> Result<Arc<Tenant>> {
        self.create(NewTenant::with_path_key(name, key)).await
    }

    async fn modify<F>(&self, id: &TenantId, f: F) -> Result<Arc<Tenant>>
    where
        F: FnOnce(&mut Tenant) -> Result<()>,
    {
        let _guard = self.writer.lock().await;
        let snapshot = self.snapshot();
        let current = snapshot
            .get(id)
            .ok_or_else(|| TenancyError::not_found("tenant").into_anyhow())?;

        let mut next = Tenant::clone(current);
        f(&mut next)?;
        next.updated_at = Utc::now();
        self.check_routing(&snapshot, &next)?;

        let next = Arc::new(next);
        self.publish(snapshot.with(Arc::clone(&next)));
        Ok(next)
    }

    pub async fn rename(&self, id: &TenantId, name: &str) -> Result<Arc<Tenant>> {
        let name = name.trim().to_string();
        self.modify(id, |t| {
            if name.is_empty() {
                return Err(TenancyError::validation(
                    "Tenant validation failed",
                    json!({"name": ["is required"]}),
                )
                .into_anyhow());
            }
            t.name = name;
            Ok(())
        })
        .await
    }

    pub async fn add_alias(&self, id: &TenantId, alias: &str) -> Result<Arc<Tenant>> {
        let alias = validate_domain(alias)?;
        let tenant = self
            .modify(id, |t| {
                if t.hostnames().any(|h| h == alias) {
                    return Err(TenancyError::AmbiguousRouting { key: alias.clone() }.into_anyhow());
                }
                t.aliases.push(alias.clone());
                Ok(())
            })
            .await?;
        tracing::info!(tenant = %id, alias = %alias, "alias added");
        Ok(tenant)
    }

    /// Removing the preferred alias also clears the preference.
    pub async fn remove_alias(&self, id: &TenantId, alias: &str) -> Result<Arc<Tenant>> {
        let alias = validate_domain(alias)?;
        self.modify(id, |t| {
            if !t.has_alias(&alias) {
                return Err(TenancyError::not_found("alias").into_anyhow());
            }
            t.aliases.retain(|a| a != &alias);
            if t.preferred_domain.as_deref() == Some(alias.as_str()) {
                t.preferred_domain = None;
            }
            Ok(())
        })
        .await
    }

    /// The preferred domain must be one of the tenant's saved aliases.
    pub async fn set_preferred_domain(
        &self,
        id: &TenantId,
        domain: Option<&str>,
    ) -> Result<Arc<Tenant>> {
        let domain = domain.map(validate_domain).transpose()?;
        self.modify(id, |t| {
            if let Some(d) = domain.as_deref() {
                if !t.has_alias(d) {
                    return Err(TenancyError::validation(
                        "Tenant validation failed",
                        json!({"preferred_domain": [
                            "You must first save a Domain Name Alias, then set this field to match one of those Aliases."
                        ]}),
                    )
                    .into_anyhow());
                }
            }
            t.preferred_domain = domain;
            Ok(())
        })
        .await
    }

    /// Activation re-runs the routing check against the other active tenants.
    pub async fn set_active(&self, id: &TenantId, active: bool) -> Result<Arc<Tenant>> {
        let tenant = self
            .modify(id, |t| {
                t.is_active = active;
                Ok(())
            })
            .await?;
        tracing::info!(tenant = %id, active, "tenant activation changed");
        Ok(tenant)
    }

    /// Delete a tenant according to the registry's [`DeletionPolicy`].
    ///
    /// The tenant stops resolving first. Deletion then waits for writers that
    /// already hold the tenant's lease and keeps new ones out until it is
    /// done, so no record can be stored after the dependents were counted or
    /// purged.
    ///
    /// Under `Restrict` a tenant that still owns records is put back. Under
    /// `Cascade` every dependent is counted before anything is purged; a
    /// failed count puts the tenant back untouched. A failed purge leaves the
    /// tenant deleted and reports `PartialPurge` naming the dependents whose
    /// records remain.
    pub async fn delete(&self, id: &TenantId) -> Result<Arc<Tenant>> {
        let _guard = self.writer.lock().await;
        let snapshot = self.snapshot();
        let tenant = snapshot
            .get(id)
            .cloned()
            .ok_or_else(|| TenancyError::not_found("tenant").into_anyhow())?;

        self.publish(snapshot.without(id));
        let mut live = tenant.liveness.exclusive().await;

        let dependents = self.dependents.load_full();
        let counts = match self.count_dependents(id, &dependents).await {
            Ok(counts) => counts,
            Err(err) => {
                self.publish(RegistrySnapshot::clone(&snapshot));
                return Err(err);
            }
        };

        match self.policy {
            DeletionPolicy::Restrict => {
                let blocking: Vec<String> = counts
                    .iter()
                    .filter(|(_, n)| *n > 0)
                    .map(|(kind, _)| kind.to_string())
                    .collect();
                if !blocking.is_empty() {
                    tracing::warn!(tenant = %id, ?blocking, "tenant deletion refused");
                    self.publish(RegistrySnapshot::clone(&snapshot));
                    return Err(TenancyError::TenantInUse {
                        tenant: id.to_string(),
                        dependents: blocking,
                    }
                    .into_anyhow());
                }
                *live = false;
            }
            DeletionPolicy::Cascade => {
                *live = false;
                tracing::debug!(tenant = %id, ?counts, "purging tenant records");
                let failed = self.purge_dependents(id, &dependents).await;
                if !failed.is_empty() {
                    return Err(TenancyError::PartialPurge {
                        tenant: id.to_string(),
                        failed,
                    }
                    .into_anyhow());
                }
            }
        }

        tracing::info!(tenant = %id, policy = ?self.policy, "tenant deleted");
        Ok(tenant)
    }

    async fn count_dependents(
        &self,
        id: &TenantId,
        dependents: &[Arc<dyn TenantDependents>],
    ) -> Result<Vec<(&'static str, usize)>> {
        let mut counts = Vec::with_capacity(dependents.len());
        for dependent in dependents {
            counts.push((dependent.kind(), dependent.count_in_tenant(id).await?));
        }
        Ok(counts)
    }

    /// Purge every dependent, carrying on past failures. Returns the kinds
    /// that could not be purged.
    async fn purge_dependents(&self, id: &TenantId, dependents: &[Arc<dyn TenantDependents>]) -> Vec<String> {
        let mut failed = Vec::new();
        for dependent in dependents {
            match dependent.purge_tenant(id).await {
                Ok(purged) => {
                    tracing::info!(tenant = %id, kind = dependent.kind(), purged, "tenant records purged");
                }
                Err(err) => {
                    tracing::error!(tenant = %id, kind = dependent.kind(), error = ?err, "tenant purge failed");
                    failed.push(dependent.kind().to_string());
                }
            }
        }
        failed
    }
}
