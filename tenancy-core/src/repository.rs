//! Tenant-scoped data access.
//!
//! [`ScopedRepository`] is the only door to tenant-owned records. The default
//! operations see the context tenant's records and nothing else; crossing
//! tenants takes a call to [`ScopedRepository::list_all`] or
//! [`ScopedRepository::list_in_tenant`], never a missing filter.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::context::TenantContext;
use crate::entity::{Criteria, TenantOwned, TenantScope};
use crate::errors::TenancyError;
use crate::forms::{CandidateSource, Choice};
use crate::registry::TenantDependents;
use crate::store::{MemoryStore, RecordStore};
use crate::tenant::{TenantId, TenantLease};

pub struct ScopedRepository<R: TenantOwned> {
    store: Arc<dyn RecordStore<R>>,
}

impl<R: TenantOwned> Clone for ScopedRepository<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<R: TenantOwned> ScopedRepository<R> {
    pub fn new(store: Arc<dyn RecordStore<R>>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::<R>::new()))
    }

    /// Drop anything the store returned from outside `scope`.
    fn keep_owned(scope: &TenantScope, mut records: Vec<R>) -> Vec<R> {
        let before = records.len();
        records.retain(|r| scope.admits(r.tenant_id()));
        let leaked = before - records.len();
        if leaked > 0 {
            tracing::warn!(
                kind = R::KIND,
                ?scope,
                leaked,
                "store returned records owned by another tenant; dropped"
            );
        }
        records
    }

    /// Hold the context tenant's lease while writing into it, so the write
    /// cannot land after the tenant was deleted. Records written into some
    /// other tenant explicitly are not covered.
    async fn lease(ctx: &TenantContext, owner: Option<&TenantId>) -> Result<Option<TenantLease>> {
        let Some(tenant) = ctx.tenant().filter(|t| Some(&t.id) == owner) else {
            return Ok(None);
        };
        match tenant.liveness.lease().await {
            Some(lease) => Ok(Some(lease)),
            None => {
                tracing::warn!(kind = R::KIND, tenant = %tenant.id, "write into a deleted tenant refused");
                Err(TenancyError::not_found("tenant").into_anyhow())
            }
        }
    }

    fn assign_tenant(ctx: &TenantContext, record: &mut R) -> Result<()> {
        if record.tenant_id().is_none() {
            let tenant = ctx
                .tenant_id()
                .cloned()
                .ok_or_else(|| TenancyError::MissingTenantReference { kind: R::KIND }.into_anyhow())?;
            record.set_tenant_id(tenant);
        }
        Ok(())
    }

    /// Everything the current tenant owns.
    pub async fn list_default(&self, ctx: &TenantContext) -> Result<Vec<R>> {
        self.filter(ctx, &Criteria::new()).await
    }

    /// Current-tenant records matching `criteria`. Empty when there is no
    /// current tenant; the store is not consulted.
    pub async fn filter(&self, ctx: &TenantContext, criteria: &Criteria) -> Result<Vec<R>> {
        let Some(tenant) = ctx.tenant_id() else {
            return Ok(Vec::new());
        };
        self.list_in_tenant(tenant, criteria).await
    }

    /// Every tenant's records. Intended for superadmin and maintenance code.
    pub async fn list_all(&self, criteria: &Criteria) -> Result<Vec<R>> {
        self.store.query(&TenantScope::AllTenants, criteria).await
    }

    pub async fn list_in_tenant(&self, tenant: &TenantId, criteria: &Criteria) -> Result<Vec<R>> {
        let scope = TenantScope::Tenant(tenant.clone());
        let records = self.store.query(&scope, criteria).await?;
        Ok(Self::keep_owned(&scope, records))
    }

    /// Persist a new record. An unset tenant reference is filled from the
    /// context; one set explicitly by the caller is kept.
    pub async fn create(&self, ctx: &TenantContext, mut record: R) -> Result<R> {
        Self::assign_tenant(ctx, &mut record)?;
        let _lease = Self::lease(ctx, record.tenant_id()).await?;
        self.store.insert(record).await
    }

    /// Like [`ScopedRepository::create`], but fails with `AlreadyExists` if
    /// the tenant already owns a record of this type.
    pub async fn create_sole(&self, ctx: &TenantContext, mut record: R) -> Result<R> {
        Self::assign_tenant(ctx, &mut record)?;
        let _lease = Self::lease(ctx, record.tenant_id()).await?;
        self.store.insert_sole(record).await
    }

    /// Exactly one current-tenant record matching `criteria`.
    ///
    /// Zero matches, several matches and a match in another tenant all look
    /// the same to the caller.
    pub async fn get_or_not_found(&self, ctx: &TenantContext, criteria: &Criteria) -> Result<R> {
        let mut found = self.filter(ctx, criteria).await?;
        if found.len() == 1 {
            Ok(found.remove(0))
        } else {
            Err(TenancyError::not_found(R::KIND).into_anyhow())
        }
    }

    pub async fn get(&self, ctx: &TenantContext, id: &str) -> Result<R> {
        self.get_or_not_found(ctx, &Criteria::id(id)).await
    }

    /// Replace a current-tenant record. The stored tenant reference wins; a
    /// record claiming a different tenant is refused.
    pub async fn update(&self, ctx: &TenantContext, id: &str, mut record: R) -> Result<R> {
        let existing = self.get(ctx, id).await?;
        let owner = existing
            .tenant_id()
            .cloned()
            .ok_or_else(|| TenancyError::MissingTenantReference { kind: R::KIND }.into_anyhow())?;

        match record.tenant_id() {
            Some(claimed) if claimed != &owner => {
                tracing::warn!(kind = R::KIND, id, owner = %owner, claimed = %claimed, "tenant reassignment refused");
                return Err(TenancyError::TenantReassignment { kind: R::KIND }.into_anyhow());
            }
            Some(_) => {}
            None => record.set_tenant_id(owner.clone()),
        }
        record.set_id(existing.id().to_string());
        let _lease = Self::lease(ctx, Some(&owner)).await?;
        self.store.replace(record).await
    }

    pub async fn remove(&self, ctx: &TenantContext, id: &str) -> Result<R> {
        let existing = self.get(ctx, id).await?;
        let owner = existing
            .tenant_id()
            .cloned()
            .ok_or_else(|| TenancyError::MissingTenantReference { kind: R::KIND }.into_anyhow())?;
        self.store
            .delete(&owner, existing.id())
            .await?
            .ok_or_else(|| TenancyError::not_found(R::KIND).into_anyhow())
    }
}

#[async_trait]
impl<R: TenantOwned> TenantDependents for ScopedRepository<R> {
    fn kind(&self) -> &'static str {
        R::KIND
    }

    async fn count_in_tenant(&self, tenant: &TenantId) -> Result<usize> {
        self.store.count(&TenantScope::Tenant(tenant.clone())).await
    }

    async fn purge_tenant(&self, tenant: &TenantId) -> Result<usize> {
        self.store.delete_scope(tenant).await
    }
}

#[async_trait]
impl<R: TenantOwned> CandidateSource for ScopedRepository<R> {
    async fn candidates(&self, ctx: &TenantContext) -> Result<Vec<Choice>> {
        Ok(self
            .list_default(ctx)
            .await?
            .iter()
            .map(|r| Choice::new(r.id(), r.label()))
            .collect())
    }
}
