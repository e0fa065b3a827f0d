//! Persistence seam.
//!
//! [`RecordStore`] is the query/filter/create capability the tenancy core
//! consumes from a data-access layer. The core never talks to a database
//! directly; [`MemoryStore`] is a complete in-process implementation used by
//! tests and demos.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::entity::{Criteria, TenantOwned, TenantScope};
use crate::errors::TenancyError;
use crate::tenant::TenantId;

#[async_trait]
pub trait RecordStore<R>: Send + Sync
where
    R: TenantOwned,
{
    /// Records visible in `scope` that match `criteria`.
    async fn query(&self, scope: &TenantScope, criteria: &Criteria) -> Result<Vec<R>>;

    /// Store a new record. The tenant reference must already be set; an empty
    /// id is replaced by a generated one.
    async fn insert(&self, record: R) -> Result<R>;

    /// Like [`RecordStore::insert`], but only while the record's tenant owns
    /// no record of this type. The check and the insert are one atomic step;
    /// otherwise fails with `AlreadyExists`.
    async fn insert_sole(&self, record: R) -> Result<R>;

    /// Replace an existing record, looked up by its tenant and id.
    async fn replace(&self, record: R) -> Result<R>;

    async fn delete(&self, tenant: &TenantId, id: &str) -> Result<Option<R>>;

    async fn count(&self, scope: &TenantScope) -> Result<usize>;

    /// Remove every record owned by `tenant`, returning how many went.
    async fn delete_scope(&self, tenant: &TenantId) -> Result<usize>;
}

/// In-memory store keyed by tenant, then id.
pub struct MemoryStore<R> {
    by_tenant: RwLock<HashMap<TenantId, BTreeMap<String, R>>>,
}

impl<R> Default for MemoryStore<R> {
    fn default() -> Self {
        Self {
            by_tenant: RwLock::new(HashMap::new()),
        }
    }
}

impl<R> MemoryStore<R> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: TenantOwned> MemoryStore<R> {
    /// With `sole`, refuse if the tenant already owns any record.
    async fn insert_checked(&self, mut record: R, sole: bool) -> Result<R> {
        let tenant = owner(&record)?;
        if record.id().trim().is_empty() {
            record.set_id(format!("{}:{}", R::KIND, Uuid::new_v4()));
        }

        let mut by_tenant = self.by_tenant.write().await;
        let records = by_tenant.entry(tenant).or_default();
        if records.contains_key(record.id()) || (sole && !records.is_empty()) {
            return Err(TenancyError::AlreadyExists {
                kind: R::KIND.to_string(),
            }
            .into_anyhow());
        }
        records.insert(record.id().to_string(), record.clone());
        Ok(record)
    }
}

fn matches<R: TenantOwned>(record: &R, criteria: &Criteria) -> Result<bool> {
    if criteria.is_empty() {
        return Ok(true);
    }
    let value = serde_json::to_value(record)?;
    Ok(criteria.matches(&value))
}

fn owner<R: TenantOwned>(record: &R) -> Result<TenantId> {
    record
        .tenant_id()
        .cloned()
        .ok_or_else(|| TenancyError::MissingTenantReference { kind: R::KIND }.into_anyhow())
}

#[async_trait]
impl<R> RecordStore<R> for MemoryStore<R>
where
    R: TenantOwned,
{
    async fn query(&self, scope: &TenantScope, criteria: &Criteria) -> Result<Vec<R>> {
        let by_tenant = self.by_tenant.read().await;
        let mut out = Vec::new();
        match scope {
            TenantScope::Tenant(tenant) => {
                for record in by_tenant.get(tenant).into_iter().flat_map(|m| m.values()) {
                    if matches(record, criteria)? {
                        out.push(record.clone());
                    }
                }
            }
            TenantScope::AllTenants => {
                for record in by_tenant.values().flat_map(|m| m.values()) {
                    if matches(record, criteria)? {
                        out.push(record.clone());
                    }
                }
            }
        }
        Ok(out)
    }

    async fn insert(&self, record: R) -> Result<R> {
        self.insert_checked(record, false).await
    }

    async fn insert_sole(&self, record: R) -> Result<R> {
        self.insert_checked(record, true).await
    }

    async fn replace(&self, record: R) -> Result<R> {
        let tenant = owner(&record)?;
        let mut by_tenant = self.by_tenant.write().await;
        let slot = by_tenant
            .get_mut(&tenant)
            .and_then(|m| m.get_mut(record.id()))
            .ok_or_else(|| TenancyError::not_found(R::KIND).into_anyhow())?;
        *slot = record.clone();
        Ok(record)
    }

    async fn delete(&self, tenant: &TenantId, id: &str) -> Result<Option<R>> {
        let mut by_tenant = self.by_tenant.write().await;
        Ok(by_tenant.get_mut(tenant).and_then(|m| m.remove(id)))
    }

    async fn count(&self, scope: &TenantScope) -> Result<usize> {
        let by_tenant = self.by_tenant.read().await;
        Ok(match scope {
            TenantScope::Tenant(tenant) => by_tenant.get(tenant).map_or(0, |m| m.len()),
            TenantScope::AllTenants => by_tenant.values().map(|m| m.len()).sum(),
        })
    }

    async fn delete_scope(&self, tenant: &TenantId) -> Result<usize> {
        let mut by_tenant = self.by_tenant.write().await;
        Ok(by_tenant.remove(tenant).map_or(0, |m| m.len()))
    }
}
