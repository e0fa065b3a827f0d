//! Tenant-scoped administrative services.
//!
//! [`AdminService`] is the Feathers-shaped surface (find/get/create/update/
//! patch/remove) that transports mount. [`ScopedAdmin`] implements it on top
//! of a [`ScopedRepository`] and a [`FormFactory`], so every listing and every
//! write goes through tenant scoping and tenant-narrowed input cleaning.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use validator::Validate;

use crate::context::TenantContext;
use crate::entity::{Criteria, TenantOwned, TenantSettings, TENANT_FIELD};
use crate::errors::TenancyError;
use crate::forms::ScopedForm;
use crate::repository::ScopedRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminMethod {
    Find,
    Get,
    Create,
    Update,
    Patch,
    Remove,
}

impl AdminMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminMethod::Find => "find",
            AdminMethod::Get => "get",
            AdminMethod::Create => "create",
            AdminMethod::Update => "update",
            AdminMethod::Patch => "patch",
            AdminMethod::Remove => "remove",
        }
    }
}

/// Which methods a service exposes. Transports only mount these.
#[derive(Debug, Clone)]
pub struct AdminCapabilities {
    pub allowed_methods: Vec<AdminMethod>,
}

impl AdminCapabilities {
    pub fn standard_crud() -> Self {
        use AdminMethod::*;
        Self {
            allowed_methods: vec![Find, Get, Create, Update, Patch, Remove],
        }
    }

    pub fn read_only() -> Self {
        Self {
            allowed_methods: vec![AdminMethod::Find, AdminMethod::Get],
        }
    }

    /// One record per tenant: it can be created and edited, not removed.
    pub fn singleton() -> Self {
        use AdminMethod::*;
        Self {
            allowed_methods: vec![Find, Get, Create, Update, Patch],
        }
    }

    pub fn from_methods(methods: Vec<AdminMethod>) -> Self {
        Self {
            allowed_methods: methods,
        }
    }

    pub fn allows(&self, method: AdminMethod) -> bool {
        self.allowed_methods.contains(&method)
    }
}

fn not_allowed(method: AdminMethod) -> anyhow::Error {
    TenancyError::MethodNotAllowed {
        method: method.as_str().to_string(),
    }
    .into_anyhow()
}

/// Every method receives the request's [`TenantContext`]. Methods a service
/// does not override answer `MethodNotAllowed`.
#[async_trait]
pub trait AdminService<R>: Send + Sync
where
    R: Send + 'static,
{
    fn capabilities(&self) -> AdminCapabilities {
        AdminCapabilities::standard_crud()
    }

    async fn find(&self, _ctx: &TenantContext, _criteria: Criteria) -> Result<Vec<R>> {
        Err(not_allowed(AdminMethod::Find))
    }

    async fn get(&self, _ctx: &TenantContext, _id: &str) -> Result<R> {
        Err(not_allowed(AdminMethod::Get))
    }

    async fn create(&self, _ctx: &TenantContext, _data: Value) -> Result<R> {
        Err(not_allowed(AdminMethod::Create))
    }

    async fn update(&self, _ctx: &TenantContext, _id: &str, _data: Value) -> Result<R> {
        Err(not_allowed(AdminMethod::Update))
    }

    async fn patch(&self, _ctx: &TenantContext, _id: &str, _data: Value) -> Result<R> {
        Err(not_allowed(AdminMethod::Patch))
    }

    async fn remove(&self, _ctx: &TenantContext, _id: &str) -> Result<R> {
        Err(not_allowed(AdminMethod::Remove))
    }
}

/// Builds the form used to clean a request's input.
///
/// Implement this when a record references other tenant-owned records, so
/// the reference fields can be narrowed with [`ScopedForm::builder`].
#[async_trait]
pub trait FormFactory<R>: Send + Sync {
    async fn form(&self, ctx: &TenantContext) -> Result<ScopedForm<R>>;
}

/// A form with no reference fields.
pub struct PlainForm;

#[async_trait]
impl<R> FormFactory<R> for PlainForm
where
    R: TenantOwned + Validate,
{
    async fn form(&self, ctx: &TenantContext) -> Result<ScopedForm<R>> {
        ScopedForm::builder(ctx).build().await
    }
}

pub struct ScopedAdmin<R: TenantOwned> {
    repository: ScopedRepository<R>,
    forms: Arc<dyn FormFactory<R>>,
    capabilities: AdminCapabilities,
    singleton: bool,
}

impl<R> ScopedAdmin<R>
where
    R: TenantOwned + Validate,
{
    pub fn new(repository: ScopedRepository<R>) -> Self {
        Self {
            repository,
            forms: Arc::new(PlainForm),
            capabilities: AdminCapabilities::standard_crud(),
            singleton: false,
        }
    }

    pub fn with_forms(mut self, forms: Arc<dyn FormFactory<R>>) -> Self {
        self.forms = forms;
        self
    }

    pub fn with_capabilities(mut self, capabilities: AdminCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn repository(&self) -> &ScopedRepository<R> {
        &self.repository
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    fn ensure(&self, method: AdminMethod) -> Result<()> {
        if self.capabilities.allows(method) {
            Ok(())
        } else {
            Err(not_allowed(method))
        }
    }

    /// The tenant's settings record. Only meaningful in singleton mode, where
    /// there is at most one.
    pub async fn current(&self, ctx: &TenantContext) -> Result<R> {
        self.repository
            .list_default(ctx)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TenancyError::not_found(R::KIND).into_anyhow())
    }
}

impl<R> ScopedAdmin<R>
where
    R: TenantSettings + Validate,
{
    /// Admin for a per-tenant settings record: listing shows the tenant's one
    /// record and a second create is a conflict.
    pub fn singleton(repository: ScopedRepository<R>) -> Self {
        Self {
            capabilities: AdminCapabilities::singleton(),
            singleton: true,
            ..Self::new(repository)
        }
    }
}

#[async_trait]
impl<R> AdminService<R> for ScopedAdmin<R>
where
    R: TenantOwned + Validate,
{
    fn capabilities(&self) -> AdminCapabilities {
        self.capabilities.clone()
    }

    async fn find(&self, ctx: &TenantContext, criteria: Criteria) -> Result<Vec<R>> {
        self.ensure(AdminMethod::Find)?;
        self.repository.filter(ctx, &criteria).await
    }

    async fn get(&self, ctx: &TenantContext, id: &str) -> Result<R> {
        self.ensure(AdminMethod::Get)?;
        self.repository.get(ctx, id).await
    }

    async fn create(&self, ctx: &TenantContext, data: Value) -> Result<R> {
        self.ensure(AdminMethod::Create)?;
        let form = self.forms.form(ctx).await?;
        let record = form.validate(data, None)?;
        if self.singleton {
            self.repository.create_sole(ctx, record).await
        } else {
            self.repository.create(ctx, record).await
        }
    }

    async fn update(&self, ctx: &TenantContext, id: &str, data: Value) -> Result<R> {
        self.ensure(AdminMethod::Update)?;
        let existing = self.repository.get(ctx, id).await?;
        let form = self.forms.form(ctx).await?;
        let record = form.validate(data, Some(&existing))?;
        self.repository.update(ctx, id, record).await
    }

    /// Submitted fields are merged over the stored record before cleaning.
    async fn patch(&self, ctx: &TenantContext, id: &str, data: Value) -> Result<R> {
        self.ensure(AdminMethod::Patch)?;
        let existing = self.repository.get(ctx, id).await?;

        let mut merged = serde_json::to_value(&existing)?;
        if let (Value::Object(base), Value::Object(changes)) = (&mut merged, data) {
            for (key, value) in changes {
                if key != TENANT_FIELD && key != "id" {
                    base.insert(key, value);
                }
            }
        }

        let form = self.forms.form(ctx).await?;
        let record = form.validate(merged, Some(&existing))?;
        self.repository.update(ctx, id, record).await
    }

    async fn remove(&self, ctx: &TenantContext, id: &str) -> Result<R> {
        self.ensure(AdminMethod::Remove)?;
        self.repository.remove(ctx, id).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;
    use crate::entity::TenantScope;
    use crate::store::{MemoryStore, RecordStore};
    use crate::tenant::{Tenant, TenantId};

    #[derive(Debug, Clone, Serialize, Deserialize, Validate)]
    struct Board {
        #[serde(default)]
        id: String,
        #[serde(default)]
        tenant_id: Option<TenantId>,
        #[validate(length(min = 1, message = "title is required"))]
        title: String,
        #[serde(default)]
        archived: bool,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, Validate)]
    struct Branding {
        #[serde(default)]
        id: String,
        #[serde(default)]
        tenant_id: Option<TenantId>,
        color: String,
    }

    macro_rules! tenant_owned {
        ($ty:ty, $kind:literal) => {
            impl TenantOwned for $ty {
                const KIND: &'static str = $kind;
                fn id(&self) -> &str {
                    &self.id
                }
                fn set_id(&mut self, id: String) {
                    self.id = id;
                }
                fn tenant_id(&self) -> Option<&TenantId> {
                    self.tenant_id.as_ref()
                }
                fn set_tenant_id(&mut self, tenant: TenantId) {
                    self.tenant_id = Some(tenant);
                }
            }
        };
    }

    tenant_owned!(Board, "board");
    tenant_owned!(Branding, "branding");
    impl TenantSettings for Branding {}

    fn ctx(id: &str) -> TenantContext {
        let now = Utc::now();
        TenantContext::for_tenant(Arc::new(Tenant {
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
        }))
    }

    #[tokio::test]
    async fn admin_listing_is_scoped() {
        let admin = ScopedAdmin::new(ScopedRepository::<Board>::in_memory());
        let (a, b) = (ctx("a"), ctx("b"));
        admin.create(&a, json!({"title": "A board"})).await.unwrap();
        let theirs = admin.create(&b, json!({"title": "B board"})).await.unwrap();

        let listed = admin.find(&a, Criteria::new()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "A board");

        assert!(admin.get(&a, &theirs.id).await.is_err());
        assert!(admin.patch(&a, &theirs.id, json!({"title": "mine now"})).await.is_err());
        assert_eq!(admin.get(&b, &theirs.id).await.unwrap().title, "B board");
    }

    #[tokio::test]
    async fn patch_merges_and_keeps_tenant() {
        let admin = ScopedAdmin::new(ScopedRepository::<Board>::in_memory());
        let a = ctx("a");
        let created = admin.create(&a, json!({"title": "Roadmap"})).await.unwrap();

        let patched = admin
            .patch(&a, &created.id, json!({"archived": true, "tenant_id": "b"}))
            .await
            .unwrap();
        assert_eq!(patched.title, "Roadmap");
        assert!(patched.archived);
        assert_eq!(patched.tenant_id, Some(TenantId::new("a")));

        let err = admin.update(&a, &created.id, json!({"title": ""})).await.unwrap_err();
        assert!(TenancyError::is(&err, "Validation"));
    }

    #[tokio::test]
    async fn singleton_allows_one_record_per_tenant() {
        let admin = ScopedAdmin::singleton(ScopedRepository::<Branding>::in_memory());
        let (a, b) = (ctx("a"), ctx("b"));

        assert!(TenancyError::is(&admin.current(&a).await.unwrap_err(), "NotFound"));
        admin.create(&a, json!({"color": "red"})).await.unwrap();
        admin.create(&b, json!({"color": "blue"})).await.unwrap();

        let err = admin.create(&a, json!({"color": "green"})).await.unwrap_err();
        assert!(TenancyError::is(&err, "AlreadyExists"));
        assert_eq!(admin.current(&a).await.unwrap().color, "red");
        assert_eq!(admin.current(&b).await.unwrap().color, "blue");

        let current = admin.current(&a).await.unwrap();
        let err = admin.remove(&a, &current.id).await.unwrap_err();
        assert!(TenancyError::is(&err, "MethodNotAllowed"));
    }

    /// Hands control back to the scheduler around every store call.
    struct Yielding(MemoryStore<Branding>);

    #[async_trait]
    impl RecordStore<Branding> for Yielding {
        async fn query(&self, scope: &TenantScope, criteria: &Criteria) -> Result<Vec<Branding>> {
            tokio::task::yield_now().await;
            self.0.query(scope, criteria).await
        }

        async fn insert(&self, record: Branding) -> Result<Branding> {
            tokio::task::yield_now().await;
            self.0.insert(record).await
        }

        async fn insert_sole(&self, record: Branding) -> Result<Branding> {
            tokio::task::yield_now().await;
            self.0.insert_sole(record).await
        }

        async fn replace(&self, record: Branding) -> Result<Branding> {
            tokio::task::yield_now().await;
            self.0.replace(record).await
        }

        async fn delete(&self, tenant: &TenantId, id: &str) -> Result<Option<Branding>> {
            tokio::task::yield_now().await;
            self.0.delete(tenant, id).await
        }

        async fn count(&self, scope: &TenantScope) -> Result<usize> {
            self.0.count(scope).await
        }

        async fn delete_scope(&self, tenant: &TenantId) -> Result<usize> {
            self.0.delete_scope(tenant).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_singleton_creates_keep_one() {
        let repo = ScopedRepository::<Branding>::new(Arc::new(Yielding(MemoryStore::new())));
        let admin = Arc::new(ScopedAdmin::singleton(repo.clone()));
        let a = ctx("a");

        let attempts: Vec<_> = (0..16)
            .map(|i| {
                let admin = Arc::clone(&admin);
                let a = a.clone();
                tokio::spawn(async move { admin.create(&a, json!({"color": format!("c{i}")})).await })
            })
            .collect();

        let mut created = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => created += 1,
                Err(err) => assert!(TenancyError::is(&err, "AlreadyExists")),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(repo.list_default(&a).await.unwrap().len(), 1);
    }

    struct ReadOnly;

    #[async_trait]
    impl AdminService<Board> for ReadOnly {
        fn capabilities(&self) -> AdminCapabilities {
            AdminCapabilities::read_only()
        }

        async fn find(&self, _ctx: &TenantContext, _criteria: Criteria) -> Result<Vec<Board>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn unimplemented_methods_are_not_allowed() {
        let svc = ReadOnly;
        assert!(svc.find(&ctx("a"), Criteria::new()).await.unwrap().is_empty());
        let err = svc.create(&ctx("a"), json!({})).await.unwrap_err();
        assert_eq!(TenancyError::from_anyhow(&err).unwrap().code(), 405);
    }
}
