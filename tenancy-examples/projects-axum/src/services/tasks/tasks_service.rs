use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tenancy_core::{
    AdminCapabilities, AdminService, Criteria, FormFactory, ScopedAdmin, ScopedForm,
    ScopedRepository, TenancyApp, TenancyError, TenantContext,
};

use super::tasks_schema::{Task, DELETE_PERMISSION};
use crate::services::Project;

/// Task forms only offer the current tenant's projects.
struct TaskForms {
    projects: ScopedRepository<Project>,
}

#[async_trait]
impl FormFactory<Task> for TaskForms {
    async fn form(&self, ctx: &TenantContext) -> Result<ScopedForm<Task>> {
        ScopedForm::builder(ctx)
            .reference("project_id", &self.projects)
            .message("Tasks schema validation failed")
            .build()
            .await
    }
}

/// Scoped CRUD for tasks; removal also needs the tenant's delete permission.
pub struct TasksService {
    app: TenancyApp,
    admin: ScopedAdmin<Task>,
}

impl TasksService {
    pub fn new(app: TenancyApp, tasks: ScopedRepository<Task>, projects: ScopedRepository<Project>) -> Self {
        let admin = ScopedAdmin::new(tasks).with_forms(std::sync::Arc::new(TaskForms { projects }));
        Self { app, admin }
    }
}

#[async_trait]
impl AdminService<Task> for TasksService {
    fn capabilities(&self) -> AdminCapabilities {
        AdminCapabilities::standard_crud()
    }

    async fn find(&self, ctx: &TenantContext, criteria: Criteria) -> Result<Vec<Task>> {
        self.admin.find(ctx, criteria).await
    }

    async fn get(&self, ctx: &TenantContext, id: &str) -> Result<Task> {
        self.admin.get(ctx, id).await
    }

    async fn create(&self, ctx: &TenantContext, data: Value) -> Result<Task> {
        self.admin.create(ctx, data).await
    }

    async fn update(&self, ctx: &TenantContext, id: &str, data: Value) -> Result<Task> {
        self.admin.update(ctx, id, data).await
    }

    async fn patch(&self, ctx: &TenantContext, id: &str, data: Value) -> Result<Task> {
        self.admin.patch(ctx, id, data).await
    }

    async fn remove(&self, ctx: &TenantContext, id: &str) -> Result<Task> {
        let user = ctx
            .user()
            .ok_or_else(|| TenancyError::NotAuthenticated.into_anyhow())?;
        if !self.app.memberships().has_permission(user, ctx, DELETE_PERMISSION).await {
            tracing::warn!(user = %user, id, "task removal denied");
            return Err(TenancyError::forbidden(format!("missing permission {DELETE_PERMISSION}")).into_anyhow());
        }
        self.admin.remove(ctx, id).await
    }
}
