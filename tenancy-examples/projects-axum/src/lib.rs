mod app;
mod services;

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tenancy_axum::axum::{routing::get, Json, Router};
use tenancy_axum::rest::admin_router;
use tenancy_axum::{CurrentTenant, TenancyAxum, TenancyAxumError};
use tenancy_core::{AdminService, NewTenant, TenancyApp, TenantContext, UserId};

pub use app::USER_HEADER;
pub use services::{Project, Settings, Task};

async fn whoami(CurrentTenant(ctx): CurrentTenant) -> Json<serde_json::Value> {
    // Same context, read from the task-local instead of the extractor.
    let current = TenantContext::current();
    Json(json!({
        "tenant": ctx.tenant().map(|t| t.name.clone()),
        "tenant_id": ctx.tenant_id(),
        "user": ctx.user(),
        "root": ctx.is_root(),
        "task_local_tenant_id": current.tenant_id(),
    }))
}

pub fn build() -> Result<TenancyAxum> {
    let ax = app::projects_app()?;
    let svcs = services::configure(&ax.app);

    let settings = Arc::clone(&svcs.settings);
    let settings_dyn: Arc<dyn AdminService<Settings>> = svcs.settings;
    let settings_routes = admin_router(settings_dyn).route(
        "/current",
        get(move |CurrentTenant(ctx): CurrentTenant| {
            let settings = Arc::clone(&settings);
            async move {
                settings
                    .current(&ctx)
                    .await
                    .map(Json)
                    .map_err(TenancyAxumError::from)
            }
        }),
    );

    let health = Router::new().route("/", get(|| async { "ok" }));
    let me = Router::new().route("/", get(whoami));

    Ok(ax
        .use_admin("/projects", svcs.projects)
        .use_admin("/tasks", svcs.tasks)
        .use_tenant_router("/settings", settings_routes)
        .use_router("/health", health)
        .use_router("/whoami", me)
        .use_root_console())
}

/// Two tenants and a few users so the demo is usable straight away.
///
/// `admin` is a superadmin, `alice` is acme staff allowed to delete tasks,
/// `bob` is a plain acme member and `carol` a plain globex member.
pub async fn seed_demo(app: &TenancyApp) -> Result<()> {
    let registry = app.registry();
    let acme = registry
        .create(NewTenant::with_domain("Acme", "acme.localhost").path_key("acme"))
        .await?;
    let globex = registry
        .create(NewTenant::with_domain("Globex", "globex.localhost").path_key("globex"))
        .await?;

    let memberships = app.memberships();
    memberships.grant_superadmin(&UserId::new("admin")).await;

    let alice = UserId::new("alice");
    memberships.add(&alice, &acme.id).await;
    memberships.set_staff(&alice, &acme.id, true).await?;
    memberships.grant(&alice, &acme.id, "tasks.delete").await?;

    memberships.add(&UserId::new("bob"), &acme.id).await;
    memberships.add(&UserId::new("carol"), &globex.id).await;

    tracing::info!(tenants = registry.list().len(), "demo data seeded");
    Ok(())
}
