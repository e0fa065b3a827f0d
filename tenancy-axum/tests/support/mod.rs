#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tenancy_axum::{tenancy, TenancyService};
use tenancy_core::{
    AdminService, ScopedAdmin, ScopedRepository, TenancyApp, TenancyConfig, TenantId, TenantOwned, UserId,
};
use tower::ServiceExt;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Item {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
}

impl TenantOwned for Item {
    const KIND: &'static str = "item";

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

pub struct Fixture {
    pub app: TenancyApp,
    pub items: ScopedRepository<Item>,
    pub service: TenancyService,
    /// Member of Acme only.
    pub ann: UserId,
    /// Member of Beta only.
    pub ben: UserId,
    /// Superadmin.
    pub root: UserId,
}

/// `acme` and `beta` tenants with an `/items` admin service and the root
/// console, routed by `mode` (`host` or `path`).
pub async fn fixture(mode: &str) -> Fixture {
    fixture_with(mode, &[]).await
}

pub async fn fixture_with(mode: &str, extra: &[(&str, &str)]) -> Fixture {
    let mut config = TenancyConfig::new();
    config.set("routing.mode", mode);
    config.set("routing.base_domain", "example.org");
    for (key, value) in extra {
        config.set(*key, *value);
    }
    let app = TenancyApp::new(config).unwrap();

    let acme = app
        .registry()
        .create(
            tenancy_core::NewTenant::with_domain("Acme", "acme.example.org")
                .alias("www.acme.test")
                .path_key("acme"),
        )
        .await
        .unwrap();
    let beta = app
        .registry()
        .create(tenancy_core::NewTenant::with_domain("Beta", "beta.example.org").path_key("beta"))
        .await
        .unwrap();

    let (ann, ben) = (UserId::new("ann"), UserId::new("ben"));
    app.memberships().add(&ann, &acme.id).await;
    app.memberships().add(&ben, &beta.id).await;
    let root = superadmin(&app, "root").await;

    let items = ScopedRepository::<Item>::in_memory();
    app.register_dependent(Arc::new(items.clone()));

    let admin: Arc<dyn AdminService<Item>> = Arc::new(ScopedAdmin::new(items.clone()));
    let service = tenancy(app.clone())
        .use_admin("/items", admin)
        .use_root_console()
        .into_service();

    Fixture {
        app,
        items,
        service,
        ann,
        ben,
        root,
    }
}

pub async fn superadmin(app: &TenancyApp, name: &str) -> UserId {
    let user = UserId::new(name);
    app.memberships().grant_superadmin(&user).await;
    user
}

pub async fn send(service: &TenancyService, req: Request<Body>) -> (u16, Value) {
    let res = service.clone().oneshot(req).await.unwrap();
    let status = res.status().as_u16();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub fn get(host: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("host", host)
        .body(Body::empty())
        .unwrap()
}

pub fn json(method: &str, host: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("host", host)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn as_user(mut req: Request<Body>, user: &UserId) -> Request<Body> {
    req.extensions_mut().insert(user.clone());
    req
}
