use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query},
    http::{Method, StatusCode},
    routing::MethodRouter,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tenancy_core::{AdminMethod, AdminService, Criteria, TenancyError};

use crate::error::map_json_rejection;
use crate::extract::CurrentTenant;
use crate::TenancyAxumError;

async fn method_not_allowed(method: Method) -> TenancyAxumError {
    TenancyError::MethodNotAllowed {
        method: method.to_string(),
    }
    .into()
}

/// JSON REST routes for one admin service, mounted per its capabilities:
/// `GET/POST /` and `GET/PUT/PATCH/DELETE /{id}`.
///
/// Every handler passes the request's [`CurrentTenant`] to the service, so
/// what a request can see and change is decided by its resolved tenant.
/// Query keys on the listing become equality criteria; `tenant_id` is never
/// honoured.
pub fn admin_router<R>(service: Arc<dyn AdminService<R>>) -> Router<()>
where
    R: Serialize + Send + Sync + 'static,
{
    let caps = service.capabilities();

    let mut collection = MethodRouter::new();
    if caps.allows(AdminMethod::Find) {
        let service = Arc::clone(&service);
        collection = collection.get(
            move |CurrentTenant(ctx): CurrentTenant, Query(query): Query<HashMap<String, String>>| async move {
                let res = service.find(&ctx, Criteria::from_query(&query)).await?;
                Ok::<_, TenancyAxumError>(Json(res))
            },
        );
    }
    if caps.allows(AdminMethod::Create) {
        let service = Arc::clone(&service);
        collection = collection.post(
            move |CurrentTenant(ctx): CurrentTenant,
                  data: Result<Json<Value>, JsonRejection>| async move {
                let Json(data) = data.map_err(map_json_rejection)?;
                let res = service.create(&ctx, data).await?;
                Ok::<_, TenancyAxumError>((StatusCode::CREATED, Json(res)))
            },
        );
    }

    let mut item = MethodRouter::new();
    if caps.allows(AdminMethod::Get) {
        let service = Arc::clone(&service);
        item = item.get(
            move |CurrentTenant(ctx): CurrentTenant, Path(id): Path<String>| async move {
                let res = service.get(&ctx, &id).await?;
                Ok::<_, TenancyAxumError>(Json(res))
            },
        );
    }
    if caps.allows(AdminMethod::Update) {
        let service = Arc::clone(&service);
        item = item.put(
            move |CurrentTenant(ctx): CurrentTenant,
                  Path(id): Path<String>,
                  data: Result<Json<Value>, JsonRejection>| async move {
                let Json(data) = data.map_err(map_json_rejection)?;
                let res = service.update(&ctx, &id, data).await?;
                Ok::<_, TenancyAxumError>(Json(res))
            },
        );
    }
    if caps.allows(AdminMethod::Patch) {
        let service = Arc::clone(&service);
        item = item.patch(
            move |CurrentTenant(ctx): CurrentTenant,
                  Path(id): Path<String>,
                  data: Result<Json<Value>, JsonRejection>| async move {
                let Json(data) = data.map_err(map_json_rejection)?;
                let res = service.patch(&ctx, &id, data).await?;
                Ok::<_, TenancyAxumError>(Json(res))
            },
        );
    }
    if caps.allows(AdminMethod::Remove) {
        let service = Arc::clone(&service);
        item = item.delete(
            move |CurrentTenant(ctx): CurrentTenant, Path(id): Path<String>| async move {
                let res = service.remove(&ctx, &id).await?;
                Ok::<_, TenancyAxumError>(Json(res))
            },
        );
    }

    Router::new()
        .route("/", collection.fallback(method_not_allowed))
        .route("/{id}", item.fallback(method_not_allowed))
}
