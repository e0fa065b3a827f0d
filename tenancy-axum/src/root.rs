//! The root-site console: tenant and membership management.
//!
//! Only reachable when the request resolved to the root site. Entry is gated
//! by the configured [`tenancy_core::RootAccess`] policy; everything except
//! listing tenants and the user's home site additionally needs a superadmin.

use std::collections::BTreeSet;

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tenancy_core::{Membership, NewTenant, TenancyError, Tenant, TenantId, UserId};

use crate::error::map_json_rejection;
use crate::extract::{CurrentTenant, CurrentUser};
use crate::{TenancyAxumError, TenancyState};

type ApiResult<T> = Result<T, TenancyAxumError>;

async fn require_root(
    State(state): State<TenancyState>,
    CurrentTenant(ctx): CurrentTenant,
    req: Request,
    next: Next,
) -> Response {
    if !ctx.is_root() {
        // Tenant sites have no console.
        return TenancyAxumError::from(TenancyError::not_found("page")).into_response();
    }
    let Some(user) = ctx.user() else {
        return TenancyAxumError::from(TenancyError::NotAuthenticated).into_response();
    };
    if !state.app.can_enter_root(user).await {
        tracing::warn!(user = %user, "root site access denied");
        return TenancyAxumError::from(TenancyError::forbidden("root site access requires a superadmin"))
            .into_response();
    }
    next.run(req).await
}

async fn require_superadmin(state: &TenancyState, user: &UserId) -> ApiResult<()> {
    if state.app.memberships().is_superadmin(user).await {
        Ok(())
    } else {
        tracing::warn!(user = %user, "tenant management denied");
        Err(TenancyError::forbidden("tenant management requires a superadmin").into())
    }
}

fn body<T>(data: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    data.map(|Json(v)| v).map_err(map_json_rejection)
}

/// Superadmins see every tenant; members see the tenants they belong to.
async fn list_tenants(
    State(state): State<TenancyState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<Tenant>>> {
    let all = state.app.registry().list();
    if state.app.memberships().is_superadmin(&user).await {
        return Ok(Json(all.iter().map(|t| Tenant::clone(t)).collect()));
    }
    let mine = state.app.memberships().tenants_for(&user).await;
    Ok(Json(
        all.iter()
            .filter(|t| mine.contains(&t.id))
            .map(|t| Tenant::clone(t))
            .collect(),
    ))
}

/// The user's home site: their only active membership, if exactly one.
async fn home(State(state): State<TenancyState>, CurrentUser(user): CurrentUser) -> ApiResult<Json<Value>> {
    let tenant = match state.app.memberships().implicit_tenant(&user).await {
        Some(id) => state.app.registry().get(&id).map(|t| Tenant::clone(&t)),
        None => None,
    };
    Ok(Json(json!({ "tenant": tenant })))
}

async fn create_tenant(
    State(state): State<TenancyState>,
    CurrentUser(user): CurrentUser,
    data: Result<Json<NewTenant>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Tenant>)> {
    require_superadmin(&state, &user).await?;
    let tenant = state.app.registry().create(body(data)?).await?;
    Ok((StatusCode::CREATED, Json(Tenant::clone(&tenant))))
}

async fn get_tenant(
    State(state): State<TenancyState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Tenant>> {
    require_superadmin(&state, &user).await?;
    let tenant = state.app.registry().require(&TenantId::new(id))?;
    Ok(Json(Tenant::clone(&tenant)))
}

async fn delete_tenant(
    State(state): State<TenancyState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Tenant>> {
    require_superadmin(&state, &user).await?;
    let tenant = state.app.delete_tenant(&TenantId::new(id)).await?;
    Ok(Json(Tenant::clone(&tenant)))
}

#[derive(Debug, Deserialize)]
struct AliasBody {
    domain: String,
}

async fn add_alias(
    State(state): State<TenancyState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    data: Result<Json<AliasBody>, JsonRejection>,
) -> ApiResult<Json<Tenant>> {
    require_superadmin(&state, &user).await?;
    let AliasBody { domain } = body(data)?;
    let tenant = state.app.registry().add_alias(&TenantId::new(id), &domain).await?;
    Ok(Json(Tenant::clone(&tenant)))
}

async fn remove_alias(
    State(state): State<TenancyState>,
    CurrentUser(user): CurrentUser,
    Path((id, domain)): Path<(String, String)>,
) -> ApiResult<Json<Tenant>> {
    require_superadmin(&state, &user).await?;
    let tenant = state.app.registry().remove_alias(&TenantId::new(id), &domain).await?;
    Ok(Json(Tenant::clone(&tenant)))
}

#[derive(Debug, Deserialize)]
struct PreferredBody {
    domain: Option<String>,
}

async fn set_preferred_domain(
    State(state): State<TenancyState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    data: Result<Json<PreferredBody>, JsonRejection>,
) -> ApiResult<Json<Tenant>> {
    require_superadmin(&state, &user).await?;
    let PreferredBody { domain } = body(data)?;
    let tenant = state
        .app
        .registry()
        .set_preferred_domain(&TenantId::new(id), domain.as_deref())
        .await?;
    Ok(Json(Tenant::clone(&tenant)))
}

#[derive(Debug, Deserialize)]
struct ActiveBody {
    is_active: bool,
}

async fn set_active(
    State(state): State<TenancyState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    data: Result<Json<ActiveBody>, JsonRejection>,
) -> ApiResult<Json<Tenant>> {
    require_superadmin(&state, &user).await?;
    let ActiveBody { is_active } = body(data)?;
    let tenant = state.app.registry().set_active(&TenantId::new(id), is_active).await?;
    Ok(Json(Tenant::clone(&tenant)))
}

async fn list_members(
    State(state): State<TenancyState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Membership>>> {
    require_superadmin(&state, &user).await?;
    let tenant = state.app.registry().require(&TenantId::new(id))?;
    Ok(Json(state.app.memberships().members_of(&tenant.id).await))
}

#[derive(Debug, Deserialize)]
struct MemberBody {
    user: UserId,
    #[serde(default)]
    is_staff: bool,
    #[serde(default)]
    permissions: BTreeSet<String>,
}

async fn add_member(
    State(state): State<TenancyState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    data: Result<Json<MemberBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Membership>)> {
    require_superadmin(&state, &user).await?;
    let tenant = state.app.registry().require(&TenantId::new(id))?;
    let member = body(data)?;

    let memberships = state.app.memberships();
    memberships.add(&member.user, &tenant.id).await;
    let mut membership = memberships.set_staff(&member.user, &tenant.id, member.is_staff).await?;
    for perm in &member.permissions {
        membership = memberships.grant(&member.user, &tenant.id, perm).await?;
    }
    tracing::info!(tenant = %tenant.id, user = %member.user, "member added");
    Ok((StatusCode::CREATED, Json(membership)))
}

async fn remove_member(
    State(state): State<TenancyState>,
    CurrentUser(user): CurrentUser,
    Path((id, member)): Path<(String, String)>,
) -> ApiResult<Json<Membership>> {
    require_superadmin(&state, &user).await?;
    let membership = state
        .app
        .memberships()
        .remove(&UserId::new(member), &TenantId::new(id))
        .await?;
    Ok(Json(membership))
}

pub fn root_router(state: TenancyState) -> Router<()> {
    Router::new()
        .route("/home", get(home))
        .route("/tenants", get(list_tenants).post(create_tenant))
        .route("/tenants/{id}", get(get_tenant).delete(delete_tenant))
        .route("/tenants/{id}/aliases", post(add_alias))
        .route("/tenants/{id}/aliases/{domain}", delete(remove_alias))
        .route("/tenants/{id}/preferred_domain", put(set_preferred_domain))
        .route("/tenants/{id}/active", put(set_active))
        .route("/tenants/{id}/members", get(list_members).post(add_member))
        .route("/tenants/{id}/members/{user}", delete(remove_member))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_root))
        .with_state(state)
}
