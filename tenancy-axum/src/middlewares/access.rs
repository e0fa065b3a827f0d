//! Access gate for tenant admin routes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::extract::CurrentTenant;
use crate::{TenancyAxumError, TenancyState};

/// Lets the request through only when its user may administer the resolved
/// tenant under the configured `admin.access` policy. Superadmins pass
/// everywhere; anonymous requests get 401, everyone else 403.
pub async fn require_tenant_admin(
    State(state): State<TenancyState>,
    CurrentTenant(ctx): CurrentTenant,
    req: Request,
    next: Next,
) -> Response {
    match state.app.authorize_tenant_admin(&ctx).await {
        Ok(()) => next.run(req).await,
        Err(err) => TenancyAxumError(err).into_response(),
    }
}
