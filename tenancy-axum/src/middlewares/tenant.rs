//! Tenant resolution for every inbound request.
//!
//! [`resolve_tenant`] must wrap the whole router, not be added with
//! `Router::layer`: in path mode it rewrites the URI to the residual path, and
//! that has to happen before routing.

use axum::{
    extract::{Request, State},
    http::{
        header::{HOST, LOCATION},
        uri::PathAndQuery,
        StatusCode, Uri,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tenancy_core::{
    normalize_host, MatchKind, RequestMeta, Resolution, RoutingConfig, RoutingMode, TenancyError, TenantContext,
    UserId,
};

use crate::{TenancyAxumError, TenancyState};

fn request_host(req: &Request) -> Option<String> {
    req.headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.as_str().to_string()))
}

fn with_path(uri: &Uri, path: &str) -> Result<Uri, TenancyAxumError> {
    let path_and_query = match uri.query() {
        Some(q) => format!("{path}?{q}"),
        None => path.to_string(),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).map_err(|e| {
        TenancyError::bad_request("Invalid request path", json!({"_schema": [e.to_string()]}))
    })?);
    Uri::from_parts(parts).map_err(|e| {
        TenancyError::bad_request("Invalid request path", json!({"_schema": [e.to_string()]})).into()
    })
}

/// Where to send a request that reached a tenant on a host other than its
/// public domain, when alias redirects are on.
fn preferred_location(routing: &RoutingConfig, resolution: &Resolution, host: Option<&str>, uri: &Uri) -> Option<String> {
    if routing.mode != RoutingMode::Host || !routing.redirect_aliases {
        return None;
    }
    if !matches!(resolution.matched, MatchKind::Domain | MatchKind::Alias) {
        return None;
    }
    let public = resolution.tenant.as_ref()?.public_domain()?;
    if normalize_host(host?).eq_ignore_ascii_case(public) {
        return None;
    }
    let path_and_query = uri.path_and_query().map_or("/", PathAndQuery::as_str);
    Some(format!("https://{public}{path_and_query}"))
}

/// Resolve the tenant, publish the context and run the rest of the stack
/// inside its scope.
///
/// The user is taken from a [`UserId`] an upstream authentication layer put
/// in the request extensions, else from the configured identity source.
pub async fn resolve_tenant(
    State(state): State<TenancyState>,
    mut req: Request,
    next: Next,
) -> Response {
    let meta = RequestMeta {
        host: request_host(&req),
        path: req.uri().path().to_string(),
    };

    let resolution = match state.app.resolve(&meta) {
        Ok(resolution) => resolution,
        Err(err) => {
            tracing::warn!(
                host = meta.host.as_deref().unwrap_or(""),
                path = %meta.path,
                error = %err,
                "tenant resolution failed"
            );
            return TenancyAxumError(err).into_response();
        }
    };

    if let Some(location) = preferred_location(state.app.routing(), &resolution, meta.host.as_deref(), req.uri()) {
        tracing::debug!(host = meta.host.as_deref().unwrap_or(""), %location, "redirecting to preferred domain");
        return (StatusCode::FOUND, [(LOCATION, location)]).into_response();
    }

    if state.app.routing().mode == RoutingMode::Path {
        match with_path(req.uri(), &resolution.residual_path) {
            Ok(uri) => *req.uri_mut() = uri,
            Err(err) => return err.into_response(),
        }
    }

    let mut ctx = match resolution.tenant {
        Some(tenant) => TenantContext::for_tenant(tenant),
        None => TenantContext::none(),
    };
    let user = req
        .extensions()
        .get::<UserId>()
        .cloned()
        .or_else(|| state.identify(req.headers()));
    if let Some(user) = user {
        req.extensions_mut().insert(user.clone());
        ctx = ctx.with_user(user);
    }

    req.extensions_mut().insert(ctx.clone());
    ctx.scope(next.run(req)).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tenancy_core::{Tenant, TenantId};

    use super::*;

    fn resolved(matched: MatchKind, preferred: Option<&str>) -> Resolution {
        let now = chrono::Utc::now();
        Resolution {
            tenant: Some(Arc::new(Tenant {
                id: TenantId::new("acme"),
                name: "Acme".into(),
                domain: Some("acme.example.org".into()),
                path_key: None,
                aliases: vec!["www.acme.test".into()],
                preferred_domain: preferred.map(str::to_string),
                is_active: true,
                created_at: now,
                updated_at: now,
                liveness: Default::default(),
            })),
            matched,
            residual_path: "/".into(),
        }
    }

    fn redirecting() -> RoutingConfig {
        RoutingConfig {
            redirect_aliases: true,
            ..RoutingConfig::default()
        }
    }

    #[test]
    fn alias_hosts_go_to_the_public_domain() {
        let uri: Uri = "/items?x=1".parse().unwrap();
        let res = resolved(MatchKind::Alias, None);
        assert_eq!(
            preferred_location(&redirecting(), &res, Some("www.acme.test:8080"), &uri).as_deref(),
            Some("https://acme.example.org/items?x=1")
        );
        assert_eq!(preferred_location(&RoutingConfig::default(), &res, Some("www.acme.test"), &uri), None);

        let res = resolved(MatchKind::Domain, None);
        assert_eq!(preferred_location(&redirecting(), &res, Some("ACME.example.org"), &uri), None);
    }

    #[test]
    fn path_mode_never_redirects() {
        let routing = RoutingConfig {
            mode: RoutingMode::Path,
            ..redirecting()
        };
        let uri: Uri = "/acme/items".parse().unwrap();
        let res = resolved(MatchKind::Path, Some("www.acme.test"));
        assert_eq!(preferred_location(&routing, &res, Some("localhost"), &uri), None);
    }

    #[test]
    fn path_rewrite_keeps_query() {
        let uri: Uri = "/acme/items/5?expand=tasks".parse().unwrap();
        let rewritten = with_path(&uri, "/items/5").unwrap();
        assert_eq!(rewritten.path(), "/items/5");
        assert_eq!(rewritten.query(), Some("expand=tasks"));
    }
}
