//! Request → tenant resolution.
//!
//! [`resolve`] is a pure function of a registry snapshot, the routing
//! configuration and the request's host/path. It never mutates anything, so
//! the same inputs always produce the same [`Resolution`].

use std::sync::Arc;

use anyhow::Result;

use crate::config::{RoutingConfig, RoutingMode};
use crate::errors::TenancyError;
use crate::registry::RegistrySnapshot;
use crate::tenant::{normalize_host, Tenant};

/// The parts of an inbound request the resolver looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMeta {
    pub host: Option<String>,
    pub path: String,
}

impl RequestMeta {
    pub fn new(host: Option<&str>, path: impl Into<String>) -> Self {
        Self {
            host: host.map(str::to_string),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Domain,
    Alias,
    Path,
    Root,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    /// `None` for the root site.
    pub tenant: Option<Arc<Tenant>>,
    pub matched: MatchKind,
    /// Path with the tenant prefix stripped (path mode), otherwise unchanged.
    /// Always starts with `/`.
    pub residual_path: String,
}

pub fn resolve(
    snapshot: &RegistrySnapshot,
    routing: &RoutingConfig,
    request: &RequestMeta,
) -> Result<Resolution> {
    match routing.mode {
        RoutingMode::Host => resolve_host(snapshot, routing, request),
        RoutingMode::Path => resolve_path(snapshot, routing, request),
    }
}

fn not_found(request: &RequestMeta) -> anyhow::Error {
    TenancyError::TenantNotFound {
        host: request.host.clone(),
        path: request.path.clone(),
    }
    .into_anyhow()
}

fn rooted(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn resolve_host(
    snapshot: &RegistrySnapshot,
    routing: &RoutingConfig,
    request: &RequestMeta,
) -> Result<Resolution> {
    let host = request
        .host
        .as_deref()
        .map(normalize_host)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| TenancyError::MissingHost.into_anyhow())?;
    let residual_path = rooted(&request.path);

    if host == routing.base_domain {
        return Ok(Resolution {
            tenant: None,
            matched: MatchKind::Root,
            residual_path,
        });
    }

    if let Some(t) = snapshot.active().find(|t| t.domain.as_deref() == Some(host.as_str())) {
        return Ok(Resolution {
            tenant: Some(Arc::clone(t)),
            matched: MatchKind::Domain,
            residual_path,
        });
    }

    if let Some(t) = snapshot.active().find(|t| t.has_alias(&host)) {
        return Ok(Resolution {
            tenant: Some(Arc::clone(t)),
            matched: MatchKind::Alias,
            residual_path,
        });
    }

    Err(not_found(request))
}

fn resolve_path(
    snapshot: &RegistrySnapshot,
    routing: &RoutingConfig,
    request: &RequestMeta,
) -> Result<Resolution> {
    let trimmed = request.path.trim_start_matches('/');
    let (segment, rest) = match trimmed.find('/') {
        Some(i) => (&trimmed[..i], &trimmed[i..]),
        None => (trimmed, ""),
    };
    let residual_path = rooted(rest);

    if segment == routing.root_path {
        return Ok(Resolution {
            tenant: None,
            matched: MatchKind::Root,
            residual_path,
        });
    }

    if segment.is_empty() {
        return Err(not_found(request));
    }

    snapshot
        .active()
        .find(|t| t.path_key.as_deref() == Some(segment))
        .map(|t| Resolution {
            tenant: Some(Arc::clone(t)),
            matched: MatchKind::Path,
            residual_path,
        })
        .ok_or_else(|| not_found(request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TenantRegistry;
    use crate::tenant::NewTenant;

    async fn host_registry() -> (TenantRegistry, RoutingConfig) {
        let routing = RoutingConfig::host("example.org");
        let reg = TenantRegistry::new(&routing);
        reg.create(NewTenant::with_domain("Acme", "acme.example.org").alias("acme.test"))
            .await
            .unwrap();
        reg.create_site("beta.example.org", "Beta").await.unwrap();
        reg.create(NewTenant::with_domain("Gone", "gone.example.org").inactive())
            .await
            .unwrap();
        (reg, routing)
    }

    fn tenant_name(res: &Resolution) -> Option<&str> {
        res.tenant.as_deref().map(|t| t.name.as_str())
    }

    #[tokio::test]
    async fn host_mode_matches_domains_and_aliases() {
        let (reg, routing) = host_registry().await;
        let snap = reg.snapshot();

        let res = resolve(&snap, &routing, &RequestMeta::new(Some("acme.example.org"), "/items")).unwrap();
        assert_eq!(tenant_name(&res), Some("Acme"));
        assert_eq!(res.matched, MatchKind::Domain);
        assert_eq!(res.residual_path, "/items");

        let res = resolve(&snap, &routing, &RequestMeta::new(Some("Beta.Example.org:8080"), "/")).unwrap();
        assert_eq!(tenant_name(&res), Some("Beta"));

        let res = resolve(&snap, &routing, &RequestMeta::new(Some("ACME.test"), "/")).unwrap();
        assert_eq!(tenant_name(&res), Some("Acme"));
        assert_eq!(res.matched, MatchKind::Alias);
    }

    #[tokio::test]
    async fn host_mode_failures() {
        let (reg, routing) = host_registry().await;
        let snap = reg.snapshot();

        let err = resolve(&snap, &routing, &RequestMeta::new(Some("unknown.example.org"), "/")).unwrap_err();
        assert!(TenancyError::is(&err, "TenantNotFound"));

        let err = resolve(&snap, &routing, &RequestMeta::new(Some("gone.example.org"), "/")).unwrap_err();
        assert!(TenancyError::is(&err, "TenantNotFound"));

        let err = resolve(&snap, &routing, &RequestMeta::new(None, "/")).unwrap_err();
        assert!(TenancyError::is(&err, "MissingHost"));
        let err = resolve(&snap, &routing, &RequestMeta::new(Some("  "), "/")).unwrap_err();
        assert!(TenancyError::is(&err, "MissingHost"));
    }

    #[tokio::test]
    async fn base_domain_is_root_site() {
        let (reg, routing) = host_registry().await;
        let res = resolve(&reg.snapshot(), &routing, &RequestMeta::new(Some("example.org:3000"), "/tenants")).unwrap();
        assert!(res.tenant.is_none());
        assert_eq!(res.matched, MatchKind::Root);
        assert_eq!(res.residual_path, "/tenants");
    }

    #[tokio::test]
    async fn path_mode_strips_prefix() {
        let routing = RoutingConfig::path("root");
        let reg = TenantRegistry::new(&routing);
        reg.create_path_site("acme", "Acme").await.unwrap();
        let snap = reg.snapshot();

        let res = resolve(&snap, &routing, &RequestMeta::new(Some("anything"), "/acme/items/5")).unwrap();
        assert_eq!(tenant_name(&res), Some("Acme"));
        assert_eq!(res.matched, MatchKind::Path);
        assert_eq!(res.residual_path, "/items/5");

        let res = resolve(&snap, &routing, &RequestMeta::new(None, "/acme")).unwrap();
        assert_eq!(res.residual_path, "/");

        let res = resolve(&snap, &routing, &RequestMeta::new(None, "/root/tenants")).unwrap();
        assert!(res.tenant.is_none());
        assert_eq!(res.residual_path, "/tenants");

        let err = resolve(&snap, &routing, &RequestMeta::new(None, "/other/items")).unwrap_err();
        assert!(TenancyError::is(&err, "TenantNotFound"));
        let err = resolve(&snap, &routing, &RequestMeta::new(None, "/")).unwrap_err();
        assert!(TenancyError::is(&err, "TenantNotFound"));
        // Prefix match is per segment, not per character.
        let err = resolve(&snap, &routing, &RequestMeta::new(None, "/acmeish/items")).unwrap_err();
        assert!(TenancyError::is(&err, "TenantNotFound"));
    }

    #[tokio::test]
    async fn resolution_is_deterministic() {
        let (reg, routing) = host_registry().await;
        let snap = reg.snapshot();
        let req = RequestMeta::new(Some("acme.test"), "/x");
        let first = resolve(&snap, &routing, &req).unwrap();
        for _ in 0..5 {
            let again = resolve(&snap, &routing, &req).unwrap();
            assert_eq!(again.tenant.as_ref().map(|t| &t.id), first.tenant.as_ref().map(|t| &t.id));
            assert_eq!(again.matched, first.matched);
        }
    }
}
