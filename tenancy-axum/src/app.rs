use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request};
use axum::response::Response;
use axum::{middleware, Router};
use serde::Serialize;
use tenancy_core::{AdminService, TenancyApp, UserId};
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::util::BoxCloneService;
use tower::{Layer, ServiceBuilder};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::middlewares::{require_tenant_admin, resolve_tenant};
use crate::rest;
use crate::root::root_router;
use crate::state::IdentityFn;
use crate::TenancyState;

/// The HTTP service every request goes through.
pub type TenancyService = BoxCloneService<Request<Body>, Response, Infallible>;

/// An axum application whose requests are resolved to tenants before they
/// reach any route.
pub struct TenancyAxum {
    pub app: TenancyApp,
    pub router: Router<()>,
    identity: Option<IdentityFn>,
}

impl TenancyAxum {
    pub fn new(app: TenancyApp) -> Self {
        Self {
            app,
            router: Router::new(),
            identity: None,
        }
    }

    /// Where the user comes from when no upstream layer set a [`UserId`]
    /// extension, e.g. a header set by a trusted authenticating proxy.
    pub fn use_identity<F>(mut self, identity: F) -> Self
    where
        F: Fn(&HeaderMap) -> Option<UserId> + Send + Sync + 'static,
    {
        self.identity = Some(Arc::new(identity));
        self
    }

    pub fn use_router(mut self, path: &str, router: Router<()>) -> Self {
        self.router = self.router.nest(path, router);
        self
    }

    /// Like [`TenancyAxum::use_router`], but every route answers only to
    /// users allowed to administer the request's tenant.
    pub fn use_tenant_router(mut self, path: &str, router: Router<()>) -> Self {
        let gate = middleware::from_fn_with_state(TenancyState::new(self.app.clone()), require_tenant_admin);
        self.router = self.router.nest(path, router.route_layer(gate));
        self
    }

    /// Mount an admin service's REST routes under `path` (e.g. `/projects`),
    /// behind the tenant admin gate.
    pub fn use_admin<R>(self, path: &str, service: Arc<dyn AdminService<R>>) -> Self
    where
        R: Serialize + Send + Sync + 'static,
    {
        tracing::debug!(path, methods = ?service.capabilities().allowed_methods, "admin service mounted");
        self.use_tenant_router(path, rest::admin_router(service))
    }

    /// Mount the root-site console (`/tenants/...`).
    pub fn use_root_console(mut self) -> Self {
        let console = root_router(TenancyState::new(self.app.clone()));
        self.router = self.router.merge(console);
        self
    }

    /// Assemble the service: request id, then tenant resolution (which may
    /// rewrite the path), then tracing and routing.
    pub fn into_service(self) -> TenancyService {
        let state = TenancyState::new(self.app).with_identity(self.identity);
        let routed = self.router.layer(TraceLayer::new_for_http());
        let resolved = middleware::from_fn_with_state(state, resolve_tenant).layer(routed);

        let service = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(PropagateRequestIdLayer::x_request_id())
            .service(resolved);
        BoxCloneService::new(service)
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "listening");
        let service = self.into_service();
        axum::serve(
            listener,
            axum::ServiceExt::<Request<Body>>::into_make_service(service),
        )
        .await?;
        Ok(())
    }
}

pub fn tenancy(app: TenancyApp) -> TenancyAxum {
    TenancyAxum::new(app)
}
