use std::sync::Arc;

use axum::http::HeaderMap;
use tenancy_core::{TenancyApp, UserId};

/// Maps request headers to an already-authenticated user.
pub type IdentityFn = Arc<dyn Fn(&HeaderMap) -> Option<UserId> + Send + Sync>;

/// Router state shared by the tenant middleware and the root console.
#[derive(Clone)]
pub struct TenancyState {
    pub app: TenancyApp,
    identity: Option<IdentityFn>,
}

impl TenancyState {
    pub fn new(app: TenancyApp) -> Self {
        Self { app, identity: None }
    }

    pub fn with_identity(mut self, identity: Option<IdentityFn>) -> Self {
        self.identity = identity;
        self
    }

    pub fn identify(&self, headers: &HeaderMap) -> Option<UserId> {
        self.identity.as_ref().and_then(|f| f(headers))
    }
}
