use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use tenancy_core::{TenancyError, TenantContext, UserId};

use crate::TenancyAxumError;

/// The request's tenant context, as published by
/// [`crate::middlewares::resolve_tenant`].
///
/// Outside the middleware this falls back to the task-local context, which is
/// "no tenant" unless something installed one.
#[derive(Debug, Clone)]
pub struct CurrentTenant(pub TenantContext);

impl<S> FromRequestParts<S> for CurrentTenant
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .unwrap_or_else(TenantContext::current);
        Ok(Self(ctx))
    }
}

/// The authenticated user. Rejects with `NotAuthenticated` when there is none.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserId);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = TenancyAxumError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .and_then(|ctx| ctx.user().cloned())
            .or_else(|| parts.extensions.get::<UserId>().cloned())
            .map(Self)
            .ok_or_else(|| TenancyError::NotAuthenticated.into())
    }
}
