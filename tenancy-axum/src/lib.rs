//! tenancy-axum: Axum adapter for DogRS multitenancy.
//!
//! Wraps a router with tenant resolution (host or path), publishes the
//! resolved [`tenancy_core::TenantContext`] to handlers, and mounts scoped
//! admin services and the root-site console as JSON REST routes.

pub mod app;
pub mod extract;
pub mod middlewares;
pub mod rest;
pub mod root;
pub mod state;
mod error;

pub use app::{tenancy, TenancyAxum, TenancyService};
pub use error::TenancyAxumError;
pub use extract::{CurrentTenant, CurrentUser};
pub use state::TenancyState;

pub use axum;
