//! # Errors (Feathers-style)
//!
//! Every failure the tenancy core can surface is a [`TenancyError`]. Like the
//! rest of the DogRS stack, errors travel through `anyhow::Error` so they can
//! pick up context on the way out, and transports recover the structured value
//! with [`TenancyError::from_anyhow`].
//!
//! Each variant maps onto an [`ErrorKind`], which carries the HTTP-ish status
//! code, the Feathers `name` and the kebab-cased `className`.

use anyhow::Error as AnyError;
use serde_json::{json, Value};
use thiserror::Error;

/// A convenience result type for tenancy core APIs.
pub type TenancyResult<T> = std::result::Result<T, AnyError>;

/// Feathers-ish error class names + status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,       // 400
    NotAuthenticated, // 401
    Forbidden,        // 403
    NotFound,         // 404
    MethodNotAllowed, // 405
    Conflict,         // 409
    Unprocessable,    // 422
    GeneralError,     // 500
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::NotAuthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::MethodNotAllowed => 405,
            ErrorKind::Conflict => 409,
            ErrorKind::Unprocessable => 422,
            ErrorKind::GeneralError => 500,
        }
    }

    /// Feathers error `name` (e.g. "NotFound")
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::NotAuthenticated => "NotAuthenticated",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::MethodNotAllowed => "MethodNotAllowed",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Unprocessable => "Unprocessable",
            ErrorKind::GeneralError => "GeneralError",
        }
    }

    /// Feathers error `className` (commonly kebab-cased)
    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::NotAuthenticated => "not-authenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not-found",
            ErrorKind::MethodNotAllowed => "method-not-allowed",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unprocessable => "unprocessable",
            ErrorKind::GeneralError => "general-error",
        }
    }
}

/// The tenancy error taxonomy.
#[derive(Debug, Error)]
pub enum TenancyError {
    /// Resolution failed: no active tenant matches the request.
    #[error("No tenant matches host {host:?} and path {path:?}")]
    TenantNotFound { host: Option<String>, path: String },

    /// Host routing needs a Host header; HTTP/1.1 clients always send one.
    #[error("No Host header detected. Tenant cannot be determined without one.")]
    MissingHost,

    /// A write with neither a resolved tenant nor an explicit reference.
    #[error("{kind} has no tenant reference and no tenant is resolved for this request")]
    MissingTenantReference { kind: &'static str },

    /// Two active tenants would match the same host or path.
    #[error("Routing key '{key}' is already in use by another tenant")]
    AmbiguousRouting { key: String },

    #[error("Invalid routing key '{key}': {reason}")]
    InvalidRoutingKey { key: String, reason: String },

    #[error("{kind} not found")]
    NotFound { kind: String },

    #[error("The tenant of a {kind} cannot be changed once assigned")]
    TenantReassignment { kind: &'static str },

    #[error("Tenant {tenant} still owns records: {}", .dependents.join(", "))]
    TenantInUse { tenant: String, dependents: Vec<String> },

    /// The tenant was deleted but some dependents could not purge its records.
    #[error("Tenant {tenant} was deleted but records of {} could not be purged", .failed.join(", "))]
    PartialPurge { tenant: String, failed: Vec<String> },

    #[error("{kind} already exists")]
    AlreadyExists { kind: String },

    #[error("{message}")]
    Validation { message: String, errors: Value },

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("Method not allowed: {method}")]
    MethodNotAllowed { method: String },

    /// Input the transport could not even parse.
    #[error("{message}")]
    BadRequest { message: String, errors: Value },
}

impl TenancyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TenancyError::TenantNotFound { .. } | TenancyError::NotFound { .. } => {
                ErrorKind::NotFound
            }
            TenancyError::MissingHost
            | TenancyError::MissingTenantReference { .. }
            | TenancyError::BadRequest { .. } => ErrorKind::BadRequest,
            TenancyError::AmbiguousRouting { .. }
            | TenancyError::TenantInUse { .. }
            | TenancyError::AlreadyExists { .. } => ErrorKind::Conflict,
            TenancyError::InvalidRoutingKey { .. } | TenancyError::Validation { .. } => {
                ErrorKind::Unprocessable
            }
            TenancyError::TenantReassignment { .. } | TenancyError::Forbidden { .. } => {
                ErrorKind::Forbidden
            }
            TenancyError::NotAuthenticated => ErrorKind::NotAuthenticated,
            TenancyError::MethodNotAllowed { .. } => ErrorKind::MethodNotAllowed,
            TenancyError::PartialPurge { .. } => ErrorKind::GeneralError,
        }
    }

    /// Stable machine-readable tag, independent of the HTTP mapping.
    pub fn reason(&self) -> &'static str {
        match self {
            TenancyError::TenantNotFound { .. } => "TenantNotFound",
            TenancyError::MissingHost => "MissingHost",
            TenancyError::MissingTenantReference { .. } => "MissingTenantReference",
            TenancyError::AmbiguousRouting { .. } => "AmbiguousRouting",
            TenancyError::InvalidRoutingKey { .. } => "InvalidRoutingKey",
            TenancyError::NotFound { .. } => "NotFound",
            TenancyError::TenantReassignment { .. } => "TenantReassignment",
            TenancyError::TenantInUse { .. } => "TenantInUse",
            TenancyError::AlreadyExists { .. } => "AlreadyExists",
            TenancyError::Validation { .. } => "Validation",
            TenancyError::NotAuthenticated => "NotAuthenticated",
            TenancyError::Forbidden { .. } => "Forbidden",
            TenancyError::MethodNotAllowed { .. } => "MethodNotAllowed",
            TenancyError::BadRequest { .. } => "BadRequest",
            TenancyError::PartialPurge { .. } => "PartialPurge",
        }
    }

    pub fn code(&self) -> u16 {
        self.kind().status_code()
    }

    pub fn not_found(kind: impl Into<String>) -> Self {
        TenancyError::NotFound { kind: kind.into() }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        TenancyError::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>, errors: Value) -> Self {
        TenancyError::BadRequest {
            message: message.into(),
            errors,
        }
    }

    pub fn validation(message: impl Into<String>, errors: Value) -> Self {
        TenancyError::Validation {
            message: message.into(),
            errors,
        }
    }

    /// Convert into `anyhow::Error` so it flows through `?` chains.
    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    /// Find a `TenancyError` anywhere in an `anyhow` chain.
    pub fn from_anyhow(err: &AnyError) -> Option<&TenancyError> {
        err.chain().find_map(|e| e.downcast_ref::<TenancyError>())
    }

    /// True when `err` carries this taxonomy entry.
    pub fn is(err: &AnyError, reason: &str) -> bool {
        Self::from_anyhow(err).is_some_and(|e| e.reason() == reason)
    }

    /// Feathers-ish JSON payload. Sources are never included.
    pub fn to_json(&self) -> Value {
        let kind = self.kind();
        let mut base = json!({
            "name": kind.name(),
            "message": self.to_string(),
            "code": kind.status_code(),
            "className": kind.class_name(),
            "data": { "reason": self.reason() },
        });

        if let TenancyError::Validation { errors, .. } | TenancyError::BadRequest { errors, .. } = self {
            base["errors"] = errors.clone();
        }
        base
    }
}

/// Payload for errors that are not part of the taxonomy.
pub fn general_error_json(message: impl Into<String>) -> Value {
    let kind = ErrorKind::GeneralError;
    json!({
        "name": kind.name(),
        "message": message.into(),
        "code": kind.status_code(),
        "className": kind.class_name(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_feathers_kinds() {
        let e = TenancyError::TenantNotFound {
            host: Some("unknown.example.org".into()),
            path: "/".into(),
        };
        assert_eq!(e.code(), 404);
        assert_eq!(e.kind().class_name(), "not-found");

        let e = TenancyError::MissingTenantReference { kind: "project" };
        assert_eq!(e.code(), 400);

        let e = TenancyError::AmbiguousRouting { key: "acme.example.org".into() };
        assert_eq!(e.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn found_through_anyhow_context() {
        let err = TenancyError::not_found("project")
            .into_anyhow()
            .context("loading project");
        let found = TenancyError::from_anyhow(&err).expect("must be TenancyError");
        assert_eq!(found.reason(), "NotFound");
        assert!(TenancyError::is(&err, "NotFound"));
    }

    #[test]
    fn validation_json_carries_field_errors() {
        let e = TenancyError::validation("Invalid", json!({"title": ["required"]}));
        let body = e.to_json();
        assert_eq!(body["name"], "Unprocessable");
        assert_eq!(body["code"], 422);
        assert_eq!(body["errors"]["title"][0], "required");
        assert_eq!(body["data"]["reason"], "Validation");
    }
}
