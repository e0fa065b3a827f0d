//! Core multi-tenant types.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

use crate::errors::{TenancyError, TenancyResult};

/// A tenant identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A registered tenant.
///
/// `domain` is the host-routing key and `path_key` the path-routing key; a
/// tenant may carry both so it can be served under either routing mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub domain: Option<String>,
    pub path_key: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub preferred_domain: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Shared by every version of the tenant the registry publishes.
    #[serde(skip)]
    pub liveness: TenantLiveness,
}

/// Whether a tenant may still receive writes.
///
/// Writers hold a [`TenantLease`] while they store a record; deletion holds
/// the exclusive side while it checks or purges dependents, and retires the
/// tenant before releasing it. A writer that was waiting then sees the
/// tenant is gone instead of storing an orphan.
#[derive(Debug, Clone)]
pub struct TenantLiveness(Arc<RwLock<bool>>);

/// Held by a writer for as long as its record is being stored.
pub type TenantLease = OwnedRwLockReadGuard<bool>;

impl Default for TenantLiveness {
    fn default() -> Self {
        Self(Arc::new(RwLock::new(true)))
    }
}

impl TenantLiveness {
    /// `None` once the tenant has been deleted.
    pub async fn lease(&self) -> Option<TenantLease> {
        let guard = Arc::clone(&self.0).read_owned().await;
        if *guard {
            Some(guard)
        } else {
            None
        }
    }

    /// Wait out in-flight writers and block new ones. Set the guarded value
    /// to `false` to retire the tenant; dropping it untouched reopens it.
    pub async fn exclusive(&self) -> OwnedRwLockWriteGuard<bool> {
        Arc::clone(&self.0).write_owned().await
    }

    pub async fn is_live(&self) -> bool {
        *self.0.read().await
    }
}

// Liveness is runtime state, not part of the tenant's value.
impl PartialEq for TenantLiveness {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for TenantLiveness {}

impl Tenant {
    /// The domain people should use for this tenant: the preferred alias if
    /// one is set, otherwise the canonical domain.
    pub fn public_domain(&self) -> Option<&str> {
        self.preferred_domain
            .as_deref()
            .or(self.domain.as_deref())
    }

    /// Canonical domain followed by aliases.
    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.domain
            .as_deref()
            .into_iter()
            .chain(self.aliases.iter().map(|a| a.as_str()))
    }

    pub fn has_alias(&self, domain: &str) -> bool {
        self.aliases.iter().any(|a| a == domain)
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.public_domain(), self.path_key.as_deref()) {
            (Some(domain), _) => f.write_str(domain),
            (None, Some(key)) => write!(f, "/{key}"),
            (None, None) => f.write_str(&self.name),
        }
    }
}

/// Input for [`crate::TenantRegistry::create`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTenant {
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path_key: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl NewTenant {
    /// A host-routed tenant.
    pub fn with_domain(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: Some(domain.into()),
            is_active: true,
            ..Self::default()
        }
    }

    /// A path-routed tenant.
    pub fn with_path_key(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path_key: Some(key.into()),
            is_active: true,
            ..Self::default()
        }
    }

    pub fn alias(mut self, domain: impl Into<String>) -> Self {
        self.aliases.push(domain.into());
        self
    }

    pub fn path_key(mut self, key: impl Into<String>) -> Self {
        self.path_key = Some(key.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Lowercase, strip the port and any trailing dot.
///
/// Handles bracketed IPv6 literals (`[::1]:8080` → `[::1]`).
pub fn normalize_host(raw: &str) -> String {
    let host = raw.trim();
    let host = if host.starts_with('[') {
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host,
        }
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Validate and normalize a hostname used as a domain or alias.
pub fn validate_domain(raw: &str) -> TenancyResult<String> {
    let domain = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    let invalid = |reason: &str| {
        TenancyError::InvalidRoutingKey {
            key: raw.to_string(),
            reason: reason.to_string(),
        }
        .into_anyhow()
    };

    if domain.is_empty() {
        return Err(invalid("domain must not be empty"));
    }
    if domain.len() > 253 {
        return Err(invalid("domain is longer than 253 characters"));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(invalid("Please enter a valid domain name, e.g. example.com."));
    }
    for label in labels {
        let valid = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(invalid("Please enter a valid domain name, e.g. example.com."));
        }
    }

    Ok(domain)
}

/// Validate a path-routing key (a single path segment).
pub fn validate_path_key(raw: &str) -> TenancyResult<String> {
    let key = raw.trim().trim_matches('/').to_string();
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !valid {
        return Err(TenancyError::InvalidRoutingKey {
            key: raw.to_string(),
            reason: "path key must be one segment of [a-z0-9-_]".to_string(),
        }
        .into_anyhow());
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_port_case_and_trailing_dot() {
        assert_eq!(normalize_host("Beta.Example.ORG:8443"), "beta.example.org");
        assert_eq!(normalize_host("acme.example.org."), "acme.example.org");
        assert_eq!(normalize_host("[::1]:8080"), "[::1]");
        assert_eq!(normalize_host("localhost"), "localhost");
    }

    #[test]
    fn domain_validation() {
        assert_eq!(validate_domain("Acme.Example.org").unwrap(), "acme.example.org");
        assert!(validate_domain("localhost").is_err());
        assert!(validate_domain("-bad.example.org").is_err());
        assert!(validate_domain("under_score.example.org").is_err());
        assert!(validate_domain("a..b").is_err());
    }

    #[test]
    fn path_key_validation() {
        assert_eq!(validate_path_key("/acme/").unwrap(), "acme");
        assert!(validate_path_key("acme/items").is_err());
        assert!(validate_path_key("").is_err());
        assert!(validate_path_key("Acme").is_err());
    }

    #[test]
    fn public_domain_prefers_alias() {
        let now = Utc::now();
        let mut t = Tenant {
            id: TenantId::new("t1"),
            name: "Acme".into(),
            domain: Some("acme.example.org".into()),
            path_key: None,
            aliases: vec!["www.acme.example.org".into()],
            preferred_domain: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            liveness: Default::default(),
        };
        assert_eq!(t.public_domain(), Some("acme.example.org"));
        t.preferred_domain = Some("www.acme.example.org".into());
        assert_eq!(t.public_domain(), Some("www.acme.example.org"));
        assert_eq!(t.to_string(), "www.acme.example.org");
    }
}
