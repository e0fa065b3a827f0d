//! Tenant-owned records and the criteria used to query them.
//!
//! Any record type that implements [`TenantOwned`] can be stored through a
//! [`crate::RecordStore`] and served by a [`crate::ScopedRepository`].
//!
//! Uniqueness rules on tenant-owned fields must include the tenant reference
//! (e.g. `(tenant_id, slug)`, never `slug` alone), otherwise two tenants cannot
//! own same-named records. Nothing here can enforce that for you.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::tenant::TenantId;

/// Field name under which records carry their tenant reference.
pub const TENANT_FIELD: &str = "tenant_id";

/// A record type declaring a mandatory reference to exactly one tenant.
///
/// `tenant_id()` is `None` only before the record is created; stores and
/// repositories never hand out a record without one. Submitted input never
/// carries `id` or `tenant_id`, so both fields should be `#[serde(default)]`.
pub trait TenantOwned: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Human label used in error messages ("project", "task").
    const KIND: &'static str;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    fn tenant_id(&self) -> Option<&TenantId>;

    fn set_tenant_id(&mut self, tenant: TenantId);

    /// Text shown next to the id when the record is offered as a choice.
    fn label(&self) -> String {
        self.id().to_string()
    }
}

/// Marker for per-tenant settings records: at most one per tenant.
pub trait TenantSettings: TenantOwned {}

/// Which tenants a store query may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope {
    Tenant(TenantId),
    AllTenants,
}

impl TenantScope {
    pub fn admits(&self, tenant: Option<&TenantId>) -> bool {
        match self {
            TenantScope::AllTenants => true,
            TenantScope::Tenant(expected) => tenant == Some(expected),
        }
    }
}

/// Equality criteria over a record's serialized fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    fields: BTreeMap<String, Value>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::new().eq("id", Value::String(id.into()))
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Build criteria from REST query parameters.
    ///
    /// The tenant field is never taken from a query string.
    pub fn from_query<'a, I>(query: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let fields = query
            .into_iter()
            .filter(|(k, _)| k.as_str() != TENANT_FIELD)
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// True when every criterion equals the record's field.
    ///
    /// String criteria also match numbers and booleans by their textual form,
    /// since query strings carry everything as text.
    pub fn matches(&self, record: &Value) -> bool {
        self.fields.iter().all(|(field, expected)| {
            let Some(actual) = record.get(field) else {
                return expected.is_null();
            };
            if actual == expected {
                return true;
            }
            match (expected, actual) {
                (Value::String(s), Value::Number(n)) => n.to_string() == *s,
                (Value::String(s), Value::Bool(b)) => b.to_string() == *s,
                _ => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn criteria_match_on_fields() {
        let record = json!({"id": "p1", "name": "Roadmap", "archived": false, "rank": 3});
        assert!(Criteria::id("p1").matches(&record));
        assert!(Criteria::new().matches(&record));
        assert!(!Criteria::id("p2").matches(&record));
        assert!(Criteria::new().eq("archived", "false").matches(&record));
        assert!(Criteria::new().eq("rank", "3").matches(&record));
        assert!(!Criteria::new().eq("missing", "x").matches(&record));
    }

    #[test]
    fn query_cannot_select_tenant() {
        let mut q = std::collections::HashMap::new();
        q.insert("tenant_id".to_string(), "other".to_string());
        q.insert("name".to_string(), "x".to_string());
        let c = Criteria::from_query(&q);
        assert_eq!(c.fields().count(), 1);
    }

    #[test]
    fn scope_admits() {
        let t = TenantId::new("a");
        assert!(TenantScope::AllTenants.admits(None));
        assert!(TenantScope::Tenant(t.clone()).admits(Some(&t)));
        assert!(!TenantScope::Tenant(t).admits(Some(&TenantId::new("b"))));
    }
}
