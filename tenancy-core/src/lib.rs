//! tenancy-core: framework-agnostic multitenancy for DogRS-style services.
//!
//! One shared schema, one process, many tenants. A request is resolved to a
//! tenant by host or path ([`resolver`]), the result travels with the request
//! as a [`TenantContext`], and every data access, input form and admin
//! listing is narrowed to that tenant's records.

pub mod admin;
pub mod app;
pub mod config;
pub mod context;
pub mod entity;
pub mod errors;
pub mod forms;
pub mod membership;
pub mod registry;
pub mod repository;
pub mod resolver;
pub mod store;
pub mod tenant;

pub use admin::{AdminCapabilities, AdminMethod, AdminService, FormFactory, PlainForm, ScopedAdmin};
pub use app::TenancyApp;
pub use config::{RoutingConfig, RoutingMode, TenancyConfig, TenancyConfigSnapshot};
pub use context::TenantContext;
pub use entity::{Criteria, TenantOwned, TenantScope, TenantSettings, TENANT_FIELD};
pub use errors::{ErrorKind, TenancyError, TenancyResult};
pub use forms::{clean, CandidateSource, Choice, FieldErrors, ScopedForm, ScopedFormBuilder};
pub use membership::{Membership, MembershipRegistry, RootAccess, TenantAccess, UserId};
pub use registry::{DeletionPolicy, RegistrySnapshot, TenantDependents, TenantRegistry};
pub use repository::ScopedRepository;
pub use resolver::{resolve, MatchKind, RequestMeta, Resolution};
pub use store::{MemoryStore, RecordStore};
pub use tenant::{
    normalize_host, validate_domain, validate_path_key, NewTenant, Tenant, TenantId, TenantLease, TenantLiveness,
};
