pub mod access;
pub mod tenant;

pub use access::require_tenant_admin;
pub use tenant::resolve_tenant;
