use serde::{Deserialize, Serialize};
use tenancy_core::TenantId;
use validator::Validate;

use crate::services::tenant_owned;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Project {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    #[validate(length(min = 1, max = 120, message = "name must be 1 to 120 characters"))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

tenant_owned!(Project, "project", label = name);
