use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tenancy_core::TenantId;
use validator::Validate;

use crate::services::tenant_owned;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Task {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    /// Must name a project of the same tenant.
    pub project_id: String,
    #[validate(length(min = 1, message = "title is required"))]
    pub title: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub due: Option<NaiveDate>,
}

tenant_owned!(Task, "task", label = title);

pub const DELETE_PERMISSION: &str = "tasks.delete";
