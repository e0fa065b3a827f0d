use serde::{Deserialize, Serialize};
use tenancy_core::{TenantId, TenantSettings};
use validator::Validate;

use crate::services::tenant_owned;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Settings {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    #[validate(length(min = 1, message = "display_name is required"))]
    pub display_name: String,
    #[serde(default = "default_theme")]
    pub theme: String,
}

fn default_theme() -> String {
    "light".to_string()
}

tenant_owned!(Settings, "settings", label = display_name);

impl TenantSettings for Settings {}
