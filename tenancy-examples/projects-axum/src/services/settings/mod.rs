pub mod settings_schema;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tenancy_core::{Choice, FormFactory, ScopedAdmin, ScopedForm, ScopedRepository, TenantContext};

pub use settings_schema::Settings;

pub const THEMES: [(&str, &str); 2] = [("light", "Light"), ("dark", "Dark")];

struct SettingsForms;

#[async_trait]
impl FormFactory<Settings> for SettingsForms {
    async fn form(&self, ctx: &TenantContext) -> Result<ScopedForm<Settings>> {
        let themes = THEMES.iter().map(|(id, label)| Choice::new(*id, *label)).collect();
        ScopedForm::builder(ctx)
            .reference_unscoped("theme", themes)
            .build()
            .await
    }
}

/// One settings record per tenant.
pub fn settings_admin(repository: ScopedRepository<Settings>) -> ScopedAdmin<Settings> {
    ScopedAdmin::singleton(repository).with_forms(Arc::new(SettingsForms))
}
