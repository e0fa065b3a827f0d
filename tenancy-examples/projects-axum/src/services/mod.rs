use std::sync::Arc;

use tenancy_core::{AdminService, ScopedAdmin, ScopedRepository, TenancyApp};

pub mod projects;
pub mod settings;
pub mod tasks;

pub use projects::Project;
pub use settings::Settings;
pub use tasks::Task;

/// Implements `TenantOwned` for a record with `id` and `tenant_id` fields.
macro_rules! tenant_owned {
    ($ty:ty, $kind:literal, label = $label:ident) => {
        impl tenancy_core::TenantOwned for $ty {
            const KIND: &'static str = $kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }

            fn tenant_id(&self) -> Option<&tenancy_core::TenantId> {
                self.tenant_id.as_ref()
            }

            fn set_tenant_id(&mut self, tenant: tenancy_core::TenantId) {
                self.tenant_id = Some(tenant);
            }

            fn label(&self) -> String {
                self.$label.clone()
            }
        }
    };
}
pub(crate) use tenant_owned;

pub struct Services {
    pub projects: Arc<dyn AdminService<Project>>,
    pub tasks: Arc<dyn AdminService<Task>>,
    pub settings: Arc<ScopedAdmin<Settings>>,
}

/// Build every service over in-memory stores and register their
/// repositories so tenant deletion knows about the records they hold.
pub fn configure(app: &TenancyApp) -> Services {
    let projects = ScopedRepository::<Project>::in_memory();
    let tasks = ScopedRepository::<Task>::in_memory();
    let settings = ScopedRepository::<Settings>::in_memory();

    app.register_dependent(Arc::new(projects.clone()));
    app.register_dependent(Arc::new(tasks.clone()));
    app.register_dependent(Arc::new(settings.clone()));

    Services {
        projects: Arc::new(ScopedAdmin::new(projects.clone())),
        tasks: Arc::new(tasks::TasksService::new(app.clone(), tasks, projects)),
        settings: Arc::new(settings::settings_admin(settings)),
    }
}
