pub mod tasks_schema;
pub mod tasks_service;

pub use tasks_schema::Task;
pub use tasks_service::TasksService;
