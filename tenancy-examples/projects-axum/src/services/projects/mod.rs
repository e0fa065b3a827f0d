pub mod projects_schema;

pub use projects_schema::Project;
