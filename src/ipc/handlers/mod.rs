pub mod attendance;
pub mod auth;
pub mod backup;
pub mod classes;
pub mod core;
pub mod reports;
pub mod routes;
pub mod students;
pub mod teachers;
