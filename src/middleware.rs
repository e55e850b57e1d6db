pub mod auth;
pub mod panic;
pub mod rbac;
pub mod tenancy;
