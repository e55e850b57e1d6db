pub mod auth;
pub mod sync;
pub mod tenancy;
