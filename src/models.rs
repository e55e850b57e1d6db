pub mod auth;
pub mod inventory;
pub mod operations;
pub mod revision;
pub mod sync;
pub mod tenancy;
