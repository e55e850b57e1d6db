pub mod auth;
pub mod license;
pub mod tenancy_service;

pub mod entity_applier;
pub mod fetch_since;
pub mod revision_log;
pub mod sync_parser;
pub mod sync_service;
pub mod transaction_applier;

#[cfg(test)]
mod test_support;
