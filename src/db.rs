pub mod store;
pub use store::{Store, StoreTx};
pub mod pg_store;
pub use pg_store::PgStore;

#[cfg(test)]
pub mod memory_store;
#[cfg(test)]
pub use memory_store::MemoryStore;
