//! SQLite persistence for the suggestion corpus

pub mod init;
pub mod store;

pub use init::{init_database, init_memory_database};
pub use store::SqliteStore;
