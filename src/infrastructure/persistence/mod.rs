//! Persistence implementations

pub mod memory;
#[cfg(feature = "postgres")]
pub mod database;
#[cfg(feature = "postgres")]
pub mod call_history_repository;

pub use memory::InMemoryCallHistoryRepository;
#[cfg(feature = "postgres")]
pub use database::{create_pool, run_migrations, DatabaseConfig};
#[cfg(feature = "postgres")]
pub use call_history_repository::PgCallHistoryRepository;
