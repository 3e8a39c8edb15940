pub mod app_config;
pub mod database;
pub mod order_repo;
pub mod memory_repo;

pub use database::DbClient;
pub use order_repo::PgOrderStore;
pub use memory_repo::MemoryStore;
