// Smart Search Infrastructure - SQLite Adapter
// Implements: ProfileRepository, TransactionalProfileRepository

mod connection;
mod error;
mod migration;
mod profile_repository;
mod transaction;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use profile_repository::SqliteProfileRepository;
pub use transaction::SqliteProfileTransaction;

// Note: sqlx::Error conversion is handled by a helper function
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
