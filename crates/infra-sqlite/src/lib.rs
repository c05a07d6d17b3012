// Volley Infrastructure - SQLite Adapter
// Implements: ExecutionRepository, TransactionalExecutionRepository (ADR-010)

mod connection;
mod execution_repository;
mod migration;
mod transaction;

pub use connection::create_pool;
pub use execution_repository::SqliteExecutionRepository;
pub use migration::run_migrations;
pub use transaction::SqliteExecutionTransaction;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
