// Port Layer - Interfaces for external dependencies

pub mod credential_resolver;
pub mod execution_repository;
pub mod id_provider; // For deterministic testing
pub mod remote_channel;
pub mod target_registry;
pub mod time_provider;
pub mod transaction;

// Re-exports
pub use credential_resolver::CredentialResolver;
pub use execution_repository::ExecutionRepository;
pub use id_provider::IdProvider;
pub use remote_channel::{ChannelError, RemoteChannel};
pub use target_registry::TargetRegistry;
pub use time_provider::TimeProvider;
pub use transaction::{
    ExecutionRepositoryTransaction, Transaction, TransactionalExecutionRepository,
};
