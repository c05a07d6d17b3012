// Transaction port for atomic operations

use crate::domain::{Execution, TargetResult};
use crate::error::Result;
use async_trait::async_trait;

/// Transaction trait for atomic multi-step operations
#[async_trait]
pub trait Transaction: Send {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Transactional ExecutionRepository operations
#[async_trait]
pub trait TransactionalExecutionRepository: Send + Sync {
    /// Begin a new transaction
    async fn begin_transaction(&self) -> Result<Box<dyn ExecutionRepositoryTransaction>>;
}

/// Submission writes: one execution plus all of its pending results
#[async_trait]
pub trait ExecutionRepositoryTransaction: Transaction {
    async fn insert_execution(&mut self, execution: &Execution) -> Result<()>;

    async fn insert_result(&mut self, result: &TargetResult) -> Result<()>;
}
