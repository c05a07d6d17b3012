// Execution Repository Port (Result Store)

use crate::domain::{Execution, ExecutionStatus, ResultStatus, TargetResult};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for Execution / Result persistence
///
/// Updates are conditional: a row that is already terminal is never
/// overwritten (`AppError::InvalidState`), a missing row is
/// `AppError::NotFound`.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Find execution by ID
    async fn find_execution(&self, id: &str) -> Result<Option<Execution>>;

    /// Most recently created first
    async fn list_executions(&self, limit: u32) -> Result<Vec<Execution>>;

    /// Results of one execution, in submission order
    async fn find_results(&self, execution_id: &str) -> Result<Vec<TargetResult>>;

    async fn update_execution(&self, execution: &Execution) -> Result<()>;

    async fn update_result(&self, result: &TargetResult) -> Result<()>;

    /// Find all executions in a status (for recovery)
    async fn find_executions_by_status(&self, status: ExecutionStatus) -> Result<Vec<Execution>>;

    async fn count_executions_by_status(&self, status: ExecutionStatus) -> Result<i64>;

    async fn count_results_by_status(&self, status: ResultStatus) -> Result<i64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use crate::port::{
        ExecutionRepositoryTransaction, Transaction, TransactionalExecutionRepository,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Tables {
        executions: HashMap<String, Execution>,
        results: HashMap<String, TargetResult>,
    }

    /// In-memory store that also records how many results were `running`
    /// at the same time.
    #[derive(Default)]
    pub struct InMemoryExecutionRepository {
        tables: Arc<Mutex<Tables>>,
        running_now: AtomicUsize,
        running_peak: AtomicUsize,
        fail_result_writes: AtomicBool,
    }

    impl InMemoryExecutionRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Highest number of simultaneously running results observed
        pub fn max_running(&self) -> usize {
            self.running_peak.load(Ordering::SeqCst)
        }

        /// Make every subsequent `update_result` fail with a database error
        pub fn fail_result_writes(&self, fail: bool) {
            self.fail_result_writes.store(fail, Ordering::SeqCst);
        }

        fn track_running(&self, before: ResultStatus, after: ResultStatus) {
            let was = before == ResultStatus::Running;
            let is = after == ResultStatus::Running;
            if !was && is {
                let now = self.running_now.fetch_add(1, Ordering::SeqCst) + 1;
                self.running_peak.fetch_max(now, Ordering::SeqCst);
            } else if was && !is {
                self.running_now.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    #[async_trait]
    impl ExecutionRepository for InMemoryExecutionRepository {
        async fn find_execution(&self, id: &str) -> Result<Option<Execution>> {
            Ok(self.tables.lock().unwrap().executions.get(id).cloned())
        }

        async fn list_executions(&self, limit: u32) -> Result<Vec<Execution>> {
            let tables = self.tables.lock().unwrap();
            let mut all: Vec<Execution> = tables.executions.values().cloned().collect();
            all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            all.truncate(limit as usize);
            Ok(all)
        }

        async fn find_results(&self, execution_id: &str) -> Result<Vec<TargetResult>> {
            let tables = self.tables.lock().unwrap();
            let mut results: Vec<TargetResult> = tables
                .results
                .values()
                .filter(|r| r.execution_id == execution_id)
                .cloned()
                .collect();
            results.sort_by_key(|r| r.position);
            Ok(results)
        }

        async fn update_execution(&self, execution: &Execution) -> Result<()> {
            let mut tables = self.tables.lock().unwrap();
            let stored = tables
                .executions
                .get_mut(&execution.id)
                .ok_or_else(|| {
                    AppError::NotFound(format!("Execution {} not found", execution.id))
                })?;
            if stored.is_terminal() {
                return Err(AppError::InvalidState(format!(
                    "Cannot update execution {} from {} to {}",
                    execution.id, stored.status, execution.status
                )));
            }
            *stored = execution.clone();
            Ok(())
        }

        async fn update_result(&self, result: &TargetResult) -> Result<()> {
            if self.fail_result_writes.load(Ordering::SeqCst) {
                return Err(AppError::Database("injected write failure".to_string()));
            }
            let before = {
                let mut tables = self.tables.lock().unwrap();
                let stored = tables
                    .results
                    .get_mut(&result.id)
                    .ok_or_else(|| AppError::NotFound(format!("Result {} not found", result.id)))?;
                if stored.is_terminal() {
                    return Err(AppError::InvalidState(format!(
                        "Cannot update result {} from {} to {}",
                        result.id, stored.status, result.status
                    )));
                }
                let before = stored.status;
                *stored = result.clone();
                before
            };
            self.track_running(before, result.status);
            Ok(())
        }

        async fn find_executions_by_status(
            &self,
            status: ExecutionStatus,
        ) -> Result<Vec<Execution>> {
            let tables = self.tables.lock().unwrap();
            let mut found: Vec<Execution> = tables
                .executions
                .values()
                .filter(|e| e.status == status)
                .cloned()
                .collect();
            found.sort_by_key(|e| e.created_at);
            Ok(found)
        }

        async fn count_executions_by_status(&self, status: ExecutionStatus) -> Result<i64> {
            let tables = self.tables.lock().unwrap();
            Ok(tables.executions.values().filter(|e| e.status == status).count() as i64)
        }

        async fn count_results_by_status(&self, status: ResultStatus) -> Result<i64> {
            let tables = self.tables.lock().unwrap();
            Ok(tables.results.values().filter(|r| r.status == status).count() as i64)
        }
    }

    #[async_trait]
    impl TransactionalExecutionRepository for InMemoryExecutionRepository {
        async fn begin_transaction(&self) -> Result<Box<dyn ExecutionRepositoryTransaction>> {
            Ok(Box::new(InMemoryTransaction {
                tables: Arc::clone(&self.tables),
                executions: Vec::new(),
                results: Vec::new(),
            }))
        }
    }

    /// Buffers writes until commit
    pub struct InMemoryTransaction {
        tables: Arc<Mutex<Tables>>,
        executions: Vec<Execution>,
        results: Vec<TargetResult>,
    }

    #[async_trait]
    impl Transaction for InMemoryTransaction {
        async fn commit(self: Box<Self>) -> Result<()> {
            let mut tables = self.tables.lock().unwrap();
            for execution in self.executions {
                tables.executions.insert(execution.id.clone(), execution);
            }
            for result in self.results {
                tables.results.insert(result.id.clone(), result);
            }
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ExecutionRepositoryTransaction for InMemoryTransaction {
        async fn insert_execution(&mut self, execution: &Execution) -> Result<()> {
            if self.tables.lock().unwrap().executions.contains_key(&execution.id) {
                return Err(AppError::Conflict(format!(
                    "Execution {} already exists",
                    execution.id
                )));
            }
            self.executions.push(execution.clone());
            Ok(())
        }

        async fn insert_result(&mut self, result: &TargetResult) -> Result<()> {
            self.results.push(result.clone());
            Ok(())
        }
    }
}
