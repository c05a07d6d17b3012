// SQLite Transaction Implementation

use crate::execution_repository::map_sqlx_error;
use async_trait::async_trait;
use sqlx::{Sqlite, Transaction as SqlxTransaction};
use volley_core::domain::{Execution, TargetResult};
use volley_core::error::{AppError, Result};
use volley_core::port::{ExecutionRepositoryTransaction, Transaction};

pub struct SqliteExecutionTransaction {
    tx: SqlxTransaction<'static, Sqlite>,
}

impl SqliteExecutionTransaction {
    pub fn new(tx: SqlxTransaction<'static, Sqlite>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Transaction for SqliteExecutionTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl ExecutionRepositoryTransaction for SqliteExecutionTransaction {
    async fn insert_execution(&mut self, execution: &Execution) -> Result<()> {
        let target_ids = serde_json::to_string(&execution.target_ids)
            .map_err(|e| AppError::Internal(format!("Failed to encode target ids: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO executions (
                id, command, os_hint, target_ids, concurrency_limit, timeout_ms,
                status, error_message, created_at, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&execution.id)
        .bind(&execution.command)
        .bind(&execution.os_hint)
        .bind(target_ids)
        .bind(execution.concurrency_limit as i64)
        .bind(execution.timeout_ms)
        .bind(execution.status.as_str())
        .bind(&execution.error_message)
        .bind(execution.created_at)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn insert_result(&mut self, result: &TargetResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO execution_results (
                id, execution_id, position, target_id, target_name, host_address,
                status, exit_code, exit_status_known, stdout, stderr, output_truncated,
                failure_kind, error_message, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&result.id)
        .bind(&result.execution_id)
        .bind(result.position as i64)
        .bind(&result.target_id)
        .bind(&result.target_name)
        .bind(&result.host_address)
        .bind(result.status.as_str())
        .bind(result.exit_code)
        .bind(result.exit_status_known)
        .bind(&result.stdout)
        .bind(&result.stderr)
        .bind(result.output_truncated)
        .bind(result.failure_kind.map(|k| k.as_str()))
        .bind(&result.error_message)
        .bind(result.started_at)
        .bind(result.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
