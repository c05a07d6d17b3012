// SQLite ExecutionRepository Implementation

use crate::SqliteExecutionTransaction;
use async_trait::async_trait;
use sqlx::SqlitePool;
use volley_core::domain::{Execution, ExecutionStatus, FailureKind, ResultStatus, TargetResult};
use volley_core::error::{AppError, Result};
use volley_core::port::{
    ExecutionRepository, ExecutionRepositoryTransaction, TransactionalExecutionRepository,
};

// Helper to convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => AppError::Conflict(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "787" | "3850" => AppError::Database(format!(
                        "Foreign key constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        // Connection, pool, protocol errors
        _ => AppError::Database(err.to_string()),
    }
}

const TERMINAL_EXECUTION_GUARD: &str = "status NOT IN ('completed', 'cancelled', 'failed')";
const TERMINAL_RESULT_GUARD: &str = "status NOT IN ('success', 'error', 'skipped')";

pub struct SqliteExecutionRepository {
    pool: SqlitePool,
}

impl SqliteExecutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Distinguish "missing" from "already terminal" after a guarded update
    /// touched no rows.
    async fn explain_rejected_update(
        &self,
        table: &str,
        kind: &str,
        id: &str,
        to: &str,
    ) -> AppError {
        let current: std::result::Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar(&format!("SELECT status FROM {} WHERE id = ?", table))
                .bind(id)
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(None) => AppError::NotFound(format!("{} {} not found", kind, id)),
            Ok(Some(status)) => AppError::InvalidState(format!(
                "Cannot update {} {} from {} to {}",
                kind.to_lowercase(),
                id,
                status,
                to
            )),
            Err(e) => map_sqlx_error(e),
        }
    }
}

#[async_trait]
impl ExecutionRepository for SqliteExecutionRepository {
    async fn find_execution(&self, id: &str) -> Result<Option<Execution>> {
        let row = sqlx::query_as::<_, ExecutionRow>("SELECT * FROM executions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(ExecutionRow::into_execution).transpose()
    }

    async fn list_executions(&self, limit: u32) -> Result<Vec<Execution>> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            r#"
            SELECT * FROM executions
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ExecutionRow::into_execution).collect()
    }

    async fn find_results(&self, execution_id: &str) -> Result<Vec<TargetResult>> {
        let rows: Vec<ResultRow> = sqlx::query_as(
            r#"
            SELECT * FROM execution_results
            WHERE execution_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ResultRow::into_result).collect()
    }

    async fn update_execution(&self, execution: &Execution) -> Result<()> {
        // Conditional update: terminal executions are immutable
        let sql = format!(
            r#"
            UPDATE executions
            SET status = ?, error_message = ?, started_at = ?, completed_at = ?
            WHERE id = ? AND {}
            "#,
            TERMINAL_EXECUTION_GUARD
        );
        let result = sqlx::query(&sql)
            .bind(execution.status.as_str())
            .bind(&execution.error_message)
            .bind(execution.started_at)
            .bind(execution.completed_at)
            .bind(&execution.id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(self
                .explain_rejected_update(
                    "executions",
                    "Execution",
                    &execution.id,
                    execution.status.as_str(),
                )
                .await);
        }
        Ok(())
    }

    async fn update_result(&self, result: &TargetResult) -> Result<()> {
        // Conditional update: terminal results are immutable
        let sql = format!(
            r#"
            UPDATE execution_results
            SET status = ?, exit_code = ?, exit_status_known = ?,
                stdout = ?, stderr = ?, output_truncated = ?,
                failure_kind = ?, error_message = ?,
                started_at = ?, completed_at = ?
            WHERE id = ? AND {}
            "#,
            TERMINAL_RESULT_GUARD
        );
        let outcome = sqlx::query(&sql)
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
            .bind(&result.id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if outcome.rows_affected() == 0 {
            return Err(self
                .explain_rejected_update(
                    "execution_results",
                    "Result",
                    &result.id,
                    result.status.as_str(),
                )
                .await);
        }
        Ok(())
    }

    async fn find_executions_by_status(&self, status: ExecutionStatus) -> Result<Vec<Execution>> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            r#"
            SELECT * FROM executions
            WHERE status = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ExecutionRow::into_execution).collect()
    }

    async fn count_executions_by_status(&self, status: ExecutionStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM executions WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(count)
    }

    async fn count_results_by_status(&self, status: ResultStatus) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM execution_results WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(count)
    }
}

#[async_trait]
impl TransactionalExecutionRepository for SqliteExecutionRepository {
    async fn begin_transaction(&self) -> Result<Box<dyn ExecutionRepositoryTransaction>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(SqliteExecutionTransaction::new(tx)))
    }
}

fn corrupt(column: &str, err: impl std::fmt::Display) -> AppError {
    AppError::Database(format!("Corrupt {} column: {}", column, err))
}

/// SQLite row representation of an execution
#[derive(Debug, sqlx::FromRow)]
struct ExecutionRow {
    id: String,
    command: String,
    os_hint: Option<String>,
    target_ids: String, // JSON array
    concurrency_limit: i64,
    timeout_ms: i64,
    status: String,
    error_message: Option<String>,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
}

impl ExecutionRow {
    fn into_execution(self) -> Result<Execution> {
        let status: ExecutionStatus = self.status.parse().map_err(|e| corrupt("status", e))?;
        let target_ids: Vec<String> =
            serde_json::from_str(&self.target_ids).map_err(|e| corrupt("target_ids", e))?;
        let concurrency_limit =
            u32::try_from(self.concurrency_limit).map_err(|e| corrupt("concurrency_limit", e))?;

        Ok(Execution {
            id: self.id,
            command: self.command,
            os_hint: self.os_hint,
            target_ids,
            concurrency_limit,
            timeout_ms: self.timeout_ms,
            status,
            error_message: self.error_message,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

/// SQLite row representation of a per-target result
#[derive(Debug, sqlx::FromRow)]
struct ResultRow {
    id: String,
    execution_id: String,
    position: i64,
    target_id: String,
    target_name: Option<String>,
    host_address: Option<String>,
    status: String,
    exit_code: Option<i32>,
    exit_status_known: i32, // SQLite boolean as integer
    stdout: String,
    stderr: String,
    output_truncated: i32, // SQLite boolean as integer
    failure_kind: Option<String>,
    error_message: Option<String>,
    started_at: Option<i64>,
    completed_at: Option<i64>,
}

impl ResultRow {
    fn into_result(self) -> Result<TargetResult> {
        let status: ResultStatus = self.status.parse().map_err(|e| corrupt("status", e))?;
        let failure_kind = self
            .failure_kind
            .as_deref()
            .map(str::parse::<FailureKind>)
            .transpose()
            .map_err(|e| corrupt("failure_kind", e))?;
        let position = u32::try_from(self.position).map_err(|e| corrupt("position", e))?;

        Ok(TargetResult {
            id: self.id,
            execution_id: self.execution_id,
            position,
            target_id: self.target_id,
            target_name: self.target_name,
            host_address: self.host_address,
            status,
            exit_code: self.exit_code,
            exit_status_known: self.exit_status_known != 0,
            stdout: self.stdout,
            stderr: self.stderr,
            output_truncated: self.output_truncated != 0,
            failure_kind,
            error_message: self.error_message,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use volley_core::domain::{CommandOutput, ExitStatus};

    async fn setup_test_db() -> SqliteExecutionRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteExecutionRepository::new(pool)
    }

    async fn insert(repo: &SqliteExecutionRepository, id: &str, created_at: i64, n: usize) {
        let targets: Vec<String> = (0..n).map(|i| format!("t{}", i)).collect();
        let execution = Execution::new(id, created_at, "uname -a", targets.clone(), 4, 30_000);

        let mut tx = repo.begin_transaction().await.unwrap();
        tx.insert_execution(&execution).await.unwrap();
        for (i, target) in targets.iter().enumerate() {
            let result =
                TargetResult::new_pending(format!("{}-r{}", id, i), id, i as u32, target.clone());
            tx.insert_result(&result).await.unwrap();
        }
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = setup_test_db().await;
        insert(&repo, "exec-1", 1000, 3).await;

        let found = repo.find_execution("exec-1").await.unwrap().unwrap();
        assert_eq!(found.status, ExecutionStatus::Pending);
        assert_eq!(found.target_ids, vec!["t0", "t1", "t2"]);
        assert_eq!(found.concurrency_limit, 4);

        let results = repo.find_results("exec-1").await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(
            results.iter().map(|r| r.position).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        assert!(repo.find_execution("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rollback_discards_everything() {
        let repo = setup_test_db().await;
        let execution = Execution::new("exec-1", 1, "ls", vec!["t0".to_string()], 1, 1000);

        let mut tx = repo.begin_transaction().await.unwrap();
        tx.insert_execution(&execution).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(repo.find_execution("exec-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_most_recent_first() {
        let repo = setup_test_db().await;
        insert(&repo, "old", 1000, 1).await;
        insert(&repo, "new", 3000, 1).await;
        insert(&repo, "mid", 2000, 1).await;

        let listed = repo.list_executions(2).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[tokio::test]
    async fn test_result_roundtrip_preserves_outcome() {
        let repo = setup_test_db().await;
        insert(&repo, "exec-1", 1000, 2).await;

        let mut results = repo.find_results("exec-1").await.unwrap();
        let mut first = results.remove(0);
        first.start(1100).unwrap();
        repo.update_result(&first).await.unwrap();
        first
            .complete(
                1200,
                CommandOutput {
                    exit: ExitStatus::Unknown,
                    stdout: "partial".to_string(),
                    stderr: "warn".to_string(),
                    truncated: true,
                    duration_ms: 100,
                },
            )
            .unwrap();
        repo.update_result(&first).await.unwrap();

        let stored = &repo.find_results("exec-1").await.unwrap()[0];
        assert_eq!(stored.status, ResultStatus::Error);
        assert_eq!(stored.exit_code, Some(0));
        assert!(!stored.exit_status_known);
        assert!(stored.output_truncated);
        assert_eq!(stored.failure_kind, Some(FailureKind::ExitStatusUnknown));
        assert_eq!(stored.stdout, "partial");
        assert_eq!(stored.completed_at, Some(1200));
    }

    #[tokio::test]
    async fn test_terminal_result_cannot_be_overwritten() {
        let repo = setup_test_db().await;
        insert(&repo, "exec-1", 1000, 1).await;

        let mut result = repo.find_results("exec-1").await.unwrap().remove(0);
        result.skip(1100, FailureKind::Cancelled, "cancelled").unwrap();
        repo.update_result(&result).await.unwrap();

        // A stale copy tries to move it to running
        let mut stale = result.clone();
        stale.status = ResultStatus::Running;
        let err = repo.update_result(&stale).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let stored = &repo.find_results("exec-1").await.unwrap()[0];
        assert_eq!(stored.status, ResultStatus::Skipped);
    }

    #[tokio::test]
    async fn test_terminal_execution_cannot_be_overwritten() {
        let repo = setup_test_db().await;
        insert(&repo, "exec-1", 1000, 1).await;

        let mut execution = repo.find_execution("exec-1").await.unwrap().unwrap();
        execution.cancel(1500).unwrap();
        repo.update_execution(&execution).await.unwrap();

        execution.status = ExecutionStatus::Running;
        let err = repo.update_execution(&execution).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_update_missing_rows() {
        let repo = setup_test_db().await;
        let ghost = Execution::new("ghost", 1, "ls", vec![], 1, 1000);
        assert!(matches!(
            repo.update_execution(&ghost).await.unwrap_err(),
            AppError::NotFound(_)
        ));

        let ghost_result = TargetResult::new_pending("r-ghost", "ghost", 0, "t0");
        assert!(matches!(
            repo.update_result(&ghost_result).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_status_queries() {
        let repo = setup_test_db().await;
        insert(&repo, "a", 1000, 2).await;
        insert(&repo, "b", 2000, 3).await;

        let mut b = repo.find_execution("b").await.unwrap().unwrap();
        b.start(2100).unwrap();
        repo.update_execution(&b).await.unwrap();

        assert_eq!(
            repo.count_executions_by_status(ExecutionStatus::Pending).await.unwrap(),
            1
        );
        assert_eq!(
            repo.count_results_by_status(ResultStatus::Pending).await.unwrap(),
            5
        );
        let running = repo
            .find_executions_by_status(ExecutionStatus::Running)
            .await
            .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, "b");
    }

    #[tokio::test]
    async fn test_duplicate_execution_id_is_conflict() {
        let repo = setup_test_db().await;
        insert(&repo, "exec-1", 1000, 1).await;

        let dup = Execution::new("exec-1", 2000, "ls", vec![], 1, 1000);
        let mut tx = repo.begin_transaction().await.unwrap();
        let err = tx.insert_execution(&dup).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
