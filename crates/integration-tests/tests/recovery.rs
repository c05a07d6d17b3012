//! Restart recovery against a file-backed database
//!
//! Simulates a daemon that died mid-execution: state is written by one pool,
//! the pool is closed, and a fresh pool runs recovery.

use std::sync::Arc;

use volley_core::application::{EventBus, RecoveryService};
use volley_core::domain::{
    CommandOutput, Execution, ExecutionEvent, ExecutionStatus, ExitStatus, FailureKind,
    ResultStatus, TargetResult,
};
use volley_core::port::time_provider::SystemTimeProvider;
use volley_core::port::{ExecutionRepository, TransactionalExecutionRepository};
use volley_infra_sqlite::{create_pool, run_migrations, SqliteExecutionRepository};

fn database_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}", dir.path().join("volley.db").display())
}

/// Running execution with one finished, one running and one queued target
async fn seed_interrupted(url: &str) {
    let pool = create_pool(url).await.unwrap();
    run_migrations(&pool).await.unwrap();
    let repo = SqliteExecutionRepository::new(pool.clone());

    let targets = vec!["web-1".to_string(), "web-2".to_string(), "web-3".to_string()];
    let mut execution = Execution::new(
        "exec-1",
        1_000,
        "systemctl restart nginx",
        targets.clone(),
        2,
        60_000,
    );
    let results: Vec<TargetResult> = targets
        .iter()
        .enumerate()
        .map(|(i, t)| TargetResult::new_pending(format!("res-{}", i), "exec-1", i as u32, t))
        .collect();

    let mut tx = repo.begin_transaction().await.unwrap();
    tx.insert_execution(&execution).await.unwrap();
    for result in &results {
        tx.insert_result(result).await.unwrap();
    }
    tx.commit().await.unwrap();

    execution.start(1_100).unwrap();
    repo.update_execution(&execution).await.unwrap();

    let mut finished = results[0].clone();
    finished.start(1_200).unwrap();
    repo.update_result(&finished).await.unwrap();
    finished
        .complete(
            1_300,
            CommandOutput {
                exit: ExitStatus::Code(0),
                stdout: String::new(),
                stderr: String::new(),
                truncated: false,
                duration_ms: 100,
            },
        )
        .unwrap();
    repo.update_result(&finished).await.unwrap();

    let mut running = results[1].clone();
    running.start(1_250).unwrap();
    repo.update_result(&running).await.unwrap();

    pool.close().await;
}

#[tokio::test]
async fn test_restart_closes_out_interrupted_execution() {
    let dir = tempfile::tempdir().unwrap();
    let url = database_url(&dir);
    seed_interrupted(&url).await;

    let pool = create_pool(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();
    let repo = Arc::new(SqliteExecutionRepository::new(pool));
    let events = EventBus::new(16);
    let mut rx = events.subscribe();

    let recovery =
        RecoveryService::new(repo.clone(), Arc::new(SystemTimeProvider)).with_events(events);
    assert_eq!(recovery.recover_interrupted_executions().await.unwrap(), 1);

    let execution = repo.find_execution("exec-1").await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.completed_at.is_some());
    assert!(execution.error_message.is_some());

    let results = repo.find_results("exec-1").await.unwrap();
    assert_eq!(results[0].status, ResultStatus::Success);
    assert_eq!(results[1].status, ResultStatus::Error);
    assert_eq!(results[1].failure_kind, Some(FailureKind::Interrupted));
    assert_eq!(results[2].status, ResultStatus::Skipped);
    assert_eq!(results[2].failure_kind, Some(FailureKind::Interrupted));

    assert!(matches!(
        rx.try_recv(),
        Ok(ExecutionEvent::ExecutionFinished {
            status: ExecutionStatus::Failed,
            ..
        })
    ));

    // A second pass finds nothing left to do
    assert_eq!(recovery.recover_interrupted_executions().await.unwrap(), 0);
}

#[tokio::test]
async fn test_finished_executions_survive_restart_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let url = database_url(&dir);

    {
        let pool = create_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let repo = SqliteExecutionRepository::new(pool.clone());

        let mut execution = Execution::new(
            "exec-done",
            1_000,
            "uptime",
            vec!["web-1".to_string()],
            1,
            60_000,
        );
        let mut tx = repo.begin_transaction().await.unwrap();
        tx.insert_execution(&execution).await.unwrap();
        tx.insert_result(&TargetResult::new_pending("res-0", "exec-done", 0, "web-1"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        execution.start(1_100).unwrap();
        repo.update_execution(&execution).await.unwrap();
        execution.cancel(1_200).unwrap();
        repo.update_execution(&execution).await.unwrap();
        pool.close().await;
    }

    let pool = create_pool(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();
    let repo = Arc::new(SqliteExecutionRepository::new(pool));
    let recovery = RecoveryService::new(repo.clone(), Arc::new(SystemTimeProvider));

    assert_eq!(recovery.recover_interrupted_executions().await.unwrap(), 0);
    let execution = repo.find_execution("exec-done").await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert_eq!(execution.completed_at, Some(1_200));
}
