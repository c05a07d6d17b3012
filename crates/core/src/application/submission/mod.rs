// Execution Service - submission surface and batch ownership

pub mod submit;


pub use submit::{validate_request, ResolvedLimits, SubmitRequest};

use crate::application::coordinator::constants::{
    DEFAULT_LIST_LIMIT, DEFAULT_TIMEOUT_MS, MAX_LIST_LIMIT,
};
use crate::application::coordinator::{cancel_channel, CancelHandle, Coordinator};
use crate::domain::{
    Execution, ExecutionEvent, ExecutionId, ExecutionStatus, ResultStatus, TargetResult,
};
use crate::error::{AppError, Result};
use crate::port::{
    ExecutionRepository, IdProvider, TargetRegistry, TimeProvider, TransactionalExecutionRepository,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{error, info, warn};

/// Execution with its per-target results (submission order)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionDetail {
    pub execution: Execution,
    pub results: Vec<TargetResult>,
}

/// Store-wide counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub executions: BTreeMap<String, i64>,
    pub results: BTreeMap<String, i64>,
    pub active_executions: usize,
    pub uptime_ms: i64,
}

/// Bookkeeping for an execution this process is dispatching
struct ActiveDispatch {
    cancel: CancelHandle,
    done: watch::Receiver<bool>,
}

/// Execution Service
///
/// Validates and persists submissions, then hands each execution to the
/// coordinator on its own task. Tracks in-process executions for
/// cancellation and shutdown.
pub struct ExecutionService {
    store: Arc<dyn TransactionalExecutionRepository>,
    repo: Arc<dyn ExecutionRepository>,
    registry: Arc<dyn TargetRegistry>,
    coordinator: Arc<Coordinator>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    active: Arc<Mutex<HashMap<ExecutionId, ActiveDispatch>>>,
    default_timeout_ms: i64,
    started_at: i64,
}

impl ExecutionService {
    pub fn new(
        store: Arc<dyn TransactionalExecutionRepository>,
        repo: Arc<dyn ExecutionRepository>,
        registry: Arc<dyn TargetRegistry>,
        coordinator: Arc<Coordinator>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        let started_at = time_provider.now_millis();
        Self {
            store,
            repo,
            registry,
            coordinator,
            id_provider,
            time_provider,
            active: Arc::new(Mutex::new(HashMap::new())),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            started_at,
        }
    }

    /// Per-target timeout for requests that omit one
    pub fn with_default_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Submit a new execution; returns once its state is durable
    pub async fn submit(&self, req: SubmitRequest) -> Result<ExecutionId> {
        let execution_id = submit::execute(
            self.store.as_ref(),
            self.registry.as_ref(),
            self.id_provider.as_ref(),
            self.time_provider.as_ref(),
            req,
            self.default_timeout_ms,
        )
        .await?;

        self.dispatch(execution_id.clone()).await;
        Ok(execution_id)
    }

    async fn dispatch(&self, execution_id: ExecutionId) {
        let (cancel, token) = cancel_channel();
        let (done_tx, done_rx) = watch::channel(false);
        self.active.lock().await.insert(
            execution_id.clone(),
            ActiveDispatch {
                cancel,
                done: done_rx,
            },
        );

        let coordinator = Arc::clone(&self.coordinator);
        let active = Arc::clone(&self.active);
        tokio::spawn(async move {
            if let Err(e) = coordinator.run(&execution_id, token).await {
                error!(execution_id = %execution_id, error = %e, "Coordinator failed");
            }
            active.lock().await.remove(&execution_id);
            let _ = done_tx.send(true);
        });
    }

    pub async fn get_execution(&self, execution_id: &str) -> Result<ExecutionDetail> {
        let execution = self.find(execution_id).await?;
        let results = self.repo.find_results(execution_id).await?;
        Ok(ExecutionDetail { execution, results })
    }

    /// Most recent first
    pub async fn list_executions(&self, limit: Option<u32>) -> Result<Vec<Execution>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        self.repo.list_executions(limit).await
    }

    /// Request cancellation: queued targets are skipped, running ones finish.
    ///
    /// Returns `true` if at least one queued target was skipped; the
    /// execution then reaches `cancelled` after its in-flight targets settle.
    /// Returns `false` when every target had already started, in which case
    /// the execution still ends `completed`.
    pub async fn cancel(&self, execution_id: &str) -> Result<bool> {
        let execution = self.find(execution_id).await?;
        if execution.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Execution {} is already {}",
                execution_id, execution.status
            )));
        }

        let receipt = self
            .active
            .lock()
            .await
            .get(execution_id)
            .map(|active| active.cancel.request());
        if let Some(receipt) = receipt {
            let skipped_any = receipt.skipped_any().await;
            info!(execution_id = %execution_id, skipped_any, "Cancellation requested");
            return Ok(skipped_any);
        }

        // Dispatch may have finished between the read and the lock
        let execution = self.find(execution_id).await?;
        if execution.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Execution {} is already {}",
                execution_id, execution.status
            )));
        }
        Err(AppError::Conflict(format!(
            "Execution {} is not owned by this process",
            execution_id
        )))
    }

    /// Wait until this process stops dispatching the execution, then return
    /// its stored status.
    pub async fn join(&self, execution_id: &str) -> Result<ExecutionStatus> {
        let done = self
            .active
            .lock()
            .await
            .get(execution_id)
            .map(|a| a.done.clone());
        if let Some(mut done) = done {
            let _ = done.wait_for(|finished| *finished).await;
        }
        Ok(self.find(execution_id).await?.status)
    }

    pub async fn stats(&self) -> Result<ExecutionStats> {
        let mut executions = BTreeMap::new();
        for status in ExecutionStatus::ALL {
            let count = self.repo.count_executions_by_status(status).await?;
            executions.insert(status.to_string(), count);
        }
        let mut results = BTreeMap::new();
        for status in ResultStatus::ALL {
            let count = self.repo.count_results_by_status(status).await?;
            results.insert(status.to_string(), count);
        }

        Ok(ExecutionStats {
            executions,
            results,
            active_executions: self.active.lock().await.len(),
            uptime_ms: self.time_provider.now_millis() - self.started_at,
        })
    }

    /// Live progress events for every execution
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.coordinator.events().subscribe()
    }

    /// Cancel everything in flight and wait up to `grace` for it to settle.
    ///
    /// Returns the number of executions still dispatching when time ran out.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let waiters: Vec<watch::Receiver<bool>> = {
            let active = self.active.lock().await;
            for dispatch in active.values() {
                dispatch.cancel.cancel();
            }
            active.values().map(|d| d.done.clone()).collect()
        };
        info!(active = waiters.len(), "Cancelling active executions for shutdown");

        let wait_all = async {
            for mut done in waiters {
                let _ = done.wait_for(|finished| *finished).await;
            }
        };
        match tokio::time::timeout(grace, wait_all).await {
            Ok(()) => 0,
            Err(_) => {
                let remaining = self.active.lock().await.len();
                warn!(remaining, "Shutdown grace period elapsed");
                remaining
            }
        }
    }

    async fn find(&self, execution_id: &str) -> Result<Execution> {
        self.repo
            .find_execution(execution_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Execution {} not found", execution_id)))
    }
}
