// Crash recovery logic (ADR-002)
use crate::domain::{ExecutionEvent, ExecutionStatus, FailureKind, ResultStatus};
use crate::error::Result;
use crate::port::{ExecutionRepository, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::events::EventBus;

/// Crash recovery service
///
/// On daemon startup, closes out executions that were still `pending` or
/// `running` when the previous process died. Commands are never re-run: the
/// remote side may already have executed them.
pub struct RecoveryService {
    repo: Arc<dyn ExecutionRepository>,
    time_provider: Arc<dyn TimeProvider>,
    events: Option<EventBus>,
}

impl RecoveryService {
    pub fn new(repo: Arc<dyn ExecutionRepository>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            repo,
            time_provider,
            events: None,
        }
    }

    /// Publish `execution_finished` for every reconciled execution
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Reconcile interrupted executions
    ///
    /// Algorithm:
    /// 1. Find all `pending` and `running` executions
    /// 2. Running results become `error` (interrupted, remote outcome unknown)
    /// 3. Pending results become `skipped` (interrupted)
    /// 4. The execution becomes `failed`
    ///
    /// # Returns
    /// Number of executions recovered
    pub async fn recover_interrupted_executions(&self) -> Result<usize> {
        info!("Starting interrupted execution recovery");
        let mut recovered = 0;

        for status in [ExecutionStatus::Running, ExecutionStatus::Pending] {
            for mut execution in self.repo.find_executions_by_status(status).await? {
                let now = self.time_provider.now_millis();
                let closed = interrupt_results(
                    self.repo.as_ref(),
                    now,
                    &execution.id,
                    "daemon stopped before the target finished",
                )
                .await?;

                execution.fail(now, "daemon restarted while the execution was in progress")?;
                self.repo.update_execution(&execution).await?;
                if let Some(events) = &self.events {
                    events.publish(ExecutionEvent::finished(&execution, now));
                }

                warn!(
                    execution_id = %execution.id,
                    previous_status = %status,
                    results_closed = closed,
                    "Recovered interrupted execution"
                );
                recovered += 1;
            }
        }

        info!(recovered_count = %recovered, "Interrupted execution recovery complete");
        Ok(recovered)
    }
}

/// Move every non-terminal result of an execution to a terminal state.
///
/// Returns how many results were changed.
pub async fn interrupt_results(
    repo: &dyn ExecutionRepository,
    now_millis: i64,
    execution_id: &str,
    reason: &str,
) -> Result<usize> {
    let mut closed = 0;
    for mut result in repo.find_results(execution_id).await? {
        match result.status {
            ResultStatus::Running => {
                result.fail(
                    now_millis,
                    FailureKind::Interrupted,
                    format!("{}; remote outcome unknown", reason),
                )?;
            }
            ResultStatus::Pending => {
                result.skip(now_millis, FailureKind::Interrupted, reason)?;
            }
            _ => continue,
        }
        repo.update_result(&result).await?;
        closed += 1;
    }
    Ok(closed)
}
