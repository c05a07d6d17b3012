// Coordinator - bounded fan-out of one execution over its targets

mod cancellation;
pub mod constants;
mod panic_guard;

pub use cancellation::{cancel_channel, CancelHandle, CancelReceipt, CancelToken};
pub use panic_guard::panic_message;

use crate::application::events::EventBus;
use crate::application::recovery::interrupt_results;
use crate::domain::{
    CommandOutput, Execution, ExecutionEvent, ExecutionStatus, FailureKind, ResultStatus,
    TargetResult,
};
use crate::error::{AppError, Result};
use crate::port::{
    ChannelError, CredentialResolver, ExecutionRepository, RemoteChannel, TargetRegistry,
    TimeProvider,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{Id as TaskId, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

type ChannelOutcome = std::result::Result<CommandOutput, ChannelError>;

/// A result whose channel task is in flight, plus the pool slot it occupies
struct InFlight {
    result: TargetResult,
    _permit: OwnedSemaphorePermit,
}

/// Coordinator drives executions from `pending` to a terminal status.
///
/// It is the only writer of results after submission. Channel errors and
/// panics are recorded on the affected result and never abort the batch.
pub struct Coordinator {
    repo: Arc<dyn ExecutionRepository>,
    registry: Arc<dyn TargetRegistry>,
    credentials: Arc<dyn CredentialResolver>,
    channel: Arc<dyn RemoteChannel>,
    time_provider: Arc<dyn TimeProvider>,
    events: EventBus,
}

impl Coordinator {
    pub fn new(
        repo: Arc<dyn ExecutionRepository>,
        registry: Arc<dyn TargetRegistry>,
        credentials: Arc<dyn CredentialResolver>,
        channel: Arc<dyn RemoteChannel>,
        time_provider: Arc<dyn TimeProvider>,
        events: EventBus,
    ) -> Self {
        Self {
            repo,
            registry,
            credentials,
            channel,
            time_provider,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Dispatch one execution to completion (or cancellation)
    ///
    /// On a store failure the execution is marked `failed` on a best-effort
    /// basis and the error is returned.
    pub async fn run(
        &self,
        execution_id: &str,
        mut cancel: CancelToken,
    ) -> Result<ExecutionStatus> {
        let mut execution = self
            .repo
            .find_execution(execution_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Execution {} not found", execution_id)))?;

        if execution.status != ExecutionStatus::Pending {
            warn!(
                execution_id = %execution.id,
                status = %execution.status,
                "Execution is not pending, skipping dispatch"
            );
            return Ok(execution.status);
        }

        match self.dispatch(&mut execution, &mut cancel).await {
            Ok(status) => Ok(status),
            Err(e) => {
                error!(execution_id = %execution.id, error = %e, "Execution dispatch failed");
                self.abandon(&mut execution, &e).await;
                Err(e)
            }
        }
    }

    async fn dispatch(
        &self,
        execution: &mut Execution,
        cancel: &mut CancelToken,
    ) -> Result<ExecutionStatus> {
        let results = self.repo.find_results(&execution.id).await?;

        let now = self.time_provider.now_millis();
        execution.start(now)?;
        self.repo.update_execution(execution).await?;
        self.events.publish(ExecutionEvent::started(execution, now));
        info!(
            execution_id = %execution.id,
            targets = results.len(),
            concurrency_limit = execution.concurrency_limit,
            "Execution started"
        );

        let command: Arc<str> = Arc::from(execution.command.as_str());
        let timeout = Duration::from_millis(execution.timeout_ms.max(0) as u64);
        let permits = Arc::new(Semaphore::new(execution.concurrency_limit.max(1) as usize));

        let mut queue: VecDeque<TargetResult> = results
            .into_iter()
            .filter(|r| r.status == ResultStatus::Pending)
            .collect();
        let mut in_flight: JoinSet<ChannelOutcome> = JoinSet::new();
        let mut running: HashMap<TaskId, InFlight> = HashMap::new();
        // Seen: the request was acted on. Cancelled: it skipped queued work.
        let mut cancel_seen = false;
        let mut cancelled = false;

        loop {
            if !cancel_seen && cancel.is_cancelled() {
                cancel_seen = true;
                cancelled = self.skip_queued(execution, &mut queue).await? > 0;
                cancel.acknowledge(cancelled);
            }

            // Top up the pool
            while !queue.is_empty() {
                let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                    break;
                };
                let Some(result) = queue.pop_front() else {
                    break;
                };
                self.launch(result, permit, &command, timeout, &mut in_flight, &mut running)
                    .await?;
            }

            if in_flight.is_empty() {
                if queue.is_empty() {
                    break;
                }
                continue;
            }

            tokio::select! {
                joined = in_flight.join_next_with_id() => {
                    if let Some(joined) = joined {
                        self.settle(joined, &mut running).await?;
                    }
                }
                _ = cancel.cancelled(), if !cancel_seen => {
                    info!(
                        execution_id = %execution.id,
                        in_flight = in_flight.len(),
                        queued = queue.len(),
                        "Cancellation requested, draining in-flight targets"
                    );
                }
            }
        }

        let now = self.time_provider.now_millis();
        if cancelled {
            execution.cancel(now)?;
        } else {
            execution.complete(now)?;
        }
        self.repo.update_execution(execution).await?;
        self.events.publish(ExecutionEvent::finished(execution, now));
        info!(
            execution_id = %execution.id,
            status = %execution.status,
            duration_ms = now - execution.started_at.unwrap_or(now),
            "Execution finished"
        );

        Ok(execution.status)
    }

    /// Resolve the target and start its channel, or skip it if unknown.
    async fn launch(
        &self,
        mut result: TargetResult,
        permit: OwnedSemaphorePermit,
        command: &Arc<str>,
        timeout: Duration,
        in_flight: &mut JoinSet<ChannelOutcome>,
        running: &mut HashMap<TaskId, InFlight>,
    ) -> Result<()> {
        let target = match self.registry.resolve_target(&result.target_id).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                return self
                    .skip(&mut result, FailureKind::TargetResolution, "target not found")
                    .await;
            }
            Err(e) => {
                let reason = format!("target lookup failed: {}", e);
                return self
                    .skip(&mut result, FailureKind::TargetResolution, reason)
                    .await;
            }
        };

        result.start(self.time_provider.now_millis())?;
        self.repo.update_result(&result).await?;
        self.publish_result(&result);
        debug!(
            execution_id = %result.execution_id,
            target_id = %result.target_id,
            host = %target.host,
            "Target started"
        );

        let credentials = Arc::clone(&self.credentials);
        let channel = Arc::clone(&self.channel);
        let command = Arc::clone(command);
        let handle = in_flight.spawn(async move {
            let auth = match credentials.resolve(&target).await {
                Ok(Some(auth)) => auth,
                Ok(None) => {
                    return Err(ChannelError::AuthenticationFailure(
                        "no credential available for target".to_string(),
                    ))
                }
                Err(e) => {
                    return Err(ChannelError::AuthenticationFailure(format!(
                        "credential lookup failed: {}",
                        e
                    )))
                }
            };
            channel.run(&target, &auth, &command, timeout).await
        });

        running.insert(
            handle.id(),
            InFlight {
                result,
                _permit: permit,
            },
        );
        Ok(())
    }

    /// Record one settled channel task. The pool slot is released only after
    /// the result is terminal in the store.
    async fn settle(
        &self,
        joined: std::result::Result<(TaskId, ChannelOutcome), JoinError>,
        running: &mut HashMap<TaskId, InFlight>,
    ) -> Result<()> {
        let (task_id, outcome) = match joined {
            Ok((id, outcome)) => (id, Ok(outcome)),
            Err(join_err) => (join_err.id(), Err(join_err)),
        };
        let InFlight {
            mut result,
            _permit,
        } = running
            .remove(&task_id)
            .ok_or_else(|| AppError::Internal(format!("Unknown channel task {}", task_id)))?;

        let now = self.time_provider.now_millis();
        match outcome {
            Ok(Ok(output)) => {
                let duration_ms = output.duration_ms;
                result.complete(now, output)?;
                if result.status == ResultStatus::Success {
                    info!(
                        execution_id = %result.execution_id,
                        target_id = %result.target_id,
                        duration_ms,
                        "Target succeeded"
                    );
                } else {
                    warn!(
                        execution_id = %result.execution_id,
                        target_id = %result.target_id,
                        exit_code = ?result.exit_code,
                        failure_kind = ?result.failure_kind,
                        "Target command failed"
                    );
                }
            }
            Ok(Err(channel_err)) => {
                warn!(
                    execution_id = %result.execution_id,
                    target_id = %result.target_id,
                    error = %channel_err,
                    "Target channel error"
                );
                result.fail(now, channel_err.kind(), channel_err.to_string())?;
            }
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    format!(
                        "channel task panicked: {}",
                        panic_message(&*join_err.into_panic())
                    )
                } else {
                    "channel task was aborted".to_string()
                };
                error!(
                    execution_id = %result.execution_id,
                    target_id = %result.target_id,
                    error = %message,
                    "Target channel task died"
                );
                result.fail(now, FailureKind::Internal, message)?;
            }
        }

        self.repo.update_result(&result).await?;
        self.publish_result(&result);
        Ok(())
    }

    /// Returns how many queued targets were skipped
    async fn skip_queued(
        &self,
        execution: &Execution,
        queue: &mut VecDeque<TargetResult>,
    ) -> Result<usize> {
        let skipped = queue.len();
        while let Some(mut result) = queue.pop_front() {
            self.skip(&mut result, FailureKind::Cancelled, "execution cancelled before dispatch")
                .await?;
        }
        if skipped == 0 {
            info!(
                execution_id = %execution.id,
                "Cancellation arrived after every target started"
            );
        } else {
            info!(execution_id = %execution.id, skipped, "Skipped queued targets");
        }
        Ok(skipped)
    }

    async fn skip(
        &self,
        result: &mut TargetResult,
        kind: FailureKind,
        reason: impl Into<String>,
    ) -> Result<()> {
        let reason = reason.into();
        result.skip(self.time_provider.now_millis(), kind, reason.as_str())?;
        self.repo.update_result(result).await?;
        self.publish_result(result);
        debug!(
            execution_id = %result.execution_id,
            target_id = %result.target_id,
            reason = %reason,
            "Target skipped"
        );
        Ok(())
    }

    fn publish_result(&self, result: &TargetResult) {
        self.events.publish(ExecutionEvent::result_changed(
            result,
            result.completed_at.or(result.started_at).unwrap_or_default(),
        ));
    }

    /// Best-effort terminal state after a coordinator-level failure
    async fn abandon(&self, execution: &mut Execution, cause: &AppError) {
        let now = self.time_provider.now_millis();
        if let Err(e) = interrupt_results(
            self.repo.as_ref(),
            now,
            &execution.id,
            "execution aborted by coordinator failure",
        )
        .await
        {
            warn!(execution_id = %execution.id, error = %e, "Could not close out results");
        }

        if execution.fail(now, cause.to_string()).is_err() {
            return;
        }
        match self.repo.update_execution(execution).await {
            Ok(()) => self.events.publish(ExecutionEvent::finished(execution, now)),
            Err(e) => {
                error!(execution_id = %execution.id, error = %e, "Could not mark execution failed")
            }
        }
    }
}

#[cfg(test)]
mod tests;
