//! RPC Method Handlers
//!
//! Thin adapters from JSON-RPC parameters to the execution service.

use crate::error::to_rpc_error;
use crate::types::{
    CancelExecutionRequest, CancelExecutionResponse, ExecutionView, GetExecutionRequest,
    GetExecutionResponse, ListExecutionsRequest, ListExecutionsResponse, StatsRequest,
    StatsResponse, SubmitExecutionRequest, SubmitExecutionResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use volley_core::application::{ExecutionService, SubmitRequest};
use volley_core::domain::{ExecutionEvent, ExecutionStatus};

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    service: Arc<ExecutionService>,
}

impl RpcHandler {
    pub fn new(service: Arc<ExecutionService>) -> Self {
        Self { service }
    }

    /// execution.submit.v1
    pub async fn submit(
        &self,
        params: SubmitExecutionRequest,
    ) -> Result<SubmitExecutionResponse, ErrorObjectOwned> {
        let target_count = params.targets.len();
        let req = SubmitRequest {
            command: params.command,
            targets: params.targets,
            concurrency_limit: params.concurrency_limit,
            timeout_ms: params.timeout_ms,
            os_hint: params.os_hint,
        };

        let execution_id = self.service.submit(req).await.map_err(to_rpc_error)?;
        info!(execution_id = %execution_id, target_count, "Execution submitted via RPC");

        Ok(SubmitExecutionResponse {
            execution_id,
            status: ExecutionStatus::Pending.to_string(),
            target_count,
        })
    }

    /// execution.get.v1
    pub async fn get(
        &self,
        params: GetExecutionRequest,
    ) -> Result<GetExecutionResponse, ErrorObjectOwned> {
        let detail = self
            .service
            .get_execution(&params.execution_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(detail.into())
    }

    /// execution.list.v1
    pub async fn list(
        &self,
        params: ListExecutionsRequest,
    ) -> Result<ListExecutionsResponse, ErrorObjectOwned> {
        let executions = self
            .service
            .list_executions(params.limit)
            .await
            .map_err(to_rpc_error)?;
        Ok(ListExecutionsResponse {
            executions: executions.into_iter().map(ExecutionView::from).collect(),
        })
    }

    /// execution.cancel.v1
    pub async fn cancel(
        &self,
        params: CancelExecutionRequest,
    ) -> Result<CancelExecutionResponse, ErrorObjectOwned> {
        let cancelled = self
            .service
            .cancel(&params.execution_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(CancelExecutionResponse {
            execution_id: params.execution_id,
            cancelled,
        })
    }

    /// admin.stats.v1
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        let stats = self.service.stats().await.map_err(to_rpc_error)?;
        Ok(stats.into())
    }

    /// Event feed for execution.subscribe.v1
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.service.subscribe()
    }

    /// Terminal event for an execution that already finished, so a late
    /// subscriber is not left waiting. `Ok(None)` if it is still in progress.
    pub async fn finished_event(
        &self,
        execution_id: &str,
    ) -> Result<Option<ExecutionEvent>, ErrorObjectOwned> {
        let detail = self
            .service
            .get_execution(execution_id)
            .await
            .map_err(to_rpc_error)?;
        let execution = detail.execution;
        if !execution.is_terminal() {
            return Ok(None);
        }
        let at = execution.completed_at.unwrap_or(execution.created_at);
        Ok(Some(ExecutionEvent::finished(&execution, at)))
    }
}
