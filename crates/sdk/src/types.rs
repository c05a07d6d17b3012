//! SDK Request/Response Types
//!
//! Mirrors the JSON-RPC types from api-rpc crate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request to run one command on many targets
#[derive(Debug, Clone, Serialize)]
pub struct SubmitExecutionRequest {
    pub command: String,
    pub targets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_hint: Option<String>,
}

impl SubmitExecutionRequest {
    pub fn new(
        command: impl Into<String>,
        targets: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            command: command.into(),
            targets: targets.into_iter().map(Into::into).collect(),
            concurrency_limit: None,
            timeout_ms: None,
            os_hint: None,
        }
    }

    pub fn concurrency_limit(mut self, limit: u32) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Response from submit operation
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitExecutionResponse {
    pub execution_id: String,
    pub status: String,
    pub target_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ExecutionIdRequest {
    pub execution_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ListExecutionsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SubscribeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
}

/// Execution summary
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionView {
    pub execution_id: String,
    pub command: String,
    pub os_hint: Option<String>,
    pub status: String,
    pub target_count: usize,
    pub concurrency_limit: u32,
    pub timeout_ms: i64,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl ExecutionView {
    /// `completed`, `cancelled` or `failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "completed" | "cancelled" | "failed")
    }
}

/// Outcome for one target
#[derive(Debug, Clone, Deserialize)]
pub struct ResultView {
    pub result_id: String,
    pub position: u32,
    pub target_id: String,
    pub target_name: Option<String>,
    pub host_address: Option<String>,
    pub status: String,
    pub exit_code: Option<i32>,
    pub exit_status_known: bool,
    pub stdout: String,
    pub stderr: String,
    pub output_truncated: bool,
    pub failure_kind: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

/// Result counts by status
#[derive(Debug, Clone, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub success: usize,
    pub error: usize,
    pub skipped: usize,
}

/// Response from get operation
#[derive(Debug, Clone, Deserialize)]
pub struct GetExecutionResponse {
    pub execution: ExecutionView,
    pub progress: Progress,
    pub results: Vec<ResultView>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ListExecutionsResponse {
    pub executions: Vec<ExecutionView>,
}

/// Response from cancel operation
#[derive(Debug, Clone, Deserialize)]
pub struct CancelExecutionResponse {
    pub execution_id: String,
    pub cancelled: bool,
}

/// Response from stats operation
#[derive(Debug, Clone, Deserialize)]
pub struct StatsResponse {
    pub executions: BTreeMap<String, i64>,
    pub results: BTreeMap<String, i64>,
    pub active_executions: usize,
    pub uptime_seconds: i64,
}

/// Progress notification pushed on `execution.event`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: String,
        target_count: usize,
        at: i64,
    },
    ResultChanged {
        execution_id: String,
        result_id: String,
        target_id: String,
        status: String,
        exit_code: Option<i32>,
        failure_kind: Option<String>,
        at: i64,
    },
    ExecutionFinished {
        execution_id: String,
        status: String,
        at: i64,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> &str {
        match self {
            ExecutionEvent::ExecutionStarted { execution_id, .. }
            | ExecutionEvent::ResultChanged { execution_id, .. }
            | ExecutionEvent::ExecutionFinished { execution_id, .. } => execution_id,
        }
    }
}
