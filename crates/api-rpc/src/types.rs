//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results (ADR-020).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use volley_core::application::{ExecutionDetail, ExecutionStats};
use volley_core::domain::{Execution, ResultStatus, TargetResult};

/// execution.submit.v1 - Submit a command for a list of targets
#[derive(Debug, Deserialize)]
pub struct SubmitExecutionRequest {
    pub command: String,
    pub targets: Vec<String>,
    #[serde(default)]
    pub concurrency_limit: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<i64>,
    #[serde(default)]
    pub os_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitExecutionResponse {
    pub execution_id: String,
    pub status: String,
    pub target_count: usize,
}

/// execution.get.v1 - Execution status with per-target results
#[derive(Debug, Deserialize)]
pub struct GetExecutionRequest {
    pub execution_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetExecutionResponse {
    pub execution: ExecutionView,
    pub progress: Progress,
    pub results: Vec<ResultView>,
}

/// execution.list.v1 - Most recent executions first
#[derive(Debug, Default, Deserialize)]
pub struct ListExecutionsRequest {
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListExecutionsResponse {
    pub executions: Vec<ExecutionView>,
}

/// execution.cancel.v1 - Stop dispatching further targets
#[derive(Debug, Deserialize)]
pub struct CancelExecutionRequest {
    pub execution_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelExecutionResponse {
    pub execution_id: String,
    pub cancelled: bool,
}

/// execution.subscribe.v1 - Progress events, optionally for one execution
#[derive(Debug, Default, Deserialize)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub execution_id: Option<String>,
}

/// admin.stats.v1 - Get system statistics
#[derive(Debug, Deserialize)]
pub struct StatsRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub executions: BTreeMap<String, i64>,
    pub results: BTreeMap<String, i64>,
    pub active_executions: usize,
    pub uptime_seconds: i64,
}

impl From<ExecutionStats> for StatsResponse {
    fn from(stats: ExecutionStats) -> Self {
        Self {
            executions: stats.executions,
            results: stats.results,
            active_executions: stats.active_executions,
            uptime_seconds: stats.uptime_ms / 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
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

impl From<Execution> for ExecutionView {
    fn from(execution: Execution) -> Self {
        Self {
            execution_id: execution.id,
            command: execution.command,
            os_hint: execution.os_hint,
            status: execution.status.to_string(),
            target_count: execution.target_ids.len(),
            concurrency_limit: execution.concurrency_limit,
            timeout_ms: execution.timeout_ms,
            error_message: execution.error_message,
            created_at: execution.created_at,
            started_at: execution.started_at,
            completed_at: execution.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
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

impl From<TargetResult> for ResultView {
    fn from(result: TargetResult) -> Self {
        Self {
            result_id: result.id,
            position: result.position,
            target_id: result.target_id,
            target_name: result.target_name,
            host_address: result.host_address,
            status: result.status.to_string(),
            exit_code: result.exit_code,
            exit_status_known: result.exit_status_known,
            stdout: result.stdout,
            stderr: result.stderr,
            output_truncated: result.output_truncated,
            failure_kind: result.failure_kind.map(|k| k.to_string()),
            error_message: result.error_message,
            started_at: result.started_at,
            completed_at: result.completed_at,
        }
    }
}

/// Result counts by status, for pollers that only need a progress bar
#[derive(Debug, Clone, Default, Serialize)]
pub struct Progress {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub success: usize,
    pub error: usize,
    pub skipped: usize,
}

impl Progress {
    pub fn of(results: &[TargetResult]) -> Self {
        let mut progress = Progress {
            total: results.len(),
            ..Default::default()
        };
        for result in results {
            match result.status {
                ResultStatus::Pending => progress.pending += 1,
                ResultStatus::Running => progress.running += 1,
                ResultStatus::Success => progress.success += 1,
                ResultStatus::Error => progress.error += 1,
                ResultStatus::Skipped => progress.skipped += 1,
            }
        }
        progress
    }
}

impl From<ExecutionDetail> for GetExecutionResponse {
    fn from(detail: ExecutionDetail) -> Self {
        Self {
            progress: Progress::of(&detail.results),
            execution: detail.execution.into(),
            results: detail.results.into_iter().map(ResultView::from).collect(),
        }
    }
}
