// Execution progress events (published by the coordinator)

use crate::domain::{ExecutionId, ExecutionStatus, FailureKind, ResultId, ResultStatus, TargetId};
use crate::domain::{Execution, TargetResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: ExecutionId,
        target_count: usize,
        at: i64,
    },
    ResultChanged {
        execution_id: ExecutionId,
        result_id: ResultId,
        target_id: TargetId,
        status: ResultStatus,
        exit_code: Option<i32>,
        failure_kind: Option<FailureKind>,
        at: i64,
    },
    ExecutionFinished {
        execution_id: ExecutionId,
        status: ExecutionStatus,
        at: i64,
    },
}

impl ExecutionEvent {
    pub fn started(execution: &Execution, at: i64) -> Self {
        ExecutionEvent::ExecutionStarted {
            execution_id: execution.id.clone(),
            target_count: execution.target_ids.len(),
            at,
        }
    }

    pub fn result_changed(result: &TargetResult, at: i64) -> Self {
        ExecutionEvent::ResultChanged {
            execution_id: result.execution_id.clone(),
            result_id: result.id.clone(),
            target_id: result.target_id.clone(),
            status: result.status,
            exit_code: result.exit_code,
            failure_kind: result.failure_kind,
            at,
        }
    }

    pub fn finished(execution: &Execution, at: i64) -> Self {
        ExecutionEvent::ExecutionFinished {
            execution_id: execution.id.clone(),
            status: execution.status,
            at,
        }
    }

    pub fn execution_id(&self) -> &str {
        match self {
            ExecutionEvent::ExecutionStarted { execution_id, .. }
            | ExecutionEvent::ResultChanged { execution_id, .. }
            | ExecutionEvent::ExecutionFinished { execution_id, .. } => execution_id,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, ExecutionEvent::ExecutionFinished { .. })
    }
}
