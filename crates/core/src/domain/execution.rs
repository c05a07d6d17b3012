// Execution Domain Model (one command fanned out over many targets)

use crate::domain::error::{DomainError, Result};
use crate::domain::TargetId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Execution ID (UUID v4)
pub type ExecutionId = String;

/// Batch-level status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl ExecutionStatus {
    pub const ALL: [ExecutionStatus; 5] = [
        ExecutionStatus::Pending,
        ExecutionStatus::Running,
        ExecutionStatus::Completed,
        ExecutionStatus::Cancelled,
        ExecutionStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Cancelled | ExecutionStatus::Failed
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        ExecutionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::ValidationError(format!("unknown execution status: {}", s)))
    }
}

/// Execution Entity
///
/// Owns one [`TargetResult`](crate::domain::TargetResult) per entry in
/// `target_ids`. Only the coordinator moves it past `pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub command: String,
    pub os_hint: Option<String>,
    pub target_ids: Vec<TargetId>,
    pub concurrency_limit: u32,
    pub timeout_ms: i64,

    pub status: ExecutionStatus,
    pub error_message: Option<String>,

    pub created_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl Execution {
    /// Create a pending execution
    ///
    /// # Arguments
    ///
    /// * `id` - Unique execution ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        command: impl Into<String>,
        target_ids: Vec<TargetId>,
        concurrency_limit: u32,
        timeout_ms: i64,
    ) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            os_hint: None,
            target_ids,
            concurrency_limit,
            timeout_ms,
            status: ExecutionStatus::Pending,
            error_message: None,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Transition to Running with explicit timestamp
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        self.ensure_in(&[ExecutionStatus::Pending], ExecutionStatus::Running)?;
        self.status = ExecutionStatus::Running;
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// Transition to Completed (every owned result is terminal)
    pub fn complete(&mut self, now_millis: i64) -> Result<()> {
        self.ensure_in(&[ExecutionStatus::Running], ExecutionStatus::Completed)?;
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(now_millis);
        Ok(())
    }

    pub fn cancel(&mut self, now_millis: i64) -> Result<()> {
        self.ensure_in(
            &[ExecutionStatus::Pending, ExecutionStatus::Running],
            ExecutionStatus::Cancelled,
        )?;
        self.status = ExecutionStatus::Cancelled;
        self.completed_at = Some(now_millis);
        Ok(())
    }

    /// Coordinator-level failure (store unwritable, crash reconciliation)
    pub fn fail(&mut self, now_millis: i64, message: impl Into<String>) -> Result<()> {
        self.ensure_in(
            &[ExecutionStatus::Pending, ExecutionStatus::Running],
            ExecutionStatus::Failed,
        )?;
        self.status = ExecutionStatus::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(now_millis);
        Ok(())
    }

    fn ensure_in(&self, allowed: &[ExecutionStatus], to: ExecutionStatus) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution() -> Execution {
        Execution::new(
            "exec-1",
            1000,
            "uptime",
            vec!["t1".to_string(), "t2".to_string()],
            10,
            30_000,
        )
    }

    #[test]
    fn test_new_execution_is_pending() {
        let exec = execution();
        assert_eq!(exec.status, ExecutionStatus::Pending);
        assert!(exec.started_at.is_none());
        assert!(!exec.is_terminal());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut exec = execution();
        exec.start(2000).unwrap();
        assert_eq!(exec.started_at, Some(2000));
        exec.complete(3000).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.completed_at, Some(3000));
    }

    #[test]
    fn test_cannot_complete_pending() {
        let mut exec = execution();
        let err = exec.complete(2000).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_terminal_is_final() {
        let mut exec = execution();
        exec.start(2000).unwrap();
        exec.cancel(2500).unwrap();

        assert!(exec.start(3000).is_err());
        assert!(exec.complete(3000).is_err());
        assert!(exec.fail(3000, "late").is_err());
        assert_eq!(exec.status, ExecutionStatus::Cancelled);
        assert_eq!(exec.completed_at, Some(2500));
    }

    #[test]
    fn test_fail_records_message() {
        let mut exec = execution();
        exec.fail(1500, "store unavailable").unwrap();
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.error_message.as_deref(), Some("store unavailable"));
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in ExecutionStatus::ALL {
            assert_eq!(status.as_str().parse::<ExecutionStatus>().unwrap(), status);
        }
        assert!("RUNNING".parse::<ExecutionStatus>().is_err());
    }
}
