// Per-target Result Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::output::{CommandOutput, ExitStatus};
use crate::domain::{ExecutionId, Target, TargetId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub type ResultId = String;

/// Per-target status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Pending,
    Running,
    Success,
    Error,
    Skipped,
}

impl ResultStatus {
    pub const ALL: [ResultStatus; 5] = [
        ResultStatus::Pending,
        ResultStatus::Running,
        ResultStatus::Success,
        ResultStatus::Error,
        ResultStatus::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Pending => "pending",
            ResultStatus::Running => "running",
            ResultStatus::Success => "success",
            ResultStatus::Error => "error",
            ResultStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResultStatus::Success | ResultStatus::Error | ResultStatus::Skipped
        )
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        ResultStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::ValidationError(format!("unknown result status: {}", s)))
    }
}

/// Why a result ended in `error` or `skipped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AuthenticationFailure,
    ConnectFailure,
    ProtocolError,
    Timeout,
    NonZeroExit,
    ExitStatusUnknown,
    TargetResolution,
    Cancelled,
    Interrupted,
    Internal,
}

impl FailureKind {
    pub const ALL: [FailureKind; 10] = [
        FailureKind::AuthenticationFailure,
        FailureKind::ConnectFailure,
        FailureKind::ProtocolError,
        FailureKind::Timeout,
        FailureKind::NonZeroExit,
        FailureKind::ExitStatusUnknown,
        FailureKind::TargetResolution,
        FailureKind::Cancelled,
        FailureKind::Interrupted,
        FailureKind::Internal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::AuthenticationFailure => "authentication_failure",
            FailureKind::ConnectFailure => "connect_failure",
            FailureKind::ProtocolError => "protocol_error",
            FailureKind::Timeout => "timeout",
            FailureKind::NonZeroExit => "non_zero_exit",
            FailureKind::ExitStatusUnknown => "exit_status_unknown",
            FailureKind::TargetResolution => "target_resolution",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Interrupted => "interrupted",
            FailureKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        FailureKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DomainError::ValidationError(format!("unknown failure kind: {}", s)))
    }
}

/// Result Entity (one per target of an execution)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetResult {
    pub id: ResultId,
    pub execution_id: ExecutionId,
    pub position: u32,
    pub target_id: TargetId,

    // Denormalized at submission for display; None when the target was unknown
    pub target_name: Option<String>,
    pub host_address: Option<String>,

    pub status: ResultStatus,
    pub exit_code: Option<i32>,
    pub exit_status_known: bool,
    pub stdout: String,
    pub stderr: String,
    pub output_truncated: bool,
    pub failure_kind: Option<FailureKind>,
    pub error_message: Option<String>,

    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl TargetResult {
    pub fn new_pending(
        id: impl Into<String>,
        execution_id: impl Into<String>,
        position: u32,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            execution_id: execution_id.into(),
            position,
            target_id: target_id.into(),
            target_name: None,
            host_address: None,
            status: ResultStatus::Pending,
            exit_code: None,
            exit_status_known: false,
            stdout: String::new(),
            stderr: String::new(),
            output_truncated: false,
            failure_kind: None,
            error_message: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Copy display fields from the resolved target
    pub fn denormalize(&mut self, target: &Target) {
        self.target_name = Some(target.name.clone());
        self.host_address = Some(target.host.clone());
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        self.ensure(ResultStatus::Pending, ResultStatus::Running)?;
        self.status = ResultStatus::Running;
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// Record a finished command.
    ///
    /// Exit code 0 is `success`; anything else (non-zero, signal, or no exit
    /// report at all) is `error` with the matching failure kind.
    pub fn complete(&mut self, now_millis: i64, output: CommandOutput) -> Result<()> {
        let to = match output.exit {
            ExitStatus::Code(0) => ResultStatus::Success,
            _ => ResultStatus::Error,
        };
        self.ensure(ResultStatus::Running, to)?;

        match &output.exit {
            ExitStatus::Code(0) => {
                self.exit_code = Some(0);
                self.exit_status_known = true;
            }
            ExitStatus::Code(code) => {
                self.exit_code = Some(*code);
                self.exit_status_known = true;
                self.failure_kind = Some(FailureKind::NonZeroExit);
                self.error_message = Some(format!("command exited with status {}", code));
            }
            ExitStatus::Signal(signal) => {
                self.exit_code = None;
                self.exit_status_known = false;
                self.failure_kind = Some(FailureKind::ExitStatusUnknown);
                self.error_message = Some(format!("command terminated by signal {}", signal));
            }
            ExitStatus::Unknown => {
                self.exit_code = Some(0);
                self.exit_status_known = false;
                self.failure_kind = Some(FailureKind::ExitStatusUnknown);
                self.error_message =
                    Some("channel closed without reporting an exit status".to_string());
            }
        }

        self.status = to;
        self.stdout = output.stdout;
        self.stderr = output.stderr;
        self.output_truncated = output.truncated;
        self.completed_at = Some(now_millis);
        Ok(())
    }

    /// Record a failed attempt (the command never produced an outcome)
    pub fn fail(
        &mut self,
        now_millis: i64,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Result<()> {
        self.ensure(ResultStatus::Running, ResultStatus::Error)?;
        self.status = ResultStatus::Error;
        self.failure_kind = Some(kind);
        self.error_message = Some(message.into());
        self.completed_at = Some(now_millis);
        Ok(())
    }

    /// Never attempted (unknown target, cancellation, crash)
    pub fn skip(
        &mut self,
        now_millis: i64,
        kind: FailureKind,
        reason: impl Into<String>,
    ) -> Result<()> {
        self.ensure(ResultStatus::Pending, ResultStatus::Skipped)?;
        self.status = ResultStatus::Skipped;
        self.failure_kind = Some(kind);
        self.error_message = Some(reason.into());
        self.completed_at = Some(now_millis);
        Ok(())
    }

    fn ensure(&self, from: ResultStatus, to: ResultStatus) -> Result<()> {
        if self.status == from {
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

    fn running() -> TargetResult {
        let mut result = TargetResult::new_pending("r-1", "exec-1", 0, "t1");
        result.start(1000).unwrap();
        result
    }

    fn output(exit: ExitStatus) -> CommandOutput {
        CommandOutput {
            exit,
            stdout: "out".to_string(),
            stderr: "err".to_string(),
            truncated: false,
            duration_ms: 5,
        }
    }

    #[test]
    fn test_zero_exit_is_success() {
        let mut result = running();
        result.complete(2000, output(ExitStatus::Code(0))).unwrap();
        assert_eq!(result.status, ResultStatus::Success);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.exit_status_known);
        assert!(result.failure_kind.is_none());
        assert_eq!(result.stdout, "out");
    }

    #[test]
    fn test_non_zero_exit_is_error_with_code() {
        let mut result = running();
        result.complete(2000, output(ExitStatus::Code(2))).unwrap();
        assert_eq!(result.status, ResultStatus::Error);
        assert_eq!(result.exit_code, Some(2));
        assert_eq!(result.failure_kind, Some(FailureKind::NonZeroExit));
        assert_eq!(result.stderr, "err");
    }

    #[test]
    fn test_missing_exit_status_is_flagged() {
        let mut result = running();
        result.complete(2000, output(ExitStatus::Unknown)).unwrap();
        assert_eq!(result.status, ResultStatus::Error);
        assert_eq!(result.exit_code, Some(0));
        assert!(!result.exit_status_known);
        assert_eq!(result.failure_kind, Some(FailureKind::ExitStatusUnknown));
    }

    #[test]
    fn test_signal_names_the_signal() {
        let mut result = running();
        result
            .complete(2000, output(ExitStatus::Signal("KILL".to_string())))
            .unwrap();
        assert_eq!(result.status, ResultStatus::Error);
        assert!(result.exit_code.is_none());
        assert!(result.error_message.unwrap().contains("KILL"));
    }

    #[test]
    fn test_terminal_result_is_immutable() {
        let mut result = running();
        result
            .fail(2000, FailureKind::Timeout, "timed out after 30000ms")
            .unwrap();

        assert!(result.complete(3000, output(ExitStatus::Code(0))).is_err());
        assert!(result.fail(3000, FailureKind::Internal, "again").is_err());
        assert!(result.skip(3000, FailureKind::Cancelled, "late").is_err());
        assert!(result.start(3000).is_err());
        assert_eq!(result.status, ResultStatus::Error);
        assert_eq!(result.failure_kind, Some(FailureKind::Timeout));
        assert_eq!(result.completed_at, Some(2000));
    }

    #[test]
    fn test_skip_only_from_pending() {
        let mut pending = TargetResult::new_pending("r-2", "exec-1", 1, "ghost");
        pending
            .skip(1500, FailureKind::TargetResolution, "target not found")
            .unwrap();
        assert_eq!(pending.status, ResultStatus::Skipped);

        let mut result = running();
        assert!(result.skip(1500, FailureKind::Cancelled, "cancelled").is_err());
    }

    #[test]
    fn test_cannot_complete_without_start() {
        let mut pending = TargetResult::new_pending("r-3", "exec-1", 2, "t3");
        assert!(pending.complete(1000, output(ExitStatus::Code(0))).is_err());
        assert!(pending.fail(1000, FailureKind::Internal, "x").is_err());
    }

    #[test]
    fn test_failure_kind_parse() {
        for kind in FailureKind::ALL {
            assert_eq!(kind.as_str().parse::<FailureKind>().unwrap(), kind);
        }
        assert!("bogus".parse::<FailureKind>().is_err());
    }
}
