// Domain Layer - Pure business logic and entities

pub mod error;
pub mod event;
pub mod execution;
pub mod output;
pub mod target;
pub mod target_result;

// Re-exports
pub use error::DomainError;
pub use event::ExecutionEvent;
pub use execution::{Execution, ExecutionId, ExecutionStatus};
pub use output::{CappedBuffer, CommandOutput, ExitStatus, MAX_OUTPUT_CHARS};
pub use target::{AuthMaterial, RemoteProtocol, Target, TargetId, DEFAULT_SSH_PORT};
pub use target_result::{FailureKind, ResultId, ResultStatus, TargetResult};
