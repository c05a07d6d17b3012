// Application Layer - Use Cases and Business Logic

pub mod coordinator;
pub mod events;
pub mod recovery;
pub mod submission;

// Re-exports
pub use coordinator::{cancel_channel, CancelHandle, CancelReceipt, CancelToken, Coordinator};
pub use events::EventBus;
pub use recovery::RecoveryService;
pub use submission::{ExecutionDetail, ExecutionService, ExecutionStats, SubmitRequest};
