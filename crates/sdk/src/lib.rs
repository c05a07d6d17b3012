//! Volley SDK - Rust Client Library
//!
//! Provides a convenient client for the Volley execution daemon.
//!
//! # Example
//!
//! ```no_run
//! use volley_sdk::{SubmitExecutionRequest, VolleyClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect to daemon
//!     let client = VolleyClient::connect("http://127.0.0.1:9527").await?;
//!
//!     // Run `uptime` on two hosts, one at a time
//!     let submitted = client
//!         .submit(SubmitExecutionRequest::new("uptime", ["web-1", "web-2"]).concurrency_limit(1))
//!         .await?;
//!
//!     let detail = client
//!         .wait_for_completion(
//!             &submitted.execution_id,
//!             Duration::from_millis(500),
//!             Duration::from_secs(120),
//!         )
//!         .await?;
//!     for result in detail.results {
//!         println!("{}: {} {:?}", result.target_id, result.status, result.exit_code);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

pub use client::{EventStream, VolleyClient};
pub use error::{Result, SdkError};
pub use types::{
    CancelExecutionResponse, ExecutionEvent, ExecutionView, GetExecutionResponse, Progress,
    ResultView, StatsResponse, SubmitExecutionRequest, SubmitExecutionResponse,
};
