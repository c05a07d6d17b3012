//! Volley Client Implementation

use crate::error::{Result, SdkError};
use crate::types::{
    CancelExecutionResponse, ExecutionEvent, ExecutionIdRequest, ExecutionView,
    GetExecutionResponse, ListExecutionsRequest, ListExecutionsResponse, StatsResponse,
    SubmitExecutionRequest, SubmitExecutionResponse, SubscribeRequest,
};
use jsonrpsee::core::client::{ClientT, Subscription, SubscriptionClientT};
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use serde::Serialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Send a request struct as named parameters
fn object_params<T: Serialize>(request: &T) -> Result<ObjectParams> {
    let mut params = ObjectParams::new();
    if let serde_json::Value::Object(fields) = serde_json::to_value(request)? {
        for (name, value) in fields {
            params.insert(&name, value)?;
        }
    }
    Ok(params)
}

/// Volley daemon client
///
/// # Example
///
/// ```no_run
/// use volley_sdk::{VolleyClient, SubmitExecutionRequest};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = VolleyClient::connect("http://127.0.0.1:9527").await?;
/// let submitted = client
///     .submit(SubmitExecutionRequest::new("uptime", ["web-1", "web-2"]))
///     .await?;
/// println!("Execution: {}", submitted.execution_id);
/// # Ok(())
/// # }
/// ```
pub struct VolleyClient {
    client: HttpClient,
}

impl VolleyClient {
    /// Connect to the daemon
    ///
    /// # Arguments
    ///
    /// * `url` - RPC endpoint URL (e.g., `http://127.0.0.1:9527`)
    pub async fn connect(url: impl AsRef<str>) -> Result<Self> {
        let url = url.as_ref();

        let client = HttpClientBuilder::default()
            .request_timeout(REQUEST_TIMEOUT)
            .build(url)
            .map_err(|e| SdkError::Connection(format!("Failed to create client: {}", e)))?;

        Ok(Self { client })
    }

    /// Submit a command for a list of targets
    pub async fn submit(&self, request: SubmitExecutionRequest) -> Result<SubmitExecutionResponse> {
        let params = object_params(&request)?;
        let response = self.client.request("execution.submit.v1", params).await?;
        Ok(response)
    }

    /// Current status and per-target results
    pub async fn get(&self, execution_id: impl Into<String>) -> Result<GetExecutionResponse> {
        let params = object_params(&ExecutionIdRequest {
            execution_id: execution_id.into(),
        })?;
        let response = self.client.request("execution.get.v1", params).await?;
        Ok(response)
    }

    /// Most recent executions first
    pub async fn list(&self, limit: Option<u32>) -> Result<Vec<ExecutionView>> {
        let params = object_params(&ListExecutionsRequest { limit })?;
        let response: ListExecutionsResponse =
            self.client.request("execution.list.v1", params).await?;
        Ok(response.executions)
    }

    /// Stop dispatching further targets
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use volley_sdk::VolleyClient;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = VolleyClient::connect("http://127.0.0.1:9527").await?;
    /// let response = client.cancel("exec-123").await?;
    /// assert!(response.cancelled);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn cancel(&self, execution_id: impl Into<String>) -> Result<CancelExecutionResponse> {
        let params = object_params(&ExecutionIdRequest {
            execution_id: execution_id.into(),
        })?;
        let response = self.client.request("execution.cancel.v1", params).await?;
        Ok(response)
    }

    pub async fn stats(&self) -> Result<StatsResponse> {
        let response = self
            .client
            .request("admin.stats.v1", ObjectParams::new())
            .await?;
        Ok(response)
    }

    /// Poll until the execution reaches a terminal status
    pub async fn wait_for_completion(
        &self,
        execution_id: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<GetExecutionResponse> {
        tokio::time::timeout(timeout, self.poll_until_terminal(execution_id, poll_interval))
            .await
            .map_err(|_| {
                SdkError::Timeout(format!(
                    "Execution {} still running after {:?}",
                    execution_id, timeout
                ))
            })?
    }

    async fn poll_until_terminal(
        &self,
        execution_id: &str,
        poll_interval: Duration,
    ) -> Result<GetExecutionResponse> {
        loop {
            let detail = self.get(execution_id).await?;
            if detail.execution.is_terminal() {
                return Ok(detail);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Live progress events over WebSocket
pub struct EventStream {
    // Keeps the connection open for the subscription
    _client: WsClient,
    subscription: Subscription<ExecutionEvent>,
}

impl EventStream {
    /// Subscribe to events, optionally for a single execution.
    ///
    /// `url` is the WebSocket form of the RPC endpoint (`ws://127.0.0.1:9527`).
    /// A per-execution stream ends after its `execution_finished` event.
    pub async fn connect(url: impl AsRef<str>, execution_id: Option<String>) -> Result<Self> {
        let client = WsClientBuilder::default()
            .request_timeout(REQUEST_TIMEOUT)
            .build(url.as_ref())
            .await
            .map_err(|e| SdkError::Connection(format!("Failed to open WebSocket: {}", e)))?;

        let params = object_params(&SubscribeRequest { execution_id })?;
        let subscription = client
            .subscribe(
                "execution.subscribe.v1",
                params,
                "execution.unsubscribe.v1",
            )
            .await?;

        Ok(Self {
            _client: client,
            subscription,
        })
    }

    /// Next event, or `None` once the server closes the stream
    pub async fn next(&mut self) -> Option<Result<ExecutionEvent>> {
        self.subscription
            .next()
            .await
            .map(|event| event.map_err(SdkError::from))
    }
}
