//! JSON-RPC Server
//!
//! Serves JSON-RPC 2.0 over HTTP and WebSocket on a localhost TCP port.

use crate::handler::RpcHandler;
use crate::types::{
    CancelExecutionRequest, GetExecutionRequest, ListExecutionsRequest, StatsRequest,
    SubmitExecutionRequest, SubscribeRequest,
};
use jsonrpsee::core::SubscriptionResult;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::{PendingSubscriptionSink, RpcModule, SubscriptionMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use volley_core::application::ExecutionService;

// ADR-020: RPC Server Configuration
pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9527;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, service: Arc<ExecutionService>) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(service)),
        }
    }

    /// Start the JSON-RPC server
    ///
    /// Returns the bound address (useful with port 0) and the server handle.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let module = self.into_module()?;

        info!(addr = %local_addr, "JSON-RPC server started successfully");

        let handle = server.start(module);
        Ok((local_addr, handle))
    }

    fn into_module(self) -> Result<RpcModule<()>, String> {
        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("execution.submit.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: SubmitExecutionRequest = params.parse()?;
                    handler.submit(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("execution.get.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: GetExecutionRequest = params.parse()?;
                    handler.get(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("execution.list.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: Option<ListExecutionsRequest> = params.parse()?;
                    handler.list(req.unwrap_or_default()).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("execution.cancel.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: CancelExecutionRequest = params.parse()?;
                    handler.cancel(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        // Admin APIs
        let handler = self.handler.clone();
        module
            .register_async_method("admin.stats.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: Option<StatsRequest> = params.parse()?;
                    handler.stats(req.unwrap_or(StatsRequest {})).await
                }
            })
            .map_err(|e| e.to_string())?;

        // Push notifications
        let handler = self.handler.clone();
        module
            .register_subscription(
                "execution.subscribe.v1",
                "execution.event",
                "execution.unsubscribe.v1",
                move |params, pending, _, _| {
                    let handler = handler.clone();
                    async move {
                        let req = match params.parse::<Option<SubscribeRequest>>() {
                            Ok(req) => req.unwrap_or_default(),
                            Err(e) => {
                                pending.reject(e).await;
                                return Ok(());
                            }
                        };
                        forward_events(handler, req, pending).await
                    }
                },
            )
            .map_err(|e| e.to_string())?;

        Ok(module)
    }
}

/// Push bus events to one subscriber until it leaves (or, when filtered to a
/// single execution, until that execution finishes).
async fn forward_events(
    handler: Arc<RpcHandler>,
    req: SubscribeRequest,
    pending: PendingSubscriptionSink,
) -> SubscriptionResult {
    // Subscribe before the status check so no event falls in between
    let mut events = handler.subscribe();

    let already_finished = match &req.execution_id {
        Some(execution_id) => match handler.finished_event(execution_id).await {
            Ok(event) => event,
            Err(e) => {
                pending.reject(e).await;
                return Ok(());
            }
        },
        None => None,
    };

    let sink = pending.accept().await?;
    debug!(execution_id = ?req.execution_id, "Subscriber attached");

    if let Some(event) = already_finished {
        sink.send(SubscriptionMessage::from_json(&event)?).await?;
        return Ok(());
    }

    loop {
        tokio::select! {
            _ = sink.closed() => break,
            received = events.recv() => match received {
                Ok(event) => {
                    if let Some(wanted) = &req.execution_id {
                        if event.execution_id() != wanted {
                            continue;
                        }
                    }
                    sink.send(SubscriptionMessage::from_json(&event)?).await?;
                    if req.execution_id.is_some() && event.is_final() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged; events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    debug!(execution_id = ?req.execution_id, "Subscriber detached");
    Ok(())
}
