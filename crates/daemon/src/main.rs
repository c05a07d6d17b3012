//! Volley daemon - Main Entry Point
//!
//! Composition root: wires the SQLite store, the target inventory and the SSH
//! channel into the execution service, then serves it over JSON-RPC.

mod config;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::config::DaemonConfig;
use volley_api_rpc::{RpcServer, RpcServerConfig};
use volley_core::application::{Coordinator, EventBus, ExecutionService, RecoveryService};
use volley_core::domain::ExecutionEvent;
use volley_core::port::id_provider::UuidProvider;
use volley_core::port::time_provider::SystemTimeProvider;
use volley_core::port::{IdProvider, TimeProvider};
use volley_infra_remote::{FileInventory, ProtocolRouter, SshChannel};
use volley_infra_sqlite::{create_pool, run_migrations, SqliteExecutionRepository};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration, then logging (config errors go to stderr via anyhow)
    let config = DaemonConfig::load()?;
    let _log_guard = telemetry::init_logging(config.log_format, config.log_directory().as_deref())?;

    info!("Volley daemon v{} starting...", VERSION);

    // 2. Result store
    let database_url = config.database_url();
    if config.db_path != ":memory:" {
        if let Some(parent) = config.db_file().parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    info!(database = %database_url, "Initializing database...");

    let pool = create_pool(&database_url)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 3. DI wiring
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let id_provider: Arc<dyn IdProvider> = Arc::new(UuidProvider);
    let repo = Arc::new(SqliteExecutionRepository::new(pool.clone()));
    let events = EventBus::new(config.event_buffer);

    // 4. Close out executions interrupted by the previous process
    info!("Running crash recovery...");
    let recovery =
        RecoveryService::new(repo.clone(), time_provider.clone()).with_events(events.clone());
    match recovery.recover_interrupted_executions().await {
        Ok(count) => info!(recovered_executions = count, "Crash recovery completed"),
        Err(e) => error!(error = ?e, "Crash recovery failed"),
    }

    // 5. Targets and credentials
    let inventory_path = config.inventory_file();
    let inventory = if inventory_path.exists() {
        Arc::new(FileInventory::load(&inventory_path)?)
    } else {
        warn!(
            path = %inventory_path.display(),
            "Inventory file not found; every target will be skipped"
        );
        Arc::new(FileInventory::empty())
    };

    let channel = Arc::new(ProtocolRouter::new(Arc::new(SshChannel::new(
        config.host_key_policy,
    ))));

    let coordinator = Arc::new(Coordinator::new(
        repo.clone(),
        inventory.clone(),
        inventory.clone(),
        channel,
        time_provider.clone(),
        events.clone(),
    ));

    let service = Arc::new(
        ExecutionService::new(
            repo.clone(),
            repo.clone(),
            inventory,
            coordinator,
            id_provider,
            time_provider,
        )
        .with_default_timeout_ms(config.default_timeout_ms()),
    );

    // 6. Progress log
    tokio::spawn(log_events(events));

    // 7. JSON-RPC server
    info!("Starting JSON-RPC server...");
    let rpc_config = RpcServerConfig {
        host: config.rpc_host.clone(),
        port: config.rpc_port,
    };
    let (addr, rpc_handle) = RpcServer::new(rpc_config, service.clone())
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(addr = %addr, "System ready. Waiting for executions...");
    info!("Press Ctrl+C to shutdown");

    // 8. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Cancelling in-flight executions...");

    // 9. Graceful shutdown: stop dispatch first so results settle before the
    // server goes away
    let remaining = service
        .shutdown(Duration::from_secs(config.shutdown_grace_secs))
        .await;
    if remaining > 0 {
        warn!(remaining, "Exiting with executions still settling");
    }
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    rpc_handle.stopped().await;
    pool.close().await;

    info!("Shutdown complete.");

    Ok(())
}

/// Mirror bus events into the log
async fn log_events(events: EventBus) {
    let mut rx = events.subscribe();
    loop {
        match rx.recv().await {
            Ok(ExecutionEvent::ExecutionStarted {
                execution_id,
                target_count,
                ..
            }) => info!(execution_id = %execution_id, target_count, "Execution started"),
            Ok(ExecutionEvent::ResultChanged {
                execution_id,
                target_id,
                status,
                failure_kind,
                ..
            }) => debug!(
                execution_id = %execution_id,
                target_id = %target_id,
                status = %status,
                failure_kind = ?failure_kind,
                "Target result changed"
            ),
            Ok(ExecutionEvent::ExecutionFinished {
                execution_id,
                status,
                ..
            }) => info!(execution_id = %execution_id, status = %status, "Execution finished"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
