//! JSON-RPC round trips through the SDK against a live server on an
//! ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use volley_api_rpc::{RpcServer, RpcServerConfig, ServerHandle};
use volley_core::application::{Coordinator, EventBus, ExecutionService};
use volley_core::domain::{AuthMaterial, Target};
use volley_core::port::credential_resolver::mocks::StaticCredentialResolver;
use volley_core::port::id_provider::UuidProvider;
use volley_core::port::remote_channel::mocks::{ScriptedBehavior, ScriptedChannel};
use volley_core::port::target_registry::mocks::StaticTargetRegistry;
use volley_core::port::time_provider::SystemTimeProvider;
use volley_infra_sqlite::{create_pool, run_migrations, SqliteExecutionRepository};
use volley_sdk::{EventStream, ExecutionEvent, SdkError, SubmitExecutionRequest, VolleyClient};

const WAIT: Duration = Duration::from_secs(10);
const POLL: Duration = Duration::from_millis(20);

struct Daemon {
    addr: std::net::SocketAddr,
    handle: ServerHandle,
}

async fn start_daemon(channel: ScriptedChannel) -> Daemon {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    let repo = Arc::new(SqliteExecutionRepository::new(pool));
    let registry = Arc::new(StaticTargetRegistry::new([
        Target::new("web-1", "10.0.0.1", "deploy"),
        Target::new("web-2", "10.0.0.2", "deploy"),
        Target::new("db-1", "10.0.0.9", "deploy"),
    ]));
    let time = Arc::new(SystemTimeProvider);
    let coordinator = Arc::new(Coordinator::new(
        repo.clone(),
        registry.clone(),
        Arc::new(StaticCredentialResolver::for_all(AuthMaterial::Agent)),
        Arc::new(channel),
        time.clone(),
        EventBus::new(256),
    ));
    let service = Arc::new(ExecutionService::new(
        repo.clone(),
        repo,
        registry,
        coordinator,
        Arc::new(UuidProvider),
        time,
    ));

    let config = RpcServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
    };
    let (addr, handle) = RpcServer::new(config, service).start().await.unwrap();
    Daemon { addr, handle }
}

impl Daemon {
    fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }
}

#[tokio::test]
async fn test_submit_wait_and_inspect() {
    let daemon = start_daemon(ScriptedChannel::succeeding().with_host(
        "10.0.0.9",
        ScriptedBehavior::Exit {
            code: 3,
            stdout: "degraded\n".to_string(),
        },
    ))
    .await;
    let client = VolleyClient::connect(daemon.http_url()).await.unwrap();

    let submitted = client
        .submit(
            SubmitExecutionRequest::new("check-health", ["web-1", "web-2", "db-1"])
                .concurrency_limit(2),
        )
        .await
        .unwrap();
    assert_eq!(submitted.status, "pending");
    assert_eq!(submitted.target_count, 3);

    let detail = client
        .wait_for_completion(&submitted.execution_id, POLL, WAIT)
        .await
        .unwrap();
    assert_eq!(detail.execution.status, "completed");
    assert_eq!(detail.execution.concurrency_limit, 2);
    assert_eq!(detail.progress.success, 2);
    assert_eq!(detail.progress.error, 1);

    let db = &detail.results[2];
    assert_eq!(db.target_id, "db-1");
    assert_eq!(db.exit_code, Some(3));
    assert_eq!(db.failure_kind.as_deref(), Some("non_zero_exit"));
    assert_eq!(db.stdout, "degraded\n");

    let listed = client.list(None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].execution_id, submitted.execution_id);

    let stats = client.stats().await.unwrap();
    assert_eq!(stats.executions.get("completed"), Some(&1));
    assert_eq!(stats.results.get("success"), Some(&2));
    assert_eq!(stats.active_executions, 0);

    daemon.handle.stop().unwrap();
}

#[tokio::test]
async fn test_error_codes_reach_the_client() {
    let daemon = start_daemon(ScriptedChannel::succeeding()).await;
    let client = VolleyClient::connect(daemon.http_url()).await.unwrap();

    let empty: [&str; 0] = [];
    let err = client
        .submit(SubmitExecutionRequest::new("uptime", empty))
        .await
        .unwrap_err();
    assert!(matches!(err, SdkError::Rpc { code: 4000, .. }));

    let err = client.get("no-such-execution").await.unwrap_err();
    assert!(matches!(err, SdkError::Rpc { code: 4001, .. }));

    let submitted = client
        .submit(SubmitExecutionRequest::new("uptime", ["web-1"]))
        .await
        .unwrap();
    client
        .wait_for_completion(&submitted.execution_id, POLL, WAIT)
        .await
        .unwrap();
    let err = client.cancel(&submitted.execution_id).await.unwrap_err();
    assert!(matches!(err, SdkError::Rpc { code: 4002, .. }));

    daemon.handle.stop().unwrap();
}

#[tokio::test]
async fn test_cancel_over_rpc() {
    let daemon =
        start_daemon(ScriptedChannel::succeeding().with_delay(Duration::from_millis(300))).await;
    let client = VolleyClient::connect(daemon.http_url()).await.unwrap();

    let submitted = client
        .submit(
            SubmitExecutionRequest::new("sleep 1", ["web-1", "web-2", "db-1"]).concurrency_limit(1),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let cancelled = client.cancel(&submitted.execution_id).await.unwrap();
    assert!(cancelled.cancelled);

    let detail = client
        .wait_for_completion(&submitted.execution_id, POLL, WAIT)
        .await
        .unwrap();
    assert_eq!(detail.execution.status, "cancelled");
    assert_eq!(detail.progress.success, 1);
    assert_eq!(detail.progress.skipped, 2);

    daemon.handle.stop().unwrap();
}

#[tokio::test]
async fn test_event_stream_follows_one_execution() {
    let daemon =
        start_daemon(ScriptedChannel::succeeding().with_delay(Duration::from_millis(200))).await;
    let client = VolleyClient::connect(daemon.http_url()).await.unwrap();

    let submitted = client
        .submit(SubmitExecutionRequest::new("uptime", ["web-1", "web-2"]))
        .await
        .unwrap();
    let mut stream = EventStream::connect(daemon.ws_url(), Some(submitted.execution_id.clone()))
        .await
        .unwrap();

    let collect = async {
        let mut seen = Vec::new();
        while let Some(event) = stream.next().await {
            let event = event.unwrap();
            let done = matches!(event, ExecutionEvent::ExecutionFinished { .. });
            seen.push(event);
            if done {
                break;
            }
        }
        seen
    };
    let events = tokio::time::timeout(WAIT, collect).await.unwrap();

    assert!(events
        .iter()
        .all(|e| e.execution_id() == submitted.execution_id));
    match events.last() {
        Some(ExecutionEvent::ExecutionFinished { status, .. }) => assert_eq!(status, "completed"),
        other => panic!("expected execution_finished, got {:?}", other),
    }
    let successes = events
        .iter()
        .filter(|e| {
            matches!(e, ExecutionEvent::ResultChanged { status, .. } if status == "success")
        })
        .count();
    assert_eq!(successes, 2);

    daemon.handle.stop().unwrap();
}

#[tokio::test]
async fn test_late_subscriber_gets_final_event() {
    let daemon = start_daemon(ScriptedChannel::succeeding()).await;
    let client = VolleyClient::connect(daemon.http_url()).await.unwrap();

    let submitted = client
        .submit(SubmitExecutionRequest::new("uptime", ["web-1"]))
        .await
        .unwrap();
    client
        .wait_for_completion(&submitted.execution_id, POLL, WAIT)
        .await
        .unwrap();

    let mut stream = EventStream::connect(daemon.ws_url(), Some(submitted.execution_id.clone()))
        .await
        .unwrap();
    let event = tokio::time::timeout(WAIT, stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(
        event,
        ExecutionEvent::ExecutionFinished { ref status, .. } if status == "completed"
    ));

    daemon.handle.stop().unwrap();
}
