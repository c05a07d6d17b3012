// Coordinator unit tests (in-memory store, scripted channel)

use super::*;
use crate::application::submission::{submit, SubmitRequest};
use crate::domain::{AuthMaterial, Target};
use crate::port::credential_resolver::mocks::StaticCredentialResolver;
use crate::port::execution_repository::mocks::InMemoryExecutionRepository;
use crate::port::id_provider::mocks::SequentialIdProvider;
use crate::port::remote_channel::mocks::{ScriptedBehavior, ScriptedChannel};
use crate::port::target_registry::mocks::StaticTargetRegistry;
use crate::port::time_provider::mocks::SteppingClock;

struct Harness {
    repo: Arc<InMemoryExecutionRepository>,
    registry: Arc<StaticTargetRegistry>,
    channel: Arc<ScriptedChannel>,
    coordinator: Coordinator,
}

/// `n` targets `t0..tn` on hosts `host-0..host-n`
fn harness(n: usize, channel: ScriptedChannel, credentials: StaticCredentialResolver) -> Harness {
    let repo = Arc::new(InMemoryExecutionRepository::new());
    let registry = Arc::new(StaticTargetRegistry::new(
        (0..n).map(|i| Target::new(format!("t{}", i), format!("host-{}", i), "ops")),
    ));
    let channel = Arc::new(channel);
    let coordinator = Coordinator::new(
        repo.clone(),
        registry.clone(),
        Arc::new(credentials),
        channel.clone(),
        Arc::new(SteppingClock::new(1_000, 1)),
        EventBus::new(256),
    );
    Harness {
        repo,
        registry,
        channel,
        coordinator,
    }
}

fn agent_for_all() -> StaticCredentialResolver {
    StaticCredentialResolver::for_all(AuthMaterial::Agent)
}

fn target_ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("t{}", i)).collect()
}

async fn seed(h: &Harness, targets: Vec<String>, limit: u32, timeout_ms: i64) -> String {
    let req = SubmitRequest::new("hostname", targets)
        .with_concurrency_limit(limit)
        .with_timeout_ms(timeout_ms);
    submit::execute(
        h.repo.as_ref(),
        h.registry.as_ref(),
        &SequentialIdProvider::new("id"),
        &SteppingClock::new(500, 1),
        req,
        timeout_ms,
    )
    .await
    .unwrap()
}

async fn run(h: &Harness, execution_id: &str) -> Result<ExecutionStatus> {
    let (_handle, token) = cancel_channel();
    h.coordinator.run(execution_id, token).await
}

#[tokio::test]
async fn test_all_targets_succeed() {
    let h = harness(3, ScriptedChannel::succeeding(), agent_for_all());
    let id = seed(&h, target_ids(3), 10, 5_000).await;

    assert_eq!(run(&h, &id).await.unwrap(), ExecutionStatus::Completed);

    let execution = h.repo.find_execution(&id).await.unwrap().unwrap();
    assert!(execution.started_at.is_some());
    assert!(execution.completed_at.is_some());

    let results = h.repo.find_results(&id).await.unwrap();
    assert!(results.iter().all(|r| r.status == ResultStatus::Success));
    assert!(results.iter().all(|r| r.exit_code == Some(0)));
}

#[tokio::test]
async fn test_running_never_exceeds_limit() {
    let channel = ScriptedChannel::succeeding().with_delay(Duration::from_millis(20));
    let h = harness(25, channel, agent_for_all());
    let id = seed(&h, target_ids(25), 10, 5_000).await;

    assert_eq!(run(&h, &id).await.unwrap(), ExecutionStatus::Completed);

    assert_eq!(h.repo.max_running(), 10);
    assert!(h.channel.max_in_flight() <= 10);
    assert_eq!(h.channel.call_count(), 25);
    let results = h.repo.find_results(&id).await.unwrap();
    assert!(results.iter().all(|r| r.status == ResultStatus::Success));
}

#[tokio::test]
async fn test_targets_start_in_submission_order() {
    let h = harness(5, ScriptedChannel::succeeding(), agent_for_all());
    let id = seed(&h, target_ids(5), 1, 5_000).await;

    run(&h, &id).await.unwrap();

    let expected: Vec<String> = (0..5).map(|i| format!("host-{}", i)).collect();
    assert_eq!(h.channel.calls(), expected);
}

#[tokio::test]
async fn test_failures_are_isolated_per_target() {
    let channel = ScriptedChannel::succeeding()
        .with_host(
            "host-1",
            ScriptedBehavior::Fail(ChannelError::AuthenticationFailure("denied".into())),
        )
        .with_host(
            "host-2",
            ScriptedBehavior::Fail(ChannelError::ConnectFailure("refused".into())),
        )
        .with_host(
            "host-3",
            ScriptedBehavior::Exit {
                code: 3,
                stdout: String::new(),
            },
        )
        .with_host("host-4", ScriptedBehavior::Panic("channel bug".into()))
        .with_host("host-5", ScriptedBehavior::NoExitStatus)
        .with_host("host-6", ScriptedBehavior::Signal("TERM".into()));
    let h = harness(7, channel, agent_for_all());
    let id = seed(&h, target_ids(7), 3, 5_000).await;

    assert_eq!(run(&h, &id).await.unwrap(), ExecutionStatus::Completed);

    let results = h.repo.find_results(&id).await.unwrap();
    assert_eq!(results[0].status, ResultStatus::Success);

    let expect = [
        (1, FailureKind::AuthenticationFailure),
        (2, FailureKind::ConnectFailure),
        (3, FailureKind::NonZeroExit),
        (4, FailureKind::Internal),
        (5, FailureKind::ExitStatusUnknown),
        (6, FailureKind::ExitStatusUnknown),
    ];
    for (i, kind) in expect {
        assert_eq!(results[i].status, ResultStatus::Error, "target {}", i);
        assert_eq!(results[i].failure_kind, Some(kind), "target {}", i);
    }
    assert_eq!(results[3].exit_code, Some(3));
    assert!(results[4].error_message.as_ref().unwrap().contains("channel bug"));
    assert!(!results[5].exit_status_known);
}

#[tokio::test]
async fn test_unknown_target_is_skipped() {
    let h = harness(2, ScriptedChannel::succeeding(), agent_for_all());
    let targets = vec!["t0".to_string(), "ghost".to_string(), "t1".to_string()];
    let id = seed(&h, targets, 2, 5_000).await;

    assert_eq!(run(&h, &id).await.unwrap(), ExecutionStatus::Completed);

    let results = h.repo.find_results(&id).await.unwrap();
    assert_eq!(results[1].status, ResultStatus::Skipped);
    assert_eq!(results[1].failure_kind, Some(FailureKind::TargetResolution));
    assert_eq!(results[0].status, ResultStatus::Success);
    assert_eq!(results[2].status, ResultStatus::Success);
    assert_eq!(h.channel.call_count(), 2);
}

#[tokio::test]
async fn test_missing_credential_fails_without_connecting() {
    let credentials = StaticCredentialResolver::default()
        .with_target("t0", AuthMaterial::Password("pw".to_string()));
    let h = harness(2, ScriptedChannel::succeeding(), credentials);
    let id = seed(&h, target_ids(2), 2, 5_000).await;

    run(&h, &id).await.unwrap();

    let results = h.repo.find_results(&id).await.unwrap();
    assert_eq!(results[0].status, ResultStatus::Success);
    assert_eq!(results[1].status, ResultStatus::Error);
    assert_eq!(results[1].failure_kind, Some(FailureKind::AuthenticationFailure));
    assert_eq!(h.channel.calls(), vec!["host-0".to_string()]);
}

#[tokio::test]
async fn test_hung_target_times_out() {
    let channel = ScriptedChannel::succeeding().with_host("host-0", ScriptedBehavior::Hang);
    let h = harness(2, channel, agent_for_all());
    let id = seed(&h, target_ids(2), 2, 1_000).await;

    assert_eq!(run(&h, &id).await.unwrap(), ExecutionStatus::Completed);

    let results = h.repo.find_results(&id).await.unwrap();
    assert_eq!(results[0].failure_kind, Some(FailureKind::Timeout));
    assert_eq!(results[1].status, ResultStatus::Success);
}

#[tokio::test]
async fn test_output_is_capped() {
    let channel = ScriptedChannel::succeeding().with_host(
        "host-0",
        ScriptedBehavior::Flood {
            chars: crate::domain::MAX_OUTPUT_CHARS + 5_000,
        },
    );
    let h = harness(1, channel, agent_for_all());
    let id = seed(&h, target_ids(1), 1, 5_000).await;

    run(&h, &id).await.unwrap();

    let result = &h.repo.find_results(&id).await.unwrap()[0];
    assert_eq!(result.status, ResultStatus::Success);
    assert_eq!(result.stdout.chars().count(), crate::domain::MAX_OUTPUT_CHARS);
    assert!(result.output_truncated);
}

#[tokio::test]
async fn test_cancel_before_dispatch_skips_everything() {
    let h = harness(3, ScriptedChannel::succeeding(), agent_for_all());
    let id = seed(&h, target_ids(3), 1, 5_000).await;

    let (handle, token) = cancel_channel();
    handle.cancel();
    assert_eq!(
        h.coordinator.run(&id, token).await.unwrap(),
        ExecutionStatus::Cancelled
    );

    let results = h.repo.find_results(&id).await.unwrap();
    assert!(results.iter().all(|r| {
        r.status == ResultStatus::Skipped && r.failure_kind == Some(FailureKind::Cancelled)
    }));
    assert_eq!(h.channel.call_count(), 0);
}

#[tokio::test]
async fn test_cancel_drains_in_flight_targets() {
    let channel = ScriptedChannel::succeeding().with_delay(Duration::from_millis(150));
    let h = Arc::new(harness(6, channel, agent_for_all()));
    let id = seed(&h, target_ids(6), 2, 5_000).await;

    let (handle, token) = cancel_channel();
    let runner = {
        let h = Arc::clone(&h);
        let id = id.clone();
        tokio::spawn(async move { h.coordinator.run(&id, token).await })
    };
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(handle.request().skipped_any().await);

    assert_eq!(runner.await.unwrap().unwrap(), ExecutionStatus::Cancelled);

    let results = h.repo.find_results(&id).await.unwrap();
    let success = results.iter().filter(|r| r.status == ResultStatus::Success).count();
    let skipped = results.iter().filter(|r| r.status == ResultStatus::Skipped).count();
    assert_eq!(success, 2);
    assert_eq!(skipped, 4);
    assert!(results.iter().all(|r| r.is_terminal()));
}

#[tokio::test]
async fn test_cancel_after_every_target_started_completes() {
    let channel = ScriptedChannel::succeeding().with_delay(Duration::from_millis(150));
    let h = Arc::new(harness(2, channel, agent_for_all()));
    let id = seed(&h, target_ids(2), 2, 5_000).await;

    let (handle, token) = cancel_channel();
    let runner = {
        let h = Arc::clone(&h);
        let id = id.clone();
        tokio::spawn(async move { h.coordinator.run(&id, token).await })
    };
    tokio::time::sleep(Duration::from_millis(40)).await;
    let receipt = handle.request();

    assert!(!receipt.skipped_any().await);
    assert_eq!(runner.await.unwrap().unwrap(), ExecutionStatus::Completed);

    let results = h.repo.find_results(&id).await.unwrap();
    assert!(results.iter().all(|r| r.status == ResultStatus::Success));
    let execution = h.repo.find_execution(&id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn test_store_failure_marks_execution_failed() {
    let h = harness(2, ScriptedChannel::succeeding(), agent_for_all());
    let id = seed(&h, target_ids(2), 2, 5_000).await;
    h.repo.fail_result_writes(true);

    let err = run(&h, &id).await.unwrap_err();
    assert!(matches!(err, AppError::Database(_)));

    let execution = h.repo.find_execution(&id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.error_message.unwrap().contains("injected"));
}

#[tokio::test]
async fn test_terminal_execution_is_not_redispatched() {
    let h = harness(1, ScriptedChannel::succeeding(), agent_for_all());
    let id = seed(&h, target_ids(1), 1, 5_000).await;

    run(&h, &id).await.unwrap();
    assert_eq!(run(&h, &id).await.unwrap(), ExecutionStatus::Completed);
    assert_eq!(h.channel.call_count(), 1);
}

#[tokio::test]
async fn test_events_bracket_the_execution() {
    let h = harness(2, ScriptedChannel::succeeding(), agent_for_all());
    let mut events = h.coordinator.events().subscribe();
    let id = seed(&h, target_ids(2), 2, 5_000).await;

    run(&h, &id).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(ExecutionEvent::ExecutionStarted { .. })));
    assert!(matches!(
        seen.last(),
        Some(ExecutionEvent::ExecutionFinished {
            status: ExecutionStatus::Completed,
            ..
        })
    ));
    // running + terminal for each target
    let changes = seen
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::ResultChanged { .. }))
        .count();
    assert_eq!(changes, 4);
    assert!(seen.iter().all(|e| e.execution_id() == id));
}
