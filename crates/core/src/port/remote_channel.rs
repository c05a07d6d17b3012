// Remote Command Channel Port
// One non-interactive session per target: connect, authenticate, exec, drain, close

use crate::domain::{AuthMaterial, CommandOutput, FailureKind, Target};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Classified channel errors. Any of these is recorded on the target's
/// result only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("Connection failed: {0}")]
    ConnectFailure(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),
}

impl ChannelError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ChannelError::AuthenticationFailure(_) => FailureKind::AuthenticationFailure,
            ChannelError::ConnectFailure(_) => FailureKind::ConnectFailure,
            ChannelError::ProtocolError(_) => FailureKind::ProtocolError,
            ChannelError::Timeout(_) => FailureKind::Timeout,
        }
    }
}

/// Remote Channel trait
///
/// Implementations:
/// - SshChannel: russh client session (infra-remote)
/// - ScriptedChannel: canned outcomes per host (tests)
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Run `command` on `target` and collect its outcome.
    ///
    /// `timeout` is wall-clock from connection start. The session is torn
    /// down on every return path.
    async fn run(
        &self,
        target: &Target,
        auth: &AuthMaterial,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ChannelError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::{CappedBuffer, ExitStatus, MAX_OUTPUT_CHARS};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Scripted outcome for one host
    #[derive(Debug, Clone)]
    pub enum ScriptedBehavior {
        /// Exit with the given code and stdout
        Exit { code: i32, stdout: String },
        /// Close without an exit status
        NoExitStatus,
        /// Terminated by signal
        Signal(String),
        /// Return a classified error
        Fail(ChannelError),
        /// Panic inside the channel task
        Panic(String),
        /// Never answer; reports Timeout once the caller's timeout elapses
        Hang,
        /// Emit `chars` bytes of stdout (to exercise the cap)
        Flood { chars: usize },
    }

    impl ScriptedBehavior {
        pub fn ok(stdout: impl Into<String>) -> Self {
            ScriptedBehavior::Exit {
                code: 0,
                stdout: stdout.into(),
            }
        }
    }

    /// Channel double keyed by target host
    pub struct ScriptedChannel {
        behaviors: HashMap<String, ScriptedBehavior>,
        default: ScriptedBehavior,
        delay: Duration,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedChannel {
        pub fn new(default: ScriptedBehavior) -> Self {
            Self {
                behaviors: HashMap::new(),
                default,
                delay: Duration::ZERO,
                in_flight: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn succeeding() -> Self {
            Self::new(ScriptedBehavior::ok("ok\n"))
        }

        pub fn with_host(mut self, host: impl Into<String>, behavior: ScriptedBehavior) -> Self {
            self.behaviors.insert(host.into(), behavior);
            self
        }

        /// Simulated network latency before the outcome
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// Hosts in the order `run` was entered
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn max_in_flight(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    struct InFlight(Arc<AtomicUsize>);

    impl Drop for InFlight {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl RemoteChannel for ScriptedChannel {
        async fn run(
            &self,
            target: &Target,
            _auth: &AuthMaterial,
            _command: &str,
            timeout: Duration,
        ) -> Result<CommandOutput, ChannelError> {
            self.calls.lock().unwrap().push(target.host.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(Arc::clone(&self.in_flight));

            let behavior = self
                .behaviors
                .get(&target.host)
                .unwrap_or(&self.default)
                .clone();

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay.min(timeout)).await;
                if self.delay > timeout {
                    return Err(ChannelError::Timeout(timeout.as_millis() as u64));
                }
            }

            let output = |exit: ExitStatus, stdout: String| CommandOutput {
                exit,
                stdout,
                stderr: String::new(),
                truncated: false,
                duration_ms: self.delay.as_millis() as i64,
            };

            match behavior {
                ScriptedBehavior::Exit { code, stdout } => {
                    Ok(output(ExitStatus::Code(code), stdout))
                }
                ScriptedBehavior::NoExitStatus => Ok(output(ExitStatus::Unknown, String::new())),
                ScriptedBehavior::Signal(sig) => Ok(output(ExitStatus::Signal(sig), String::new())),
                ScriptedBehavior::Fail(err) => Err(err),
                ScriptedBehavior::Panic(msg) => {
                    panic!("{}", msg);
                }
                ScriptedBehavior::Hang => {
                    tokio::time::sleep(timeout).await;
                    Err(ChannelError::Timeout(timeout.as_millis() as u64))
                }
                ScriptedBehavior::Flood { chars } => {
                    let mut buf = CappedBuffer::new(MAX_OUTPUT_CHARS);
                    let chunk = [b'y'; 4096];
                    let mut left = chars;
                    while left > 0 {
                        let n = left.min(chunk.len());
                        buf.push(&chunk[..n]);
                        left -= n;
                    }
                    let (stdout, truncated) = buf.finish();
                    let mut out = output(ExitStatus::Code(0), stdout);
                    out.truncated = truncated;
                    Ok(out)
                }
            }
        }
    }
}
