// SSH channel implementation
// reason: russh for a pure-tokio SSH client that reports missing exit status (ADR-001)
use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::{self, PrivateKeyWithHashAlg, PublicKey};
use russh::{ChannelMsg, Disconnect};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use volley_core::domain::{AuthMaterial, CappedBuffer, CommandOutput, ExitStatus, Target};
use volley_core::port::{ChannelError, RemoteChannel};

/// SSH extended-data stream number for stderr
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// How server host keys are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// Trust whatever key the server presents
    #[default]
    AcceptAny,
    /// Require a matching entry in `~/.ssh/known_hosts`
    KnownHosts,
}

impl std::str::FromStr for HostKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept_any" => Ok(HostKeyPolicy::AcceptAny),
            "known_hosts" => Ok(HostKeyPolicy::KnownHosts),
            _ => Err(format!("Invalid host key policy: {}", s)),
        }
    }
}

/// russh callbacks for one session
struct SessionHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl client::Handler for SessionHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        match self.policy {
            HostKeyPolicy::AcceptAny => Ok(true),
            HostKeyPolicy::KnownHosts => {
                match keys::check_known_hosts(&self.host, self.port, server_public_key) {
                    Ok(true) => Ok(true),
                    Ok(false) => {
                        warn!(host = %self.host, port = self.port, "Host key not in known_hosts");
                        Ok(false)
                    }
                    Err(e) => {
                        warn!(
                            host = %self.host,
                            port = self.port,
                            error = %e,
                            "Host key verification failed"
                        );
                        Ok(false)
                    }
                }
            }
        }
    }
}

/// Collected session output before it becomes a `CommandOutput`
struct Drained {
    exit: ExitStatus,
    stdout: CappedBuffer,
    stderr: CappedBuffer,
}

/// SSH remote channel
///
/// One TCP connection, one authenticated session and one `exec` channel per
/// call. No pty is requested.
pub struct SshChannel {
    config: Arc<client::Config>,
    host_key_policy: HostKeyPolicy,
}

impl SshChannel {
    /// Create a new SSH channel
    ///
    /// # Example
    /// ```ignore
    /// let channel = SshChannel::new(HostKeyPolicy::KnownHosts);
    /// ```
    pub fn new(host_key_policy: HostKeyPolicy) -> Self {
        Self {
            config: Arc::new(client::Config::default()),
            host_key_policy,
        }
    }

    pub fn host_key_policy(&self) -> HostKeyPolicy {
        self.host_key_policy
    }

    /// Open TCP and complete the SSH handshake
    async fn connect(&self, target: &Target) -> Result<Handle<SessionHandler>, ChannelError> {
        let stream = TcpStream::connect((target.host.as_str(), target.port))
            .await
            .map_err(|e| ChannelError::ConnectFailure(format!("{}: {}", target.address(), e)))?;

        let handler = SessionHandler {
            host: target.host.clone(),
            port: target.port,
            policy: self.host_key_policy,
        };

        client::connect_stream(Arc::clone(&self.config), stream, handler)
            .await
            .map_err(|e| match e {
                russh::Error::UnknownKey => ChannelError::ConnectFailure(format!(
                    "{}: host key rejected",
                    target.address()
                )),
                other => ChannelError::ConnectFailure(format!("{}: {}", target.address(), other)),
            })
    }

    /// Full session lifecycle; the caller owns the timeout
    async fn session(
        &self,
        target: &Target,
        auth: &AuthMaterial,
        command: &str,
    ) -> Result<CommandOutput, ChannelError> {
        let started = Instant::now();
        let mut session = self.connect(target).await?;

        let outcome: Result<Drained, ChannelError> = async {
            authenticate(&mut session, &target.username, auth).await?;
            debug!(host = %target.host, method = auth.method(), "Authenticated");
            exec_and_drain(&session, command).await
        }
        .await;

        if let Err(e) = session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!(host = %target.host, error = %e, "Disconnect failed");
        }

        let drained = outcome?;
        let (stdout, stdout_truncated) = drained.stdout.finish();
        let (stderr, stderr_truncated) = drained.stderr.finish();

        Ok(CommandOutput {
            exit: drained.exit,
            stdout,
            stderr,
            truncated: stdout_truncated || stderr_truncated,
            duration_ms: started.elapsed().as_millis() as i64,
        })
    }
}

#[async_trait]
impl RemoteChannel for SshChannel {
    async fn run(
        &self,
        target: &Target,
        auth: &AuthMaterial,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ChannelError> {
        info!(
            target_id = %target.id,
            host = %target.address(),
            username = %target.username,
            timeout_ms = timeout.as_millis() as u64,
            "Starting remote command"
        );

        // Dropping the session future on expiry closes the transport
        let session = self.session(target, auth, command);
        let result = match tokio::time::timeout(timeout, session).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout(timeout.as_millis() as u64)),
        };

        match &result {
            Ok(output) => info!(
                target_id = %target.id,
                exit = ?output.exit,
                duration_ms = output.duration_ms,
                truncated = output.truncated,
                "Remote command finished"
            ),
            Err(e) => warn!(target_id = %target.id, error = %e, "Remote command failed"),
        }
        result
    }
}

async fn authenticate(
    session: &mut Handle<SessionHandler>,
    username: &str,
    auth: &AuthMaterial,
) -> Result<(), ChannelError> {
    let accepted = match auth {
        AuthMaterial::Password(password) => session
            .authenticate_password(username, password.as_str())
            .await
            .map_err(|e| ChannelError::ProtocolError(format!("password auth: {}", e)))?
            .success(),
        AuthMaterial::PrivateKey { pem, passphrase } => {
            let key = keys::decode_secret_key(pem, passphrase.as_deref()).map_err(|e| {
                ChannelError::AuthenticationFailure(format!("unreadable private key: {}", e))
            })?;
            let hash_alg = session
                .best_supported_rsa_hash()
                .await
                .map_err(|e| ChannelError::ProtocolError(format!("hash negotiation: {}", e)))?
                .flatten();
            session
                .authenticate_publickey(
                    username,
                    PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await
                .map_err(|e| ChannelError::ProtocolError(format!("publickey auth: {}", e)))?
                .success()
        }
        AuthMaterial::Agent => authenticate_with_agent(session, username).await?,
    };

    if accepted {
        Ok(())
    } else {
        Err(ChannelError::AuthenticationFailure(format!(
            "{} authentication rejected for user {}",
            auth.method(),
            username
        )))
    }
}

#[cfg(unix)]
async fn authenticate_with_agent(
    session: &mut Handle<SessionHandler>,
    username: &str,
) -> Result<bool, ChannelError> {
    use russh::keys::agent::client::AgentClient;

    let mut agent = AgentClient::connect_env().await.map_err(|e| {
        ChannelError::AuthenticationFailure(format!("ssh agent unavailable: {}", e))
    })?;
    let identities = agent.request_identities().await.map_err(|e| {
        ChannelError::AuthenticationFailure(format!("ssh agent identities: {}", e))
    })?;

    let hash_alg = session
        .best_supported_rsa_hash()
        .await
        .map_err(|e| ChannelError::ProtocolError(format!("hash negotiation: {}", e)))?
        .flatten();

    for identity in identities {
        match session
            .authenticate_publickey_with(username, identity, hash_alg, &mut agent)
            .await
        {
            Ok(result) if result.success() => return Ok(true),
            Ok(_) => continue,
            Err(e) => debug!(error = %e, "Agent identity refused"),
        }
    }
    Ok(false)
}

#[cfg(not(unix))]
async fn authenticate_with_agent(
    _session: &mut Handle<SessionHandler>,
    _username: &str,
) -> Result<bool, ChannelError> {
    Err(ChannelError::AuthenticationFailure(
        "ssh agent is not supported on this platform".to_string(),
    ))
}

/// Run the command on a fresh session channel and read until close.
///
/// Output past the cap is dropped but the channel keeps draining, so the exit
/// status still arrives.
async fn exec_and_drain(
    session: &Handle<SessionHandler>,
    command: &str,
) -> Result<Drained, ChannelError> {
    let mut channel = session
        .channel_open_session()
        .await
        .map_err(|e| ChannelError::ProtocolError(format!("open session channel: {}", e)))?;
    channel
        .exec(true, command)
        .await
        .map_err(|e| ChannelError::ProtocolError(format!("exec request: {}", e)))?;

    let mut drained = Drained {
        exit: ExitStatus::Unknown,
        stdout: CappedBuffer::default(),
        stderr: CappedBuffer::default(),
    };

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => drained.stdout.push(data),
            ChannelMsg::ExtendedData { ref data, ext } if ext == SSH_EXTENDED_DATA_STDERR => {
                drained.stderr.push(data)
            }
            ChannelMsg::ExitStatus { exit_status } => {
                drained.exit = ExitStatus::Code(exit_status as i32);
            }
            ChannelMsg::ExitSignal { signal_name, .. } => {
                drained.exit = ExitStatus::Signal(format!("{:?}", signal_name));
            }
            ChannelMsg::Failure => {
                return Err(ChannelError::ProtocolError(
                    "server rejected the exec request".to_string(),
                ));
            }
            _ => {}
        }
    }

    Ok(drained)
}
