// Protocol router: picks the channel for a target's declared protocol

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use volley_core::domain::{AuthMaterial, CommandOutput, RemoteProtocol, Target};
use volley_core::port::{ChannelError, RemoteChannel};

/// One channel per supported protocol
pub struct ProtocolRouter {
    ssh: Arc<dyn RemoteChannel>,
}

impl ProtocolRouter {
    pub fn new(ssh: Arc<dyn RemoteChannel>) -> Self {
        Self { ssh }
    }

    fn channel_for(&self, protocol: RemoteProtocol) -> &dyn RemoteChannel {
        match protocol {
            RemoteProtocol::Ssh => self.ssh.as_ref(),
        }
    }
}

#[async_trait]
impl RemoteChannel for ProtocolRouter {
    async fn run(
        &self,
        target: &Target,
        auth: &AuthMaterial,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ChannelError> {
        self.channel_for(target.protocol)
            .run(target, auth, command, timeout)
            .await
    }
}
