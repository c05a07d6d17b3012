// Volley Infrastructure - Remote Adapters
// Implements: RemoteChannel, TargetRegistry, CredentialResolver (ADR-002)

pub mod inventory;
pub mod router;
pub mod ssh_channel;

pub use inventory::FileInventory;
pub use router::ProtocolRouter;
pub use ssh_channel::{HostKeyPolicy, SshChannel};
