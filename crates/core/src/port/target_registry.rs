// Target Registry Port (external inventory of hosts)

use crate::domain::Target;
use crate::error::Result;
use async_trait::async_trait;

/// Resolves a target id to connection details.
///
/// `Ok(None)` means the id is unknown; the result for it is skipped.
#[async_trait]
pub trait TargetRegistry: Send + Sync {
    async fn resolve_target(&self, target_id: &str) -> Result<Option<Target>>;
}

pub mod mocks {
    use super::*;
    use std::collections::HashMap;

    /// Fixed in-memory inventory
    #[derive(Default)]
    pub struct StaticTargetRegistry {
        targets: HashMap<String, Target>,
    }

    impl StaticTargetRegistry {
        pub fn new(targets: impl IntoIterator<Item = Target>) -> Self {
            Self {
                targets: targets.into_iter().map(|t| (t.id.clone(), t)).collect(),
            }
        }
    }

    #[async_trait]
    impl TargetRegistry for StaticTargetRegistry {
        async fn resolve_target(&self, target_id: &str) -> Result<Option<Target>> {
            Ok(self.targets.get(target_id).cloned())
        }
    }
}
