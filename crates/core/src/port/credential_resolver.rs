// Credential Resolver Port (external credential store)

use crate::domain::{AuthMaterial, Target};
use crate::error::Result;
use async_trait::async_trait;

/// Produces decrypted auth material for a target.
///
/// `Ok(None)` means no credential is configured; the attempt fails with an
/// authentication failure before any connection is opened.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, target: &Target) -> Result<Option<AuthMaterial>>;
}

pub mod mocks {
    use super::*;
    use std::collections::HashMap;

    /// Per-target credentials with an optional fallback
    #[derive(Default)]
    pub struct StaticCredentialResolver {
        by_target: HashMap<String, AuthMaterial>,
        fallback: Option<AuthMaterial>,
    }

    impl StaticCredentialResolver {
        /// Same credential for every target
        pub fn for_all(auth: AuthMaterial) -> Self {
            Self {
                by_target: HashMap::new(),
                fallback: Some(auth),
            }
        }

        pub fn with_target(mut self, target_id: impl Into<String>, auth: AuthMaterial) -> Self {
            self.by_target.insert(target_id.into(), auth);
            self
        }
    }

    #[async_trait]
    impl CredentialResolver for StaticCredentialResolver {
        async fn resolve(&self, target: &Target) -> Result<Option<AuthMaterial>> {
            Ok(self
                .by_target
                .get(&target.id)
                .cloned()
                .or_else(|| self.fallback.clone()))
        }
    }
}
