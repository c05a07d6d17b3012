// File-backed target inventory
// Implements: TargetRegistry, CredentialResolver

use async_trait::async_trait;
use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use volley_core::domain::{AuthMaterial, RemoteProtocol, Target, DEFAULT_SSH_PORT};
use volley_core::error::{AppError, Result};
use volley_core::port::{CredentialResolver, TargetRegistry};

#[derive(Debug, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    targets: Vec<TargetEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct TargetEntry {
    id: String,
    name: Option<String>,
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    username: String,
    #[serde(default)]
    protocol: RemoteProtocol,
    credential: Option<CredentialSpec>,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// Where to find a target's secret. Secrets are read on every resolve.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CredentialSpec {
    Password {
        password_env: Option<String>,
        password: Option<String>,
    },
    PrivateKey {
        key_path: String,
        passphrase_env: Option<String>,
    },
    Agent,
}

impl TargetEntry {
    fn into_parts(self) -> (Target, Option<CredentialSpec>) {
        let target = Target {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            host: self.host,
            port: self.port,
            username: self.username,
            protocol: self.protocol,
        };
        (target, self.credential)
    }
}

/// Inventory loaded once at startup from a TOML/JSON/YAML file
pub struct FileInventory {
    targets: HashMap<String, Target>,
    credentials: HashMap<String, CredentialSpec>,
}

impl FileInventory {
    /// Load from a file; the format follows the extension
    pub fn load(path: &Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path))
            .build()
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        let inventory = Self::from_config(settings)?;
        info!(
            path = %path.display(),
            targets = inventory.len(),
            "Loaded target inventory"
        );
        Ok(inventory)
    }

    /// Parse TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Self::from_config(settings)
    }

    /// Inventory with no targets (every id resolves to nothing)
    pub fn empty() -> Self {
        Self {
            targets: HashMap::new(),
            credentials: HashMap::new(),
        }
    }

    fn from_config(settings: Config) -> Result<Self> {
        let file: InventoryFile = settings
            .try_deserialize()
            .map_err(|e| AppError::Config(format!("Invalid inventory: {}", e)))?;

        let mut inventory = Self::empty();
        for entry in file.targets {
            validate_entry(&entry)?;
            let (target, credential) = entry.into_parts();
            if inventory.targets.contains_key(&target.id) {
                return Err(AppError::Config(format!(
                    "Duplicate target id in inventory: {}",
                    target.id
                )));
            }
            if let Some(credential) = credential {
                inventory.credentials.insert(target.id.clone(), credential);
            }
            inventory.targets.insert(target.id.clone(), target);
        }
        Ok(inventory)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

fn validate_entry(entry: &TargetEntry) -> Result<()> {
    if entry.id.trim().is_empty() {
        return Err(AppError::Config("Inventory target with empty id".to_string()));
    }
    if entry.host.trim().is_empty() {
        return Err(AppError::Config(format!("Target {} has an empty host", entry.id)));
    }
    if let Some(CredentialSpec::Password {
        password_env: None,
        password: None,
    }) = &entry.credential
    {
        return Err(AppError::Config(format!(
            "Target {}: password credential needs password_env or password",
            entry.id
        )));
    }
    Ok(())
}

/// Read the secret a spec points at. Any read failure is logged and yields `None`.
async fn read_credential(target_id: &str, spec: &CredentialSpec) -> Option<AuthMaterial> {
    match spec {
        CredentialSpec::Password {
            password_env: Some(var),
            ..
        } => match std::env::var(var) {
            Ok(password) => Some(AuthMaterial::Password(password)),
            Err(e) => {
                warn!(
                    target_id = %target_id,
                    env = %var,
                    error = %e,
                    "Password variable unreadable"
                );
                None
            }
        },
        CredentialSpec::Password {
            password: Some(password),
            ..
        } => Some(AuthMaterial::Password(password.clone())),
        CredentialSpec::Password { .. } => None,
        CredentialSpec::PrivateKey {
            key_path,
            passphrase_env,
        } => {
            let path = shellexpand::tilde(key_path).into_owned();
            let pem = match tokio::fs::read_to_string(&path).await {
                Ok(pem) => pem,
                Err(e) => {
                    warn!(
                        target_id = %target_id,
                        key_path = %path,
                        error = %e,
                        "Private key unreadable"
                    );
                    return None;
                }
            };
            let passphrase = match passphrase_env {
                Some(var) => match std::env::var(var) {
                    Ok(passphrase) => Some(passphrase),
                    Err(e) => {
                        warn!(
                            target_id = %target_id,
                            env = %var,
                            error = %e,
                            "Passphrase variable unreadable"
                        );
                        return None;
                    }
                },
                None => None,
            };
            Some(AuthMaterial::PrivateKey { pem, passphrase })
        }
        CredentialSpec::Agent => Some(AuthMaterial::Agent),
    }
}

#[async_trait]
impl TargetRegistry for FileInventory {
    async fn resolve_target(&self, target_id: &str) -> Result<Option<Target>> {
        Ok(self.targets.get(target_id).cloned())
    }
}

#[async_trait]
impl CredentialResolver for FileInventory {
    async fn resolve(&self, target: &Target) -> Result<Option<AuthMaterial>> {
        match self.credentials.get(&target.id) {
            Some(spec) => Ok(read_credential(&target.id, spec).await),
            None => Ok(None),
        }
    }
}
