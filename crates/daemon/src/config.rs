//! Daemon configuration
//!
//! Layered: built-in defaults, then the config file, then `VOLLEY_*`
//! environment variables.

use anyhow::{bail, Context, Result};
use ::config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use volley_core::application::coordinator::constants::{
    DEFAULT_EVENT_BUFFER, DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS, MIN_TIMEOUT_MS,
};
use volley_infra_remote::HostKeyPolicy;

const ENV_PREFIX: &str = "VOLLEY";
/// Explicit config file; must exist when set
const CONFIG_PATH_ENV: &str = "VOLLEY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "~/.volley/volley.toml";
const DEFAULT_DB_PATH: &str = "~/.volley/volley.db";
const DEFAULT_INVENTORY_PATH: &str = "~/.volley/inventory.toml";
const DEFAULT_SHUTDOWN_GRACE_SECS: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    pub db_path: String,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub inventory_path: String,
    pub default_timeout_secs: u64,
    pub host_key_policy: HostKeyPolicy,
    pub log_format: LogFormat,
    pub log_dir: Option<String>,
    pub event_buffer: usize,
    pub shutdown_grace_secs: u64,
}

impl DaemonConfig {
    /// Load from `VOLLEY_CONFIG` (or `~/.volley/volley.toml` if present) and
    /// the process environment
    pub fn load() -> Result<Self> {
        let (path, required) = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => (expand(&path), true),
            Err(_) => (expand(DEFAULT_CONFIG_PATH), false),
        };
        Self::from_sources(&path, required, None)
    }

    /// `env` replaces the process environment when given
    fn from_sources(
        path: &Path,
        required: bool,
        env: Option<::config::Map<String, String>>,
    ) -> Result<Self> {
        let settings = Config::builder()
            .set_default("db_path", DEFAULT_DB_PATH)?
            .set_default("rpc_host", volley_api_rpc::server::DEFAULT_RPC_HOST)?
            .set_default("rpc_port", volley_api_rpc::server::DEFAULT_RPC_PORT as i64)?
            .set_default("inventory_path", DEFAULT_INVENTORY_PATH)?
            .set_default("default_timeout_secs", DEFAULT_TIMEOUT_MS / 1000)?
            .set_default("host_key_policy", "accept_any")?
            .set_default("log_format", "pretty")?
            .set_default("event_buffer", DEFAULT_EVENT_BUFFER as i64)?
            .set_default("shutdown_grace_secs", DEFAULT_SHUTDOWN_GRACE_SECS)?
            .add_source(File::from(path).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .with_context(|| format!("Failed to load configuration ({})", path.display()))?;

        let config: DaemonConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let timeout_ms = self.default_timeout_ms();
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&timeout_ms) {
            bail!(
                "default_timeout_secs must be between {} and {}",
                MIN_TIMEOUT_MS / 1000,
                MAX_TIMEOUT_MS / 1000
            );
        }
        if self.event_buffer == 0 {
            bail!("event_buffer must be at least 1");
        }
        Ok(())
    }

    pub fn default_timeout_ms(&self) -> i64 {
        (self.default_timeout_secs as i64).saturating_mul(1000)
    }

    /// SQLite URL for the result store
    pub fn database_url(&self) -> String {
        if self.db_path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}", self.db_file().display())
        }
    }

    /// Expanded on-disk database path
    pub fn db_file(&self) -> PathBuf {
        expand(&self.db_path)
    }

    pub fn inventory_file(&self) -> PathBuf {
        expand(&self.inventory_path)
    }

    pub fn log_directory(&self) -> Option<PathBuf> {
        self.log_dir.as_deref().map(expand)
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
