// Submit Use Case

use crate::application::coordinator::constants::*;
use crate::domain::{Execution, ExecutionId, TargetResult};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, TargetRegistry, TimeProvider, TransactionalExecutionRepository};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

/// Submit request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub command: String,
    pub targets: Vec<String>,

    #[serde(default)]
    pub concurrency_limit: Option<u32>,

    #[serde(default)]
    pub timeout_ms: Option<i64>,

    #[serde(default)]
    pub os_hint: Option<String>,
}

impl SubmitRequest {
    pub fn new(command: impl Into<String>, targets: Vec<String>) -> Self {
        Self {
            command: command.into(),
            targets,
            concurrency_limit: None,
            timeout_ms: None,
            os_hint: None,
        }
    }

    pub fn with_concurrency_limit(mut self, limit: u32) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Limits applied to a request after defaults are filled in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedLimits {
    pub concurrency_limit: u32,
    pub timeout_ms: i64,
}

/// Validate a request synchronously; nothing is written on failure.
pub fn validate_request(req: &SubmitRequest, default_timeout_ms: i64) -> Result<ResolvedLimits> {
    if req.command.trim().is_empty() {
        return Err(AppError::Validation("command must not be empty".to_string()));
    }
    if req.command.len() > MAX_COMMAND_BYTES {
        return Err(AppError::Validation(format!(
            "command too long: {} bytes (max {})",
            req.command.len(),
            MAX_COMMAND_BYTES
        )));
    }

    if req.targets.is_empty() {
        return Err(AppError::Validation("targets must not be empty".to_string()));
    }
    if req.targets.len() > MAX_TARGETS {
        return Err(AppError::Validation(format!(
            "too many targets: {} (max {})",
            req.targets.len(),
            MAX_TARGETS
        )));
    }
    let mut seen = HashSet::with_capacity(req.targets.len());
    for target in &req.targets {
        if target.trim().is_empty() {
            return Err(AppError::Validation("target id must not be empty".to_string()));
        }
        if !seen.insert(target.as_str()) {
            return Err(AppError::Validation(format!("duplicate target: {}", target)));
        }
    }

    let concurrency_limit = req.concurrency_limit.unwrap_or(DEFAULT_CONCURRENCY_LIMIT);
    if !(1..=MAX_CONCURRENCY_LIMIT).contains(&concurrency_limit) {
        return Err(AppError::Validation(format!(
            "concurrency_limit must be between 1 and {}, got {}",
            MAX_CONCURRENCY_LIMIT, concurrency_limit
        )));
    }

    let timeout_ms = req.timeout_ms.unwrap_or(default_timeout_ms);
    if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&timeout_ms) {
        return Err(AppError::Validation(format!(
            "timeout_ms must be between {} and {}, got {}",
            MIN_TIMEOUT_MS, MAX_TIMEOUT_MS, timeout_ms
        )));
    }

    Ok(ResolvedLimits {
        concurrency_limit,
        timeout_ms,
    })
}

/// Execute submit use case (with transaction for atomicity)
///
/// Writes the execution and one pending result per target, then returns.
/// Dispatch is the caller's concern.
///
/// # Arguments
///
/// * `store` - Transactional execution repository
/// * `registry` - Target registry (denormalized name/host for display)
/// * `id_provider` - ID generator (injected for determinism)
/// * `time_provider` - Time provider (injected for determinism)
/// * `req` - Submit request
/// * `default_timeout_ms` - Timeout applied when the request has none
pub async fn execute(
    store: &dyn TransactionalExecutionRepository,
    registry: &dyn TargetRegistry,
    id_provider: &dyn IdProvider,
    time_provider: &dyn TimeProvider,
    req: SubmitRequest,
    default_timeout_ms: i64,
) -> Result<ExecutionId> {
    let limits = validate_request(&req, default_timeout_ms)?;

    let execution_id = id_provider.generate_id();
    let created_at = time_provider.now_millis();

    let mut results = Vec::with_capacity(req.targets.len());
    for (position, target_id) in req.targets.iter().enumerate() {
        let mut result = TargetResult::new_pending(
            id_provider.generate_id(),
            execution_id.clone(),
            position as u32,
            target_id.clone(),
        );
        match registry.resolve_target(target_id).await {
            Ok(Some(target)) => result.denormalize(&target),
            Ok(None) => {}
            Err(e) => warn!(target_id = %target_id, error = %e, "Target lookup failed at submit"),
        }
        results.push(result);
    }

    let mut execution = Execution::new(
        execution_id.clone(),
        created_at,
        req.command,
        req.targets,
        limits.concurrency_limit,
        limits.timeout_ms,
    );
    execution.os_hint = req.os_hint;

    let mut tx = store.begin_transaction().await?;
    tx.insert_execution(&execution).await?;
    for result in &results {
        tx.insert_result(result).await?;
    }
    tx.commit().await?;

    info!(
        execution_id = %execution_id,
        targets = results.len(),
        concurrency_limit = limits.concurrency_limit,
        timeout_ms = limits.timeout_ms,
        "Execution submitted"
    );
    Ok(execution_id)
}
