// Coordinator constants (ADR: No magic values)

/// Concurrency limit when the submitter does not give one
pub const DEFAULT_CONCURRENCY_LIMIT: u32 = 10;

/// Upper bound on simultaneous channels for one execution
pub const MAX_CONCURRENCY_LIMIT: u32 = 256;

/// Upper bound on targets per execution
pub const MAX_TARGETS: usize = 10_000;

/// Upper bound on command length (bytes)
pub const MAX_COMMAND_BYTES: usize = 64 * 1024;

/// Per-target timeout when the submitter does not give one (60s)
pub const DEFAULT_TIMEOUT_MS: i64 = 60_000;

/// Shortest accepted per-target timeout (1s)
pub const MIN_TIMEOUT_MS: i64 = 1_000;

/// Longest accepted per-target timeout (24h)
pub const MAX_TIMEOUT_MS: i64 = 24 * 60 * 60 * 1000;

/// Page size for execution listings
pub const DEFAULT_LIST_LIMIT: u32 = 50;

/// Hard cap on execution listings
pub const MAX_LIST_LIMIT: u32 = 500;

/// Buffered events per subscriber before it starts lagging
pub const DEFAULT_EVENT_BUFFER: usize = 1024;
