//! JSON-RPC API Layer
//!
//! Implements the JSON-RPC 2.0 server for Volley.
//! Adheres to ADR-020 (API Contract).

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig};

// Callers hold this to stop the server
pub use jsonrpsee::server::ServerHandle;
