//! Error types for the ingestion engine.

use thiserror::Error;

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("RPC error: {0}")]
    Rpc(#[from] uho_rpc::RpcError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("IDL error: {0}")]
    Idl(#[from] uho_idl::IdlError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Startup configuration failure — fatal before the loop begins.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("program not registered: {0}")]
    UnknownProgram(String),

    #[error("{0}")]
    Other(String),
}
