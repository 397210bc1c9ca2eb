//! Error types for IDL parsing.

use thiserror::Error;

/// Errors that can occur while parsing or resolving an IDL.
#[derive(Debug, Error)]
pub enum IdlError {
    #[error("invalid IDL JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IDL carries no program address (checked `address` and `metadata.address`)")]
    MissingAddress,

    #[error("IDL carries no program name (checked `name` and `metadata.name`)")]
    MissingName,

    #[error("unsupported IDL type: {0}")]
    UnsupportedType(String),

    #[error("unknown program alias or address: {0}")]
    UnknownProgram(String),
}
