//! Error types for the decode pipeline.

use thiserror::Error;

/// Errors that can occur while decoding a single record.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Borsh-level read failure (truncated or malformed body).
    #[error("borsh read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("base58 decode failed: {0}")]
    Base58(#[from] bs58::decode::Error),

    /// A `{defined}` reference with no entry in the program's type table.
    #[error("unknown defined type: {0}")]
    UnknownType(String),

    #[error("field '{field}' missing from parsed instruction info")]
    MissingField { field: String },

    #[error("invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("{0}")]
    Other(String),
}
