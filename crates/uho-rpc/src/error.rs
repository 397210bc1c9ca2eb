//! RPC error types.

use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors that can occur during an RPC operation.
#[derive(Debug, Error)]
pub enum RpcError {
    /// HTTP request failed (connection refused, reset, timeout, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// HTTP-level throttling (429) or unavailability (503).
    #[error("HTTP {status} from RPC: {body}")]
    HttpStatus { status: u16, body: String },

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Response could not be deserialized.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl RpcError {
    /// Returns `true` if the error is transient and worth retrying:
    /// HTTP 429/503, connection resets, timeouts, and node-side
    /// "too many requests" responses.
    pub fn is_transient(&self) -> bool {
        match self {
            RpcError::HttpStatus { status, .. } => matches!(status, 429 | 503),
            RpcError::Http(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("timed out")
                    || msg.contains("timeout")
                    || msg.contains("connection reset")
                    || msg.contains("connection closed")
            }
            RpcError::Rpc(err) => err.message.to_ascii_lowercase().contains("too many requests"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(RpcError::HttpStatus { status: 429, body: String::new() }.is_transient());
        assert!(RpcError::HttpStatus { status: 503, body: String::new() }.is_transient());
        assert!(!RpcError::HttpStatus { status: 400, body: String::new() }.is_transient());
        assert!(RpcError::Http("error sending request: operation timed out".into()).is_transient());
        assert!(RpcError::Http("Connection reset by peer".into()).is_transient());
        assert!(RpcError::Rpc(JsonRpcError {
            code: -32005,
            message: "Too many requests".into(),
            data: None,
        })
        .is_transient());
        assert!(!RpcError::Rpc(JsonRpcError {
            code: -32602,
            message: "Invalid params".into(),
            data: None,
        })
        .is_transient());
    }
}
