//! uho-rpc — Solana JSON-RPC client for the uho indexer.
//!
//! Two RPC operations cover everything the ingestion engine needs:
//! `getSignaturesForAddress` (cursor-bounded signature pages) and
//! `getTransaction` with `jsonParsed` encoding (full parsed transactions).
//! Transient failures are retried with exponential backoff.

pub mod client;
pub mod error;
pub mod request;
pub mod retry;
pub mod types;

pub use client::{HttpRpcClient, RpcClientConfig, SolanaRpc};
pub use error::RpcError;
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use retry::{RetryConfig, RetryPolicy};
pub use types::{
    Commitment, InnerInstructionGroup, ParsedInstruction, ParsedTransaction, RawInstruction,
    SignatureInfo, TxInstruction, TxMessage, TxMeta,
};
