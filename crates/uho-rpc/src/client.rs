//! HTTP JSON-RPC client backed by `reqwest`, with retry-with-backoff for
//! transient failures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::RpcError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::types::{Commitment, ParsedTransaction, SignatureInfo};

/// The two RPC operations the ingestion engine consumes.
///
/// A trait seam so the poller can be driven by a mock in tests.
#[async_trait]
pub trait SolanaRpc: Send + Sync {
    /// `getSignaturesForAddress` — newest-first signature page for `address`,
    /// bounded below by `until` (exclusive) and sized by `limit`.
    async fn signatures_for_address(
        &self,
        address: &str,
        limit: usize,
        until: Option<&str>,
        commitment: Commitment,
    ) -> Result<Vec<SignatureInfo>, RpcError>;

    /// `getTransaction` with jsonParsed encoding. Returns `None` when the
    /// node no longer has the transaction.
    async fn get_parsed_transaction(
        &self,
        signature: &str,
    ) -> Result<Option<ParsedTransaction>, RpcError>;
}

/// Configuration for `HttpRpcClient`.
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP JSON-RPC client. Cheap to share behind an `Arc`; one instance serves
/// every program the orchestrator polls.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    pub fn new(url: impl Into<String>, config: RpcClientConfig) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RpcError::Http(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            http,
            retry: RetryPolicy::new(config.retry),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn default_for(url: impl Into<String>) -> Result<Self, RpcError> {
        Self::new(url, RpcClientConfig::default())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<Value, RpcError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RpcError::HttpStatus { status, body });
        }

        let parsed: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;
        parsed.into_result().map_err(RpcError::Rpc)
    }

    /// Send a request, retrying transient failures with exponential backoff.
    async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let req = JsonRpcRequest::new(
            self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        );

        let mut failed = 0u32;
        loop {
            match self.send_once(&req).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    failed += 1;
                    match self.retry.next_delay(failed) {
                        Some(delay) => {
                            tracing::warn!(
                                method,
                                attempt = failed,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "transient RPC error, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            tracing::error!(method, attempts = failed, error = %e, "RPC retries exhausted");
                            return Err(e);
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl SolanaRpc for HttpRpcClient {
    async fn signatures_for_address(
        &self,
        address: &str,
        limit: usize,
        until: Option<&str>,
        commitment: Commitment,
    ) -> Result<Vec<SignatureInfo>, RpcError> {
        let mut options = json!({
            "limit": limit,
            "commitment": commitment.as_str(),
        });
        if let Some(until) = until {
            options["until"] = json!(until);
        }
        let result = self
            .send("getSignaturesForAddress", vec![json!(address), options])
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn get_parsed_transaction(
        &self,
        signature: &str,
    ) -> Result<Option<ParsedTransaction>, RpcError> {
        let options = json!({
            "encoding": "jsonParsed",
            "maxSupportedTransactionVersion": 0,
        });
        let result = self
            .send("getTransaction", vec![json!(signature), options])
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(result)?))
    }
}
