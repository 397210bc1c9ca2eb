//! Per-program transaction poller with cursor semantics.
//!
//! The cursor (`last_signature`) is advanced only after the RPC returns a
//! non-empty signature page — never on retry, never on partial failure — so
//! a crashed or erroring cycle replays the same page and the writer's
//! idempotent upserts absorb the duplicates.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use uho_rpc::{Commitment, ParsedTransaction, SolanaRpc};

use crate::error::IngestError;

/// A snapshot of the poller's cursor state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerState {
    pub last_signature: Option<String>,
    pub poll_count: u64,
}

/// Stateful poller for a single program address.
pub struct TransactionPoller<C> {
    client: Arc<C>,
    program_id: String,
    batch_size: usize,
    commitment: Commitment,
    tx_fetch_delay: Duration,
    last_signature: Option<String>,
    poll_count: u64,
}

impl<C: SolanaRpc> TransactionPoller<C> {
    pub fn new(
        client: Arc<C>,
        program_id: impl Into<String>,
        batch_size: usize,
        commitment: Commitment,
        tx_fetch_delay: Duration,
    ) -> Self {
        Self {
            client,
            program_id: program_id.into(),
            batch_size,
            commitment,
            tx_fetch_delay,
            last_signature: None,
            poll_count: 0,
        }
    }

    /// Seed or reset the cursor (`None` polls from the chain tip).
    pub fn set_cursor(&mut self, signature: Option<String>) {
        self.last_signature = signature;
    }

    pub fn state(&self) -> PollerState {
        PollerState {
            last_signature: self.last_signature.clone(),
            poll_count: self.poll_count,
        }
    }

    /// Fetch one batch of parsed transactions in reverse-chronological RPC
    /// order.
    ///
    /// Signatures with an `err` field are skipped. A single transaction
    /// whose fetch fails is logged and skipped — the signature was still in
    /// the returned page, so the cursor advances past it; replays are safe
    /// because writes are idempotent. A failed signature-page fetch
    /// propagates and leaves the cursor untouched.
    pub async fn poll(&mut self) -> Result<Vec<ParsedTransaction>, IngestError> {
        let page = self
            .client
            .signatures_for_address(
                &self.program_id,
                self.batch_size,
                self.last_signature.as_deref(),
                self.commitment,
            )
            .await?;
        self.poll_count += 1;

        if page.is_empty() {
            return Ok(vec![]);
        }
        let newest = page[0].signature.clone();

        let mut transactions = Vec::with_capacity(page.len());
        for info in &page {
            if info.is_err() {
                debug!(signature = %info.signature, "skipping failed transaction");
                continue;
            }
            match self.client.get_parsed_transaction(&info.signature).await {
                Ok(Some(tx)) => transactions.push(tx),
                Ok(None) => {
                    debug!(signature = %info.signature, "transaction not found on node, skipping");
                }
                Err(e) => {
                    warn!(
                        program = %self.program_id,
                        signature = %info.signature,
                        error = %e,
                        "transaction fetch failed, skipping"
                    );
                }
            }
            if !self.tx_fetch_delay.is_zero() {
                tokio::time::sleep(self.tx_fetch_delay).await;
            }
        }

        self.last_signature = Some(newest);
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use uho_rpc::{RpcError, SignatureInfo};

    /// Scripted RPC: pops one signature page per poll and serves
    /// transactions by signature.
    struct MockRpc {
        pages: Mutex<Vec<Vec<SignatureInfo>>>,
        transactions: HashMap<String, ParsedTransaction>,
        fail_signatures: bool,
    }

    impl MockRpc {
        fn new(pages: Vec<Vec<SignatureInfo>>) -> Self {
            let transactions = pages
                .iter()
                .flatten()
                .map(|info| (info.signature.clone(), dummy_tx(&info.signature, info.slot)))
                .collect();
            Self {
                pages: Mutex::new(pages),
                transactions,
                fail_signatures: false,
            }
        }
    }

    fn sig(signature: &str, slot: u64, err: bool) -> SignatureInfo {
        serde_json::from_value(json!({
            "signature": signature,
            "slot": slot,
            "err": if err { json!({"InstructionError": [0, "Custom"]}) } else { json!(null) },
            "blockTime": 1_700_000_000i64
        }))
        .unwrap()
    }

    fn dummy_tx(signature: &str, slot: u64) -> ParsedTransaction {
        serde_json::from_value(json!({
            "slot": slot,
            "transaction": {
                "signatures": [signature],
                "message": {"accountKeys": [], "instructions": []}
            },
            "meta": {"err": null, "logMessages": [], "innerInstructions": []}
        }))
        .unwrap()
    }

    #[async_trait]
    impl SolanaRpc for MockRpc {
        async fn signatures_for_address(
            &self,
            _address: &str,
            _limit: usize,
            _until: Option<&str>,
            _commitment: Commitment,
        ) -> Result<Vec<SignatureInfo>, RpcError> {
            if self.fail_signatures {
                return Err(RpcError::HttpStatus {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                Ok(vec![])
            } else {
                Ok(pages.remove(0))
            }
        }

        async fn get_parsed_transaction(
            &self,
            signature: &str,
        ) -> Result<Option<ParsedTransaction>, RpcError> {
            Ok(self.transactions.get(signature).cloned())
        }
    }

    fn poller(client: MockRpc) -> TransactionPoller<MockRpc> {
        TransactionPoller::new(
            Arc::new(client),
            "Prog11111111111111111111111111111111111111",
            50,
            Commitment::Confirmed,
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn cursor_advances_to_newest_on_non_empty_page() {
        let mut poller = poller(MockRpc::new(vec![vec![
            sig("S3", 103, false),
            sig("S2", 102, false),
            sig("S1", 101, false),
        ]]));
        poller.set_cursor(Some("X".into()));

        let batch = poller.poll().await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(poller.state().last_signature.as_deref(), Some("S3"));
        assert_eq!(poller.state().poll_count, 1);

        // Second poll returns an empty page: cursor unchanged
        let batch = poller.poll().await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(poller.state().last_signature.as_deref(), Some("S3"));
        assert_eq!(poller.state().poll_count, 2);
    }

    #[tokio::test]
    async fn errored_signatures_are_skipped_but_cursor_still_advances() {
        let mut poller = poller(MockRpc::new(vec![vec![
            sig("S3", 103, true),
            sig("S2", 102, false),
        ]]));

        let batch = poller.poll().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].signature(), "S2");
        // Newest signature wins even though its transaction errored on-chain
        assert_eq!(poller.state().last_signature.as_deref(), Some("S3"));
    }

    #[tokio::test]
    async fn page_fetch_failure_leaves_cursor_untouched() {
        let mut client = MockRpc::new(vec![]);
        client.fail_signatures = true;
        let mut poller = poller(client);
        poller.set_cursor(Some("KEEP".into()));

        assert!(poller.poll().await.is_err());
        assert_eq!(poller.state().last_signature.as_deref(), Some("KEEP"));
    }

    #[tokio::test]
    async fn missing_transaction_is_skipped() {
        let mut client = MockRpc::new(vec![vec![sig("S2", 102, false), sig("S1", 101, false)]]);
        client.transactions.remove("S1");
        let mut poller = poller(client);

        let batch = poller.poll().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(poller.state().last_signature.as_deref(), Some("S2"));
    }
}
