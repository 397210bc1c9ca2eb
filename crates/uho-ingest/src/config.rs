//! Ingestion engine configuration.

use uho_rpc::Commitment;

use crate::error::IngestError;

/// Configuration for the orchestrator and its per-program pollers.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Solana JSON-RPC endpoint.
    pub rpc_url: String,
    /// Postgres connection URL.
    pub database_url: String,
    /// Confirmation level polled transactions must have reached.
    pub commitment: Commitment,
    /// `getSignaturesForAddress` page size.
    pub signature_batch_size: usize,
    /// Delay between per-transaction fetches (RPC rate-limit headroom).
    pub tx_fetch_delay_ms: u64,
    /// Delay between programs within one round-robin cycle.
    pub inter_program_delay_ms: u64,
    /// Sleep after a full cycle over every program.
    pub cycle_interval_ms: u64,
    /// Notification channel for event-delivery broadcasts.
    pub event_channel: String,
    /// Notification channel announcing subscription changes.
    pub control_channel: String,
    /// Payload bound above which the broadcast falls back to per-event
    /// messages (Postgres caps NOTIFY payloads near 8000 bytes).
    pub max_notify_payload: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8899".into(),
            database_url: "postgresql://localhost/uho".into(),
            commitment: Commitment::Confirmed,
            signature_batch_size: 50,
            tx_fetch_delay_ms: 100,
            inter_program_delay_ms: 100,
            cycle_interval_ms: 2000,
            event_channel: "uho_events".into(),
            control_channel: "uho_subscriptions".into(),
            max_notify_payload: 7500,
        }
    }
}

impl IngestConfig {
    /// Validate startup-critical settings. Failures here abort the
    /// orchestrator before the loop begins.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.rpc_url.is_empty() {
            return Err(IngestError::Config("rpc_url must be set".into()));
        }
        if self.database_url.is_empty() {
            return Err(IngestError::Config("database_url must be set".into()));
        }
        if self.signature_batch_size == 0 {
            return Err(IngestError::Config(
                "signature_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(IngestConfig::default().validate().is_ok());
    }

    #[test]
    fn missing_rpc_url_is_fatal() {
        let config = IngestConfig {
            rpc_url: String::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(IngestError::Config(_))));
    }
}
