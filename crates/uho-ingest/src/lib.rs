//! uho-ingest — the ingestion engine.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator ──(round-robin, per program)──▶ TransactionPoller
//!                                                   │ raw transactions
//!                      ┌────────────────────────────┤
//!                      ▼                            ▼
//!               {Event, Instruction, TokenTransfer} decoders
//!                      │ decoded records
//!                      ▼
//!               FanoutWriter ──▶ subscriber schemas + pg_notify broadcast
//! ```
//!
//! One cooperative polling loop serves every registered program; subscriber
//! writes are isolated per tenant and idempotent under replay.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod poller;
pub mod subscription;
pub mod writer;

pub use config::IngestConfig;
pub use error::IngestError;
pub use orchestrator::{IngestMetrics, Orchestrator};
pub use poller::{PollerState, TransactionPoller};
pub use subscription::{ActiveProgram, Subscriber};
pub use writer::{FanoutWriter, SubscriberOutcome, TxLogRecord, WriteCounts};
