//! Orchestrator — owns the registry of active programs and drives one
//! cooperative round-robin polling loop over all of them.
//!
//! Subscription changes arrive over a Postgres notification channel; the
//! working set is refreshed on startup and on every change message, at cycle
//! boundaries. An error in one program's cycle never terminates the loop.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use sqlx::postgres::PgListener;
use sqlx::{PgPool, Row};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use uho_decode::{EventDecoder, InstructionDecoder, TokenTransferDecoder};
use uho_idl::ProgramSpec;
use uho_rpc::SolanaRpc;

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::poller::TransactionPoller;
use crate::subscription::{load_active_programs, ActiveProgram, ControlMessage, Subscriber};
use crate::writer::{FanoutWriter, TxLogRecord};

/// Counters for observability; snapshot via [`Orchestrator::metrics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestMetrics {
    pub cycles: u64,
    pub polls: u64,
    pub transactions: u64,
    pub events_decoded: u64,
    pub instructions_decoded: u64,
    pub token_transfers_decoded: u64,
    pub write_failures: u64,
}

/// Everything one registered program needs to poll and decode.
struct ProgramWorker<C> {
    spec: Arc<ProgramSpec>,
    poller: TransactionPoller<C>,
    event_decoder: EventDecoder,
    instruction_decoder: Option<InstructionDecoder>,
    token_decoder: Option<TokenTransferDecoder>,
    subscribers: Vec<Subscriber>,
}

/// The multi-program ingestion orchestrator.
pub struct Orchestrator<C> {
    config: IngestConfig,
    pool: PgPool,
    rpc: Arc<C>,
    writer: FanoutWriter,
    programs: IndexMap<String, ProgramWorker<C>>,
    shutdown: watch::Receiver<bool>,
    control_rx: mpsc::UnboundedReceiver<String>,
    control_task: Option<JoinHandle<()>>,
    metrics: IngestMetrics,
}

impl<C: SolanaRpc + 'static> Orchestrator<C> {
    /// Build an orchestrator. Fails fast on invalid configuration — before
    /// any polling begins.
    pub fn new(
        config: IngestConfig,
        pool: PgPool,
        rpc: Arc<C>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        let writer = FanoutWriter::new(
            pool.clone(),
            config.event_channel.clone(),
            config.max_notify_payload,
        );
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let control_task = spawn_control_listener(
            pool.clone(),
            config.control_channel.clone(),
            control_tx,
            shutdown.clone(),
        );
        Ok(Self {
            config,
            pool,
            rpc,
            writer,
            programs: IndexMap::new(),
            shutdown,
            control_rx,
            control_task: Some(control_task),
            metrics: IngestMetrics::default(),
        })
    }

    pub fn metrics(&self) -> IngestMetrics {
        self.metrics
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Load the working set and run the polling loop until shutdown.
    pub async fn run(&mut self) -> Result<(), IngestError> {
        self.refresh_programs().await?;
        info!(programs = self.programs.len(), "orchestrator started");

        let inter_program_delay = Duration::from_millis(self.config.inter_program_delay_ms);
        let cycle_interval = Duration::from_millis(self.config.cycle_interval_ms);

        while !*self.shutdown.borrow() {
            if self.drain_control_messages() {
                if let Err(e) = self.refresh_programs().await {
                    error!(error = %e, "failed to refresh active programs; keeping current set");
                }
            }

            let ids: Vec<String> = self.programs.keys().cloned().collect();
            for id in ids {
                if *self.shutdown.borrow() {
                    break;
                }
                if let Err(e) = self.poll_program(&id).await {
                    error!(program = %id, error = %e, "program cycle failed; will retry next cycle");
                }
                tokio::time::sleep(inter_program_delay).await;
            }

            self.metrics.cycles += 1;
            tokio::time::sleep(cycle_interval).await;
        }

        self.stop().await;
        Ok(())
    }

    /// Release the control subscription and exit.
    async fn stop(&mut self) {
        if let Some(task) = self.control_task.take() {
            task.abort();
        }
        info!("orchestrator stopped");
    }

    /// Returns `true` when at least one control message arrived.
    fn drain_control_messages(&mut self) -> bool {
        let mut changed = false;
        while let Ok(payload) = self.control_rx.try_recv() {
            changed = true;
            match serde_json::from_str::<ControlMessage>(&payload) {
                Ok(msg) => info!(action = %msg.action, program = %msg.program_id, "subscription change"),
                Err(_) => debug!(payload = %payload, "unparsed control message"),
            }
        }
        changed
    }

    /// Reconcile the registry against the active-programs view: register new
    /// programs, update subscriber lists in place, evict the departed.
    async fn refresh_programs(&mut self) -> Result<(), IngestError> {
        let active = load_active_programs(&self.pool).await?;

        let active_ids: Vec<&str> = active.iter().map(|p| p.program_id.as_str()).collect();
        let stale: Vec<String> = self
            .programs
            .keys()
            .filter(|id| !active_ids.contains(&id.as_str()))
            .cloned()
            .collect();
        for id in stale {
            info!(program = %id, "removing program with no remaining subscribers");
            self.programs.shift_remove(&id);
        }

        for program in active {
            if let Some(worker) = self.programs.get_mut(&program.program_id) {
                // Known program: only the subscriber list changes; cursor
                // advancement continues uninterrupted.
                worker.instruction_decoder = program
                    .subscribers
                    .iter()
                    .any(Subscriber::wants_instructions)
                    .then(|| InstructionDecoder::new(worker.spec.clone()));
                worker.token_decoder = program
                    .subscribers
                    .iter()
                    .any(|s| s.index_token_transfers)
                    .then(TokenTransferDecoder::new);
                worker.subscribers = program.subscribers;
                continue;
            }
            match self.register_program(&program).await {
                Ok(worker) => {
                    info!(
                        program = %program.program_id,
                        subscribers = worker.subscribers.len(),
                        "registered program"
                    );
                    self.programs.insert(program.program_id.clone(), worker);
                }
                Err(e) => {
                    error!(program = %program.program_id, error = %e, "failed to register program");
                }
            }
        }
        Ok(())
    }

    async fn register_program(
        &self,
        program: &ActiveProgram,
    ) -> Result<ProgramWorker<C>, IngestError> {
        let canonical = program
            .subscribers
            .iter()
            .find(|s| !s.idl.is_null())
            .ok_or_else(|| {
                IngestError::Other(format!(
                    "program {} has no subscriber with an IDL",
                    program.program_id
                ))
            })?;
        let spec = Arc::new(ProgramSpec::from_value(
            &canonical.idl,
            Some(&program.program_id),
        )?);

        let mut poller = TransactionPoller::new(
            self.rpc.clone(),
            program.program_id.clone(),
            self.config.signature_batch_size,
            self.config.commitment,
            Duration::from_millis(self.config.tx_fetch_delay_ms),
        );
        poller.set_cursor(self.resume_cursor(program).await);

        Ok(ProgramWorker {
            event_decoder: EventDecoder::new(spec.clone()),
            instruction_decoder: program
                .subscribers
                .iter()
                .any(Subscriber::wants_instructions)
                .then(|| InstructionDecoder::new(spec.clone())),
            token_decoder: program
                .subscribers
                .iter()
                .any(|s| s.index_token_transfers)
                .then(TokenTransferDecoder::new),
            poller,
            spec,
            subscribers: program.subscribers.clone(),
        })
    }

    /// Resume from the most-advanced subscriber cursor: the `last_signature`
    /// stored at the maximum `last_slot` across all subscriber schemas.
    async fn resume_cursor(&self, program: &ActiveProgram) -> Option<String> {
        let mut best: Option<(i64, String)> = None;
        for subscriber in &program.subscribers {
            let sql = format!(
                "SELECT last_slot, last_signature FROM {}._uho_state WHERE program_id = $1",
                uho_idl::quote_ident(&subscriber.schema)
            );
            let row = match sqlx::query(&sql)
                .bind(&program.program_id)
                .fetch_optional(&self.pool)
                .await
            {
                Ok(row) => row,
                Err(e) => {
                    warn!(schema = %subscriber.schema, error = %e, "cursor lookup failed");
                    continue;
                }
            };
            let Some(row) = row else { continue };
            let slot: Option<i64> = row.try_get("last_slot").ok();
            let signature: Option<String> = row.try_get("last_signature").ok().flatten();
            if let (Some(slot), Some(signature)) = (slot, signature) {
                if best.as_ref().map_or(true, |(s, _)| slot > *s) {
                    best = Some((slot, signature));
                }
            }
        }
        best.map(|(_, signature)| signature)
    }

    async fn poll_program(&mut self, id: &str) -> Result<(), IngestError> {
        let worker = self
            .programs
            .get_mut(id)
            .ok_or_else(|| IngestError::UnknownProgram(id.to_string()))?;

        let transactions = worker.poller.poll().await?;
        self.metrics.polls += 1;
        if transactions.is_empty() {
            return Ok(());
        }
        self.metrics.transactions += transactions.len() as u64;

        let mut events = Vec::new();
        let mut instructions = Vec::new();
        let mut token_transfers = Vec::new();
        let mut tx_logs = Vec::with_capacity(transactions.len());
        for tx in &transactions {
            events.extend(worker.event_decoder.decode_transaction(tx));
            if let Some(decoder) = &worker.instruction_decoder {
                instructions.extend(decoder.decode_transaction(tx));
            }
            if let Some(decoder) = &worker.token_decoder {
                token_transfers.extend(decoder.decode_transaction(tx));
            }
            tx_logs.push(TxLogRecord {
                tx_signature: tx.signature().to_string(),
                slot: tx.slot,
                logs: tx.log_messages().to_vec(),
            });
        }
        self.metrics.events_decoded += events.len() as u64;
        self.metrics.instructions_decoded += instructions.len() as u64;
        self.metrics.token_transfers_decoded += token_transfers.len() as u64;

        // The writer runs even when the batch decoded to nothing: it is the
        // only place the advanced cursor reaches each subscriber's
        // `_uho_state` row, and restart resume reads from there.
        let cursor = worker.poller.state().last_signature;
        let outcomes = self
            .writer
            .write(
                &worker.spec,
                &events,
                &instructions,
                &tx_logs,
                &token_transfers,
                &worker.subscribers,
                cursor.as_deref(),
            )
            .await;
        for outcome in &outcomes {
            if outcome.result.is_err() {
                self.metrics.write_failures += 1;
            }
        }
        Ok(())
    }
}

/// Subscribe to the control channel and forward payloads. Reconnects with
/// backoff until shutdown.
fn spawn_control_listener(
    pool: PgPool,
    channel: String,
    tx: mpsc::UnboundedSender<String>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = 0u32;
        loop {
            if *shutdown.borrow() {
                return;
            }
            let mut listener = match PgListener::connect_with(&pool).await {
                Ok(listener) => listener,
                Err(e) => {
                    warn!(error = %e, "control listener connect failed");
                    backoff += 1;
                    tokio::time::sleep(Duration::from_millis(500 * 2u64.pow(backoff.min(6)))).await;
                    continue;
                }
            };
            if let Err(e) = listener.listen(&channel).await {
                warn!(channel = %channel, error = %e, "LISTEN failed");
                backoff += 1;
                tokio::time::sleep(Duration::from_millis(500 * 2u64.pow(backoff.min(6)))).await;
                continue;
            }
            info!(channel = %channel, "control channel subscribed");
            backoff = 0;

            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        if tx.send(notification.payload().to_string()).is_err() {
                            return; // Orchestrator dropped
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "control channel dropped, reconnecting");
                        break;
                    }
                }
            }
        }
    })
}
