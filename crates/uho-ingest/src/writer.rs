//! Fan-out writer — replicates a decoded batch into every subscriber's
//! schema and emits one best-effort broadcast.
//!
//! Each subscriber is written in isolation: a short-lived transaction on a
//! pooled connection, scoped to the tenant's schema via a session-local
//! search path. Inserts upsert on the `(tx_signature, ix_index,
//! inner_ix_index)` unique triple with DO NOTHING, so replays after a crash
//! or cursor rewind are absorbed without duplicates.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::postgres::{PgArguments, PgPool};
use sqlx::query::Query;
use sqlx::Postgres;
use tracing::{debug, error, warn};

use uho_decode::{DecodedEvent, DecodedInstruction, DecodedTokenTransfer, NormalizedValue};
use uho_idl::program::FieldDef;
use uho_idl::{quote_ident, snake_case, table_name, ColumnType, ProgramSpec};

use crate::error::IngestError;
use crate::subscription::Subscriber;

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Raw log messages for one transaction, written to the shared `_tx_logs`
/// table when the transaction contributed records.
#[derive(Debug, Clone)]
pub struct TxLogRecord {
    pub tx_signature: String,
    pub slot: u64,
    pub logs: Vec<String>,
}

/// Rows actually inserted for one subscriber (conflicts excluded).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub events: u64,
    pub instructions: u64,
    pub token_transfers: u64,
}

impl WriteCounts {
    pub fn total(&self) -> u64 {
        self.events + self.instructions + self.token_transfers
    }
}

/// The result of one subscriber's write, success or contained failure.
#[derive(Debug)]
pub struct SubscriberOutcome {
    pub user_id: String,
    pub schema: String,
    pub result: Result<WriteCounts, IngestError>,
}

/// Writes decoded batches into tenant schemas and broadcasts deliveries.
pub struct FanoutWriter {
    pool: PgPool,
    event_channel: String,
    max_notify_payload: usize,
}

impl FanoutWriter {
    pub fn new(pool: PgPool, event_channel: impl Into<String>, max_notify_payload: usize) -> Self {
        Self {
            pool,
            event_channel: event_channel.into(),
            max_notify_payload,
        }
    }

    /// Write one program's decoded batch for every subscriber, then emit the
    /// broadcast. One subscriber's failure never affects another's write.
    #[allow(clippy::too_many_arguments)]
    pub async fn write(
        &self,
        program: &ProgramSpec,
        events: &[DecodedEvent],
        instructions: &[DecodedInstruction],
        tx_logs: &[TxLogRecord],
        token_transfers: &[DecodedTokenTransfer],
        subscribers: &[Subscriber],
        cursor_signature: Option<&str>,
    ) -> Vec<SubscriberOutcome> {
        let mut outcomes = Vec::with_capacity(subscribers.len());

        for subscriber in subscribers {
            let result = self
                .write_subscriber(
                    program,
                    events,
                    instructions,
                    tx_logs,
                    token_transfers,
                    subscriber,
                    cursor_signature,
                )
                .await;

            if let Err(e) = &result {
                error!(
                    schema = %subscriber.schema,
                    program = %program.program_id,
                    error = %e,
                    "subscriber write failed"
                );
                self.mark_error(&subscriber.schema, &program.program_id, &e.to_string())
                    .await;
            }

            outcomes.push(SubscriberOutcome {
                user_id: subscriber.user_id.clone(),
                schema: subscriber.schema.clone(),
                result,
            });
        }

        let delivered: Vec<String> = outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.user_id.clone())
            .collect();
        if !events.is_empty() && !delivered.is_empty() {
            self.broadcast(&program.program_id, events, &delivered).await;
        }

        outcomes
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_subscriber(
        &self,
        program: &ProgramSpec,
        events: &[DecodedEvent],
        instructions: &[DecodedInstruction],
        tx_logs: &[TxLogRecord],
        token_transfers: &[DecodedTokenTransfer],
        subscriber: &Subscriber,
        cursor_signature: Option<&str>,
    ) -> Result<WriteCounts, IngestError> {
        let events: Vec<&DecodedEvent> = events
            .iter()
            .filter(|e| subscriber.wants_event(&e.event_name))
            .collect();
        let instructions: Vec<&DecodedInstruction> = instructions
            .iter()
            .filter(|i| subscriber.wants_instruction(&i.instruction_name))
            .collect();
        let token_transfers: Vec<&DecodedTokenTransfer> = if subscriber.index_token_transfers {
            token_transfers.iter().collect()
        } else {
            vec![]
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "SET LOCAL search_path TO {}",
            quote_ident(&subscriber.schema)
        ))
        .execute(&mut *tx)
        .await?;

        let mut counts = WriteCounts::default();
        let mut written_signatures: HashSet<&str> = HashSet::new();
        let mut max_slot: i64 = 0;

        for event in &events {
            match self.insert_event(&mut tx, program, event).await {
                Ok(inserted) => {
                    counts.events += inserted;
                    written_signatures.insert(event.tx_signature.as_str());
                    max_slot = max_slot.max(event.slot as i64);
                }
                Err(IngestError::Other(reason)) => {
                    warn!(event = %event.event_name, %reason, "skipping unrepresentable event row");
                }
                Err(e) => return Err(e),
            }
        }

        for instruction in &instructions {
            match self.insert_instruction(&mut tx, program, instruction).await {
                Ok(inserted) => {
                    counts.instructions += inserted;
                    written_signatures.insert(instruction.tx_signature.as_str());
                    max_slot = max_slot.max(instruction.slot as i64);
                }
                Err(IngestError::Other(reason)) => {
                    warn!(instruction = %instruction.instruction_name, %reason, "skipping unrepresentable instruction row");
                }
                Err(e) => return Err(e),
            }
        }

        for transfer in &token_transfers {
            counts.token_transfers += self.insert_token_transfer(&mut tx, transfer).await?;
            max_slot = max_slot.max(transfer.slot as i64);
        }

        for log in tx_logs {
            if !written_signatures.contains(log.tx_signature.as_str()) {
                continue;
            }
            sqlx::query(
                "INSERT INTO _tx_logs (tx_signature, slot, logs)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (tx_signature) DO NOTHING",
            )
            .bind(&log.tx_signature)
            .bind(log.slot as i64)
            .bind(&log.logs)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO _uho_state (program_id, last_slot, last_signature, events_indexed, last_poll_at, status, error)
             VALUES ($1, $2, $3, $4, NOW(), 'running', NULL)
             ON CONFLICT (program_id) DO UPDATE SET
                last_slot      = GREATEST(COALESCE(_uho_state.last_slot, 0), EXCLUDED.last_slot),
                last_signature = COALESCE(EXCLUDED.last_signature, _uho_state.last_signature),
                events_indexed = COALESCE(_uho_state.events_indexed, 0) + EXCLUDED.events_indexed,
                last_poll_at   = NOW(),
                status         = 'running',
                error          = NULL",
        )
        .bind(&program.program_id)
        .bind(max_slot)
        .bind(cursor_signature)
        .bind(counts.total() as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(
            schema = %subscriber.schema,
            events = counts.events,
            instructions = counts.instructions,
            token_transfers = counts.token_transfers,
            "subscriber batch written"
        );
        Ok(counts)
    }

    async fn insert_event(
        &self,
        tx: &mut sqlx::Transaction<'_, Postgres>,
        program: &ProgramSpec,
        event: &DecodedEvent,
    ) -> Result<u64, IngestError> {
        let Some(def) = program.events.iter().find(|e| e.name == event.event_name) else {
            warn!(event = %event.event_name, "no event definition for decoded record, skipping");
            return Ok(0);
        };
        let table = table_name(&program.program_name, &event.event_name);
        let sql = insert_sql(&table, &def.fields);

        let mut query = sqlx::query(&sql)
            .bind(event.slot as i64)
            .bind(timestamp(event.block_time))
            .bind(&event.tx_signature)
            .bind(event.ix_index as i32)
            .bind(event.inner_ix_index.map(|i| i as i32));
        for field in &def.fields {
            let value = event.data.get(&field.column).unwrap_or(&NormalizedValue::Null);
            query = bind_normalized(query, value, field.storage, &field.column)?;
        }

        Ok(query.execute(&mut **tx).await?.rows_affected())
    }

    async fn insert_instruction(
        &self,
        tx: &mut sqlx::Transaction<'_, Postgres>,
        program: &ProgramSpec,
        instruction: &DecodedInstruction,
    ) -> Result<u64, IngestError> {
        let Some(def) = program
            .instructions
            .iter()
            .find(|i| i.name == instruction.instruction_name)
        else {
            warn!(instruction = %instruction.instruction_name, "no instruction definition for decoded record, skipping");
            return Ok(0);
        };
        let table = table_name(&program.program_name, &instruction.instruction_name);

        let mut columns = base_columns();
        let mut placeholders = base_placeholders();
        let mut n = columns.len();
        for account in &def.accounts {
            n += 1;
            columns.push(quote_ident(&snake_case(account)));
            placeholders.push(format!("${n}"));
        }
        for arg in &def.args {
            n += 1;
            columns.push(quote_ident(&arg.column));
            placeholders.push(placeholder(n, arg.storage));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) \
             ON CONFLICT (tx_signature, ix_index, inner_ix_index) DO NOTHING",
            quote_ident(&table),
            columns.join(", "),
            placeholders.join(", "),
        );

        let mut query = sqlx::query(&sql)
            .bind(instruction.slot as i64)
            .bind(timestamp(instruction.block_time))
            .bind(&instruction.tx_signature)
            .bind(instruction.ix_index as i32)
            .bind(instruction.inner_ix_index.map(|i| i as i32));
        for account in &def.accounts {
            let pubkey = instruction
                .accounts
                .get(account)
                .map(String::as_str)
                .unwrap_or("unknown");
            query = query.bind(pubkey.to_string());
        }
        for arg in &def.args {
            let value = instruction
                .args
                .get(&arg.column)
                .unwrap_or(&NormalizedValue::Null);
            query = bind_normalized(query, value, arg.storage, &arg.column)?;
        }

        Ok(query.execute(&mut **tx).await?.rows_affected())
    }

    async fn insert_token_transfer(
        &self,
        tx: &mut sqlx::Transaction<'_, Postgres>,
        transfer: &DecodedTokenTransfer,
    ) -> Result<u64, IngestError> {
        let result = sqlx::query(
            "INSERT INTO _token_transfers
                (program_id, instruction_type, source, destination, authority, mint,
                 amount, decimals, slot, block_time, tx_signature, ix_index, inner_ix_index)
             VALUES ($1, $2, $3, $4, $5, $6, $7::numeric, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (tx_signature, ix_index, inner_ix_index) DO NOTHING",
        )
        .bind(&transfer.program_id)
        .bind(transfer.instruction_type.as_str())
        .bind(&transfer.source)
        .bind(&transfer.destination)
        .bind(&transfer.authority)
        .bind(&transfer.mint)
        .bind(&transfer.amount)
        .bind(transfer.decimals.map(|d| d as i32))
        .bind(transfer.slot as i64)
        .bind(timestamp(transfer.block_time))
        .bind(&transfer.tx_signature)
        .bind(transfer.ix_index as i32)
        .bind(transfer.inner_ix_index.map(|i| i as i32))
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// Best-effort error marker on the subscriber's cursor row; never
    /// propagates its own failure.
    async fn mark_error(&self, schema: &str, program_id: &str, message: &str) {
        let sql = format!(
            "INSERT INTO {}._uho_state (program_id, status, error, last_poll_at)
             VALUES ($1, 'error', $2, NOW())
             ON CONFLICT (program_id) DO UPDATE SET
                status = 'error', error = EXCLUDED.error, last_poll_at = NOW()",
            quote_ident(schema)
        );
        if let Err(e) = sqlx::query(&sql)
            .bind(program_id)
            .bind(message)
            .execute(&self.pool)
            .await
        {
            warn!(schema, error = %e, "failed to mark subscriber error state");
        }
    }

    /// Emit the delivery broadcast. Fire-and-forget: failures are logged,
    /// writes are already durable.
    async fn broadcast(&self, program_id: &str, events: &[DecodedEvent], user_ids: &[String]) {
        for payload in build_broadcast_payloads(program_id, events, user_ids, self.max_notify_payload)
        {
            if let Err(e) = sqlx::query("SELECT pg_notify($1, $2)")
                .bind(&self.event_channel)
                .bind(&payload)
                .execute(&self.pool)
                .await
            {
                warn!(channel = %self.event_channel, error = %e, "broadcast failed");
            }
        }
    }
}

const BASE_COLUMNS: [&str; 5] = ["slot", "block_time", "tx_signature", "ix_index", "inner_ix_index"];

fn base_columns() -> Vec<String> {
    BASE_COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn base_placeholders() -> Vec<String> {
    (1..=BASE_COLUMNS.len()).map(|n| format!("${n}")).collect()
}

fn insert_sql(table: &str, fields: &[FieldDef]) -> String {
    let mut columns = base_columns();
    let mut placeholders = base_placeholders();
    for (i, field) in fields.iter().enumerate() {
        let n = BASE_COLUMNS.len() + i + 1;
        columns.push(quote_ident(&field.column));
        placeholders.push(placeholder(n, field.storage));
    }
    format!(
        "INSERT INTO {} ({}) VALUES ({}) \
         ON CONFLICT (tx_signature, ix_index, inner_ix_index) DO NOTHING",
        quote_ident(table),
        columns.join(", "),
        placeholders.join(", "),
    )
}

/// 128-bit values travel as text and are cast server-side.
fn placeholder(n: usize, column: ColumnType) -> String {
    match column {
        ColumnType::Numeric => format!("${n}::numeric"),
        _ => format!("${n}"),
    }
}

fn timestamp(block_time: Option<i64>) -> Option<DateTime<Utc>> {
    block_time.and_then(|t| DateTime::from_timestamp(t, 0))
}

/// Bind a normalized value according to its storage column type. A u64 that
/// cannot fit a signed 64-bit column rejects the row (lossless-or-absent).
fn bind_normalized<'q>(
    query: PgQuery<'q>,
    value: &NormalizedValue,
    column: ColumnType,
    name: &str,
) -> Result<PgQuery<'q>, IngestError> {
    let mismatch = || {
        IngestError::Other(format!(
            "value {value} does not fit column '{name}' ({})",
            column.sql_name()
        ))
    };
    Ok(match column {
        ColumnType::Integer => {
            let bound: Option<i32> = match value {
                NormalizedValue::Int(v) => Some(*v),
                NormalizedValue::Uint(v) => Some(*v as i32),
                NormalizedValue::Null => None,
                _ => return Err(mismatch()),
            };
            query.bind(bound)
        }
        ColumnType::BigInt => {
            let bound: Option<i64> = match value {
                NormalizedValue::Null => None,
                other => Some(other.as_i64().ok_or_else(mismatch)?),
            };
            query.bind(bound)
        }
        ColumnType::Numeric => {
            let bound: Option<String> = match value {
                NormalizedValue::Decimal128(s) => Some(s.clone()),
                NormalizedValue::ULong(v) => Some(v.to_string()),
                NormalizedValue::Long(v) => Some(v.to_string()),
                NormalizedValue::Null => None,
                _ => return Err(mismatch()),
            };
            query.bind(bound)
        }
        ColumnType::DoublePrecision => {
            let bound: Option<f64> = match value {
                NormalizedValue::Float(v) => Some(*v),
                NormalizedValue::Null => None,
                _ => return Err(mismatch()),
            };
            query.bind(bound)
        }
        ColumnType::Boolean => {
            let bound: Option<bool> = match value {
                NormalizedValue::Bool(v) => Some(*v),
                NormalizedValue::Null => None,
                _ => return Err(mismatch()),
            };
            query.bind(bound)
        }
        ColumnType::Text => {
            let bound: Option<String> = match value {
                NormalizedValue::Str(s) => Some(s.clone()),
                NormalizedValue::Pubkey(p) => Some(p.clone()),
                NormalizedValue::Null => None,
                _ => return Err(mismatch()),
            };
            query.bind(bound)
        }
        ColumnType::Bytea => {
            let bound: Option<Vec<u8>> = match value {
                NormalizedValue::Bytes(b) => Some(b.clone()),
                NormalizedValue::Null => None,
                _ => return Err(mismatch()),
            };
            query.bind(bound)
        }
        ColumnType::Jsonb => {
            let bound: Option<serde_json::Value> = match value {
                NormalizedValue::Null => None,
                other => Some(other.to_json()),
            };
            query.bind(bound)
        }
    })
}

/// Build the broadcast payloads: one combined message, or per-event messages
/// when the combined serialization exceeds the channel bound.
pub fn build_broadcast_payloads(
    program_id: &str,
    events: &[DecodedEvent],
    user_ids: &[String],
    max_len: usize,
) -> Vec<String> {
    let event_json = |e: &DecodedEvent| {
        json!({
            "event_name": e.event_name,
            "slot": e.slot,
            "tx_signature": e.tx_signature,
            "data": e.data,
        })
    };

    let combined = json!({
        "program_id": program_id,
        "events": events.iter().map(event_json).collect::<Vec<_>>(),
        "subscribers": user_ids,
    })
    .to_string();

    if combined.len() <= max_len || events.len() <= 1 {
        return vec![combined];
    }

    events
        .iter()
        .map(|e| {
            json!({
                "program_id": program_id,
                "events": [event_json(e)],
                "subscribers": user_ids,
            })
            .to_string()
        })
        .collect()
}
