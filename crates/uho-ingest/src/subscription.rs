//! Subscriber and active-program models, loaded from the control plane's
//! `active_program_subscriptions` relation.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::error::IngestError;

/// A tenant indexing a given program into a dedicated schema.
///
/// Mutated by the control plane; the ingestion engine only reads.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscriber {
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    /// The tenant's Postgres schema name.
    pub schema: String,
    #[serde(default)]
    pub program_name: Option<String>,
    #[serde(default)]
    pub enabled_events: Vec<String>,
    #[serde(default)]
    pub enabled_instructions: Vec<String>,
    /// Whether generic token transfers are indexed for this tenant.
    /// Absent from older control-plane rows; defaults to off.
    #[serde(default)]
    pub index_token_transfers: bool,
    /// The IDL this subscriber registered for the program.
    #[serde(default)]
    pub idl: Value,
}

impl Subscriber {
    pub fn wants_event(&self, event_name: &str) -> bool {
        self.enabled_events.iter().any(|e| e == event_name)
    }

    pub fn wants_instruction(&self, instruction_name: &str) -> bool {
        self.enabled_instructions.iter().any(|i| i == instruction_name)
    }

    pub fn wants_instructions(&self) -> bool {
        !self.enabled_instructions.is_empty()
    }
}

/// One row of the active-programs view: a program and all of its subscribers.
#[derive(Debug, Clone)]
pub struct ActiveProgram {
    pub program_id: String,
    pub chain: String,
    pub subscribers: Vec<Subscriber>,
}

/// Load the current working set from `active_program_subscriptions`.
pub async fn load_active_programs(pool: &PgPool) -> Result<Vec<ActiveProgram>, IngestError> {
    let rows = sqlx::query(
        "SELECT program_id, chain, subscribers
         FROM active_program_subscriptions",
    )
    .fetch_all(pool)
    .await?;

    let mut programs = Vec::with_capacity(rows.len());
    for row in rows {
        let subscribers: Value = row.try_get("subscribers")?;
        programs.push(ActiveProgram {
            program_id: row.try_get("program_id")?,
            chain: row.try_get("chain")?,
            subscribers: serde_json::from_value(subscribers)?,
        });
    }
    Ok(programs)
}

/// Control-channel payload announcing a subscription change. Any message on
/// the channel triggers a full refresh; this shape is parsed for logging.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlMessage {
    pub action: String,
    pub program_id: String,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "user_id must be a string or number, got {other}"
        ))),
    }
}
