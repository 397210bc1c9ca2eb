//! Solana RPC wire types — the subset of `getSignaturesForAddress` and
//! `getTransaction` (jsonParsed encoding) shapes that the indexer consumes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Confirmation level at which transactions are returned by the RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl std::str::FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(format!("unknown commitment level: {other}")),
        }
    }
}

/// One entry of a `getSignaturesForAddress` page (newest first).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    /// Set when the transaction failed on-chain.
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub block_time: Option<i64>,
}

impl SignatureInfo {
    pub fn is_err(&self) -> bool {
        self.err.is_some()
    }
}

/// A full parsed transaction as returned by `getTransaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTransaction {
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    pub transaction: TransactionContent,
    #[serde(default)]
    pub meta: Option<TxMeta>,
}

impl ParsedTransaction {
    /// The transaction's primary signature.
    pub fn signature(&self) -> &str {
        self.transaction
            .signatures
            .first()
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Log messages, empty when meta is absent.
    pub fn log_messages(&self) -> &[String] {
        self.meta
            .as_ref()
            .and_then(|m| m.log_messages.as_deref())
            .unwrap_or(&[])
    }

    /// Inner (CPI) instruction groups, empty when meta is absent.
    pub fn inner_instruction_groups(&self) -> &[InnerInstructionGroup] {
        self.meta
            .as_ref()
            .and_then(|m| m.inner_instructions.as_deref())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionContent {
    pub signatures: Vec<String>,
    pub message: TxMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxMessage {
    #[serde(default)]
    pub account_keys: Vec<AccountKey>,
    pub instructions: Vec<TxInstruction>,
}

/// jsonParsed account keys are objects; some encodings return bare strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountKey {
    Detailed { pubkey: String },
    Plain(String),
}

impl AccountKey {
    pub fn pubkey(&self) -> &str {
        match self {
            AccountKey::Detailed { pubkey } => pubkey,
            AccountKey::Plain(s) => s,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxMeta {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub log_messages: Option<Vec<String>>,
    #[serde(default)]
    pub inner_instructions: Option<Vec<InnerInstructionGroup>>,
}

/// Inner instructions emitted under the top-level instruction at `index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InnerInstructionGroup {
    pub index: u32,
    pub instructions: Vec<TxInstruction>,
}

/// An instruction in either of jsonParsed's two encodings: pre-parsed by the
/// RPC, or partially decoded with base58 data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TxInstruction {
    Parsed(ParsedInstruction),
    Raw(RawInstruction),
}

impl TxInstruction {
    pub fn program_id(&self) -> &str {
        match self {
            TxInstruction::Parsed(p) => &p.program_id,
            TxInstruction::Raw(r) => &r.program_id,
        }
    }
}

/// `{programId, accounts: [pubkey...], data: base58}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInstruction {
    pub program_id: String,
    #[serde(default)]
    pub accounts: Vec<String>,
    pub data: String,
}

/// `{program, programId, parsed: {type, info}}`. Some programs (memo) put a
/// bare string under `parsed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedInstruction {
    #[serde(default)]
    pub program: Option<String>,
    pub program_id: String,
    pub parsed: Value,
}

impl ParsedInstruction {
    /// The parsed instruction type name, when `parsed` is the
    /// `{type, info}` object form.
    pub fn parsed_type(&self) -> Option<&str> {
        self.parsed.get("type")?.as_str()
    }

    /// The parsed `info` map.
    pub fn info(&self) -> Option<&Value> {
        self.parsed.get("info")
    }
}
