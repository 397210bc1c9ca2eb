//! Decoded record shapes — the decoder outputs the fan-out writer persists.

use indexmap::IndexMap;
use serde::Serialize;

use crate::value::NormalizedValue;

/// A decoded program event from a `Program data:` log line.
#[derive(Debug, Clone, Serialize)]
pub struct DecodedEvent {
    pub event_name: String,
    pub program_id: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub tx_signature: String,
    pub ix_index: u32,
    pub inner_ix_index: Option<u32>,
    /// Normalized field values keyed by snake_case column name.
    pub data: IndexMap<String, NormalizedValue>,
}

/// A decoded top-level or inner (CPI) program instruction.
#[derive(Debug, Clone, Serialize)]
pub struct DecodedInstruction {
    pub instruction_name: String,
    pub program_id: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub tx_signature: String,
    pub ix_index: u32,
    pub inner_ix_index: Option<u32>,
    /// Named accounts → pubkey, in IDL declaration order.
    pub accounts: IndexMap<String, String>,
    /// Argument values keyed by snake_case column name.
    pub args: IndexMap<String, NormalizedValue>,
}

/// The token-program instruction kinds the transfer decoder recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenInstructionType {
    Transfer,
    TransferChecked,
    MintTo,
    MintToChecked,
    Burn,
    BurnChecked,
}

impl TokenInstructionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenInstructionType::Transfer => "transfer",
            TokenInstructionType::TransferChecked => "transferChecked",
            TokenInstructionType::MintTo => "mintTo",
            TokenInstructionType::MintToChecked => "mintToChecked",
            TokenInstructionType::Burn => "burn",
            TokenInstructionType::BurnChecked => "burnChecked",
        }
    }
}

/// A decoded standard token-program transfer, mint, or burn.
///
/// `program_id` is the token program's address, not the user program's.
#[derive(Debug, Clone, Serialize)]
pub struct DecodedTokenTransfer {
    pub program_id: String,
    pub instruction_type: TokenInstructionType,
    pub source: String,
    pub destination: String,
    pub authority: String,
    pub mint: Option<String>,
    /// Decimal-string amount, never truncated.
    pub amount: String,
    pub decimals: Option<u8>,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub tx_signature: String,
    pub ix_index: u32,
    pub inner_ix_index: Option<u32>,
}
