//! Cross-cutting token-transfer decoder for the Token and Token-2022
//! programs — transfers, mints, and burns, raw or RPC-parsed.

use serde_json::Value;

use uho_idl::registry::{TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID};
use uho_rpc::{ParsedInstruction, ParsedTransaction, RawInstruction, TxInstruction};

use crate::instruction::scan_instructions;
use crate::record::{DecodedTokenTransfer, TokenInstructionType};

/// Decodes standard token-program instructions out of any transaction,
/// regardless of which user program the transaction targets.
#[derive(Debug, Default, Clone)]
pub struct TokenTransferDecoder;

impl TokenTransferDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode every token transfer/mint/burn in `tx`, top-level and inner.
    /// Non-matching instructions are skipped silently.
    pub fn decode_transaction(&self, tx: &ParsedTransaction) -> Vec<DecodedTokenTransfer> {
        let mut out = Vec::new();
        for entry in scan_instructions(tx) {
            let program_id = entry.instruction.program_id();
            if program_id != TOKEN_PROGRAM_ID && program_id != TOKEN_2022_PROGRAM_ID {
                continue;
            }
            let parts = match entry.instruction {
                TxInstruction::Raw(raw) => decode_raw(raw),
                TxInstruction::Parsed(parsed) => decode_parsed(parsed),
            };
            if let Some(parts) = parts {
                out.push(DecodedTokenTransfer {
                    program_id: program_id.to_string(),
                    instruction_type: parts.instruction_type,
                    source: parts.source,
                    destination: parts.destination,
                    authority: parts.authority,
                    mint: parts.mint,
                    amount: parts.amount,
                    decimals: parts.decimals,
                    slot: tx.slot,
                    block_time: tx.block_time,
                    tx_signature: tx.signature().to_string(),
                    ix_index: entry.ix_index,
                    inner_ix_index: entry.inner_ix_index,
                });
            }
        }
        out
    }
}

struct TransferParts {
    instruction_type: TokenInstructionType,
    source: String,
    destination: String,
    authority: String,
    mint: Option<String>,
    amount: String,
    decimals: Option<u8>,
}

/// Raw-mode dispatch on the first data byte.
///
/// | disc | type            | layout                                         |
/// |------|-----------------|------------------------------------------------|
/// | 3    | transfer        | amount u64 LE @1; [src, dst, auth]             |
/// | 12   | transferChecked | amount @1, decimals @9; [src, mint, dst, auth] |
/// | 7    | mintTo          | amount @1; [mint, dst, auth]                   |
/// | 8    | burn            | amount @1; [src, mint, auth]                   |
/// | 14   | mintToChecked   | like 7 with decimals @9                        |
/// | 15   | burnChecked     | like 8 with decimals @9                        |
fn decode_raw(raw: &RawInstruction) -> Option<TransferParts> {
    let data = bs58::decode(&raw.data).into_vec().ok()?;
    let disc = *data.first()?;
    let accounts = &raw.accounts;

    let amount_at = |offset: usize| -> Option<u64> {
        let bytes: [u8; 8] = data.get(offset..offset + 8)?.try_into().ok()?;
        Some(u64::from_le_bytes(bytes))
    };
    let account = |i: usize| accounts.get(i).cloned();

    let parts = match disc {
        3 => {
            if data.len() < 9 || accounts.len() < 3 {
                return None;
            }
            TransferParts {
                instruction_type: TokenInstructionType::Transfer,
                source: account(0)?,
                destination: account(1)?,
                authority: account(2)?,
                mint: None,
                amount: amount_at(1)?.to_string(),
                decimals: None,
            }
        }
        12 => {
            if data.len() < 10 || accounts.len() < 4 {
                return None;
            }
            TransferParts {
                instruction_type: TokenInstructionType::TransferChecked,
                source: account(0)?,
                destination: account(2)?,
                authority: account(3)?,
                mint: account(1),
                amount: amount_at(1)?.to_string(),
                decimals: Some(data[9]),
            }
        }
        7 | 14 => {
            let checked = disc == 14;
            if data.len() < if checked { 10 } else { 9 } || accounts.len() < 3 {
                return None;
            }
            // Tokens originate from the mint; source mirrors it.
            TransferParts {
                instruction_type: if checked {
                    TokenInstructionType::MintToChecked
                } else {
                    TokenInstructionType::MintTo
                },
                source: account(0)?,
                destination: account(1)?,
                authority: account(2)?,
                mint: account(0),
                amount: amount_at(1)?.to_string(),
                decimals: checked.then(|| data[9]),
            }
        }
        8 | 15 => {
            let checked = disc == 15;
            if data.len() < if checked { 10 } else { 9 } || accounts.len() < 3 {
                return None;
            }
            // Burned tokens return to the mint; destination mirrors it.
            TransferParts {
                instruction_type: if checked {
                    TokenInstructionType::BurnChecked
                } else {
                    TokenInstructionType::Burn
                },
                source: account(0)?,
                destination: account(1)?,
                authority: account(2)?,
                mint: account(1),
                amount: amount_at(1)?.to_string(),
                decimals: checked.then(|| data[9]),
            }
        }
        _ => return None,
    };
    Some(parts)
}

/// Parsed-mode dispatch keyed by the RPC's `type` name.
fn decode_parsed(parsed: &ParsedInstruction) -> Option<TransferParts> {
    let instruction_type = match parsed.parsed_type()? {
        "transfer" => TokenInstructionType::Transfer,
        "transferChecked" => TokenInstructionType::TransferChecked,
        "mintTo" => TokenInstructionType::MintTo,
        "mintToChecked" => TokenInstructionType::MintToChecked,
        "burn" => TokenInstructionType::Burn,
        "burnChecked" => TokenInstructionType::BurnChecked,
        _ => return None,
    };
    let info = parsed.info()?;

    let get = |key: &str| info.get(key).and_then(Value::as_str).map(str::to_string);
    let mint = get("mint");

    let source = get("source")
        .or_else(|| match instruction_type {
            // mintTo has no source account; the mint stands in.
            TokenInstructionType::MintTo | TokenInstructionType::MintToChecked => mint.clone(),
            _ => get("account"),
        })?;
    let destination = get("destination").or_else(|| match instruction_type {
        // Burned tokens return to the mint; mints and self-transfers land on
        // the `account` field.
        TokenInstructionType::Burn | TokenInstructionType::BurnChecked => mint.clone(),
        _ => get("account"),
    })?;
    let authority = get("authority")
        .or_else(|| get("mintAuthority"))
        .or_else(|| get("multisigAuthority"))
        .or_else(|| get("multisigMintAuthority"))?;

    let (amount, decimals) = if let Some(token_amount) = info.get("tokenAmount") {
        let amount = token_amount
            .get("amount")
            .and_then(|a| {
                a.as_str()
                    .map(str::to_string)
                    .or_else(|| a.as_u64().map(|v| v.to_string()))
            })?;
        let decimals = token_amount
            .get("decimals")
            .and_then(Value::as_u64)
            .map(|d| d as u8);
        (amount, decimals)
    } else {
        let amount = info.get("amount").and_then(|a| {
            a.as_str()
                .map(str::to_string)
                .or_else(|| a.as_u64().map(|v| v.to_string()))
        })?;
        (amount, None)
    };

    Some(TransferParts {
        instruction_type,
        source,
        destination,
        authority,
        mint,
        amount,
        decimals,
    })
}
