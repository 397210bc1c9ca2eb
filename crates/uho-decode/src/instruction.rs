//! Instruction decoder — walks top-level and inner (CPI) instructions,
//! matching program id + discriminator against the IDL.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use uho_idl::program::{FieldDef, InstructionDef};
use uho_idl::{IdlType, ProgramSpec};
use uho_rpc::{ParsedInstruction, ParsedTransaction, RawInstruction, TxInstruction};

use crate::borsh_read::read_value;
use crate::error::DecodeError;
use crate::record::DecodedInstruction;
use crate::value::NormalizedValue;

/// Account pubkey used when the transaction carries fewer accounts than the
/// IDL names.
const UNKNOWN_ACCOUNT: &str = "unknown";

/// One instruction with its position within the transaction.
///
/// `inner_ix_index` is the position within the parent instruction's inner
/// list; `None` for top-level instructions.
pub struct InstructionRef<'a> {
    pub ix_index: u32,
    pub inner_ix_index: Option<u32>,
    pub instruction: &'a TxInstruction,
}

/// Yield every instruction in the transaction with its position: each
/// top-level instruction followed by its inner (CPI) group.
pub fn scan_instructions(tx: &ParsedTransaction) -> Vec<InstructionRef<'_>> {
    let mut out = Vec::new();
    for (i, instruction) in tx.transaction.message.instructions.iter().enumerate() {
        out.push(InstructionRef {
            ix_index: i as u32,
            inner_ix_index: None,
            instruction,
        });
        for group in tx.inner_instruction_groups() {
            if group.index as usize != i {
                continue;
            }
            for (j, inner) in group.instructions.iter().enumerate() {
                out.push(InstructionRef {
                    ix_index: group.index,
                    inner_ix_index: Some(j as u32),
                    instruction: inner,
                });
            }
        }
    }
    out
}

/// Decodes the target program's instructions, raw or RPC-parsed.
pub struct InstructionDecoder {
    program: Arc<ProgramSpec>,
}

impl InstructionDecoder {
    pub fn new(program: Arc<ProgramSpec>) -> Self {
        Self { program }
    }

    /// Decode every instruction of the target program in `tx`. Instructions
    /// with unknown leading bytes produce no record.
    pub fn decode_transaction(&self, tx: &ParsedTransaction) -> Vec<DecodedInstruction> {
        let mut out = Vec::new();
        for entry in scan_instructions(tx) {
            if entry.instruction.program_id() != self.program.program_id {
                continue;
            }
            let decoded = match entry.instruction {
                TxInstruction::Raw(raw) => self.decode_raw(raw),
                TxInstruction::Parsed(parsed) => self.decode_parsed(parsed),
            };
            match decoded {
                Ok(Some((ix, accounts, args))) => out.push(DecodedInstruction {
                    instruction_name: ix.name.clone(),
                    program_id: self.program.program_id.clone(),
                    slot: tx.slot,
                    block_time: tx.block_time,
                    tx_signature: tx.signature().to_string(),
                    ix_index: entry.ix_index,
                    inner_ix_index: entry.inner_ix_index,
                    accounts,
                    args,
                }),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        signature = %tx.signature(),
                        ix_index = entry.ix_index,
                        error = %e,
                        "failed to decode instruction, skipping"
                    );
                }
            }
        }
        out
    }

    #[allow(clippy::type_complexity)]
    fn decode_raw(
        &self,
        raw: &RawInstruction,
    ) -> Result<
        Option<(
            &InstructionDef,
            IndexMap<String, String>,
            IndexMap<String, NormalizedValue>,
        )>,
        DecodeError,
    > {
        let data = bs58::decode(&raw.data).into_vec()?;
        let Some(ix) = self.program.instruction_by_discriminator(&data) else {
            return Ok(None);
        };

        let mut cursor = &data[8..];
        let mut args = IndexMap::with_capacity(ix.args.len());
        for arg in &ix.args {
            args.insert(arg.column.clone(), read_value(&mut cursor, &arg.ty, &self.program)?);
        }

        // Map per-instruction account positions to the IDL's named accounts.
        let mut accounts = IndexMap::with_capacity(ix.accounts.len());
        for (i, name) in ix.accounts.iter().enumerate() {
            let pubkey = raw
                .accounts
                .get(i)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_ACCOUNT.to_string());
            accounts.insert(name.clone(), pubkey);
        }
        Ok(Some((ix, accounts, args)))
    }

    #[allow(clippy::type_complexity)]
    fn decode_parsed(
        &self,
        parsed: &ParsedInstruction,
    ) -> Result<
        Option<(
            &InstructionDef,
            IndexMap<String, String>,
            IndexMap<String, NormalizedValue>,
        )>,
        DecodeError,
    > {
        let Some(type_name) = parsed.parsed_type() else {
            return Ok(None);
        };
        let Some(ix) = self.program.instruction_by_parsed_name(type_name) else {
            return Ok(None);
        };
        let info = parsed.info().cloned().unwrap_or(Value::Null);

        let mut args = IndexMap::with_capacity(ix.args.len());
        for arg in &ix.args {
            args.insert(arg.column.clone(), parsed_arg_value(&info, arg)?);
        }

        let mut accounts = IndexMap::with_capacity(ix.accounts.len());
        for name in &ix.accounts {
            let pubkey = info
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or(UNKNOWN_ACCOUNT)
                .to_string();
            accounts.insert(name.clone(), pubkey);
        }
        Ok(Some((ix, accounts, args)))
    }
}

/// Extract an argument value from a parsed `info` map, with a fallback for
/// the RPC's `tokenAmount: {amount, decimals}` shape.
fn parsed_arg_value(info: &Value, field: &FieldDef) -> Result<NormalizedValue, DecodeError> {
    if let Some(value) = info.get(&field.name) {
        return json_to_normalized(value, &field.ty, &field.name);
    }
    if let Some(token_amount) = info.get("tokenAmount") {
        let fallback = match field.name.as_str() {
            "amount" => token_amount.get("amount"),
            "decimals" => token_amount.get("decimals"),
            _ => None,
        };
        if let Some(value) = fallback {
            return json_to_normalized(value, &field.ty, &field.name);
        }
    }
    if field.nullable {
        return Ok(NormalizedValue::Null);
    }
    Err(DecodeError::MissingField {
        field: field.name.clone(),
    })
}

/// Convert a parsed-mode JSON value into the normalized form the IDL type
/// calls for. The RPC stringifies 64-bit amounts, so integer parses accept
/// both numbers and strings.
fn json_to_normalized(
    value: &Value,
    ty: &IdlType,
    field: &str,
) -> Result<NormalizedValue, DecodeError> {
    let invalid = |reason: &str| DecodeError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    };
    Ok(match ty {
        IdlType::Bool => NormalizedValue::Bool(value.as_bool().ok_or_else(|| invalid("not a bool"))?),
        IdlType::U8 | IdlType::U16 | IdlType::U32 => {
            NormalizedValue::Uint(json_u64(value).ok_or_else(|| invalid("not an unsigned integer"))? as u32)
        }
        IdlType::I8 | IdlType::I16 | IdlType::I32 => {
            NormalizedValue::Int(json_i64(value).ok_or_else(|| invalid("not a signed integer"))? as i32)
        }
        IdlType::U64 => {
            NormalizedValue::ULong(json_u64(value).ok_or_else(|| invalid("not a u64"))?)
        }
        IdlType::I64 => NormalizedValue::Long(json_i64(value).ok_or_else(|| invalid("not an i64"))?),
        IdlType::U128 | IdlType::I128 => NormalizedValue::Decimal128(
            value
                .as_str()
                .map(str::to_string)
                .or_else(|| value.as_u64().map(|v| v.to_string()))
                .or_else(|| value.as_i64().map(|v| v.to_string()))
                .ok_or_else(|| invalid("not a 128-bit integer"))?,
        ),
        IdlType::F32 | IdlType::F64 => {
            NormalizedValue::Float(value.as_f64().ok_or_else(|| invalid("not a float"))?)
        }
        IdlType::String => {
            NormalizedValue::Str(value.as_str().ok_or_else(|| invalid("not a string"))?.to_string())
        }
        IdlType::Pubkey => NormalizedValue::Pubkey(
            value.as_str().ok_or_else(|| invalid("not a pubkey"))?.to_string(),
        ),
        IdlType::Option(inner) => {
            if value.is_null() {
                NormalizedValue::Null
            } else {
                json_to_normalized(value, inner, field)?
            }
        }
        // Composite shapes pass through as generic JSON.
        _ => generic_json(value),
    })
}

fn json_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn json_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn generic_json(value: &Value) -> NormalizedValue {
    match value {
        Value::Null => NormalizedValue::Null,
        Value::Bool(b) => NormalizedValue::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                NormalizedValue::Long(i)
            } else if let Some(u) = n.as_u64() {
                NormalizedValue::ULong(u)
            } else {
                NormalizedValue::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => NormalizedValue::Str(s.clone()),
        Value::Array(items) => NormalizedValue::List(items.iter().map(generic_json).collect()),
        Value::Object(map) => NormalizedValue::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), generic_json(v)))
                .collect(),
        ),
    }
}
