//! Normalized value model.
//!
//! Every decoded field collapses into this sum type. The JSON rendering is
//! lossless with respect to the on-chain representation: 64-bit integers
//! above the JavaScript safe-integer bound and all 128-bit integers are
//! carried as decimal strings, pubkeys as canonical base58, byte arrays as
//! `\x`-prefixed hex.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use std::fmt;

/// Largest integer magnitude JSON consumers can hold exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// A decoded, normalized value.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedValue {
    /// i8 / i16 / i32.
    Int(i32),
    /// u8 / u16 / u32.
    Uint(u32),
    /// i64 — rendered as a decimal string above the safe-integer bound.
    Long(i64),
    /// u64 — rendered as a decimal string above the safe-integer bound.
    ULong(u64),
    /// u128 / i128, always a decimal string.
    Decimal128(String),
    Float(f64),
    Bool(bool),
    Str(String),
    /// Raw bytes, hex with a `\x` prefix on output.
    Bytes(Vec<u8>),
    /// Base58-encoded public key.
    Pubkey(String),
    List(Vec<NormalizedValue>),
    Map(IndexMap<String, NormalizedValue>),
    Null,
}

impl NormalizedValue {
    /// Render into JSON with the width-preserving rules above.
    pub fn to_json(&self) -> Value {
        match self {
            NormalizedValue::Int(v) => json!(v),
            NormalizedValue::Uint(v) => json!(v),
            NormalizedValue::Long(v) => {
                if v.unsigned_abs() <= MAX_SAFE_INTEGER {
                    json!(v)
                } else {
                    json!(v.to_string())
                }
            }
            NormalizedValue::ULong(v) => {
                if *v <= MAX_SAFE_INTEGER {
                    json!(v)
                } else {
                    json!(v.to_string())
                }
            }
            NormalizedValue::Decimal128(s) => json!(s),
            NormalizedValue::Float(v) => json!(v),
            NormalizedValue::Bool(v) => json!(v),
            NormalizedValue::Str(s) => json!(s),
            NormalizedValue::Bytes(b) => json!(format!("\\x{}", hex::encode(b))),
            NormalizedValue::Pubkey(p) => json!(p),
            NormalizedValue::List(items) => {
                Value::Array(items.iter().map(NormalizedValue::to_json).collect())
            }
            NormalizedValue::Map(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            NormalizedValue::Null => Value::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, NormalizedValue::Null)
    }

    /// Coerce to i64 when the value is an integer that fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NormalizedValue::Int(v) => Some(*v as i64),
            NormalizedValue::Uint(v) => Some(*v as i64),
            NormalizedValue::Long(v) => Some(*v),
            NormalizedValue::ULong(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl Serialize for NormalizedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for NormalizedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedValue::Int(v) => write!(f, "{v}"),
            NormalizedValue::Uint(v) => write!(f, "{v}"),
            NormalizedValue::Long(v) => write!(f, "{v}"),
            NormalizedValue::ULong(v) => write!(f, "{v}"),
            NormalizedValue::Decimal128(v) => write!(f, "{v}"),
            NormalizedValue::Float(v) => write!(f, "{v}"),
            NormalizedValue::Bool(v) => write!(f, "{v}"),
            NormalizedValue::Str(s) => write!(f, "{s}"),
            NormalizedValue::Bytes(b) => write!(f, "\\x{}", hex::encode(b)),
            NormalizedValue::Pubkey(p) => write!(f, "{p}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}
