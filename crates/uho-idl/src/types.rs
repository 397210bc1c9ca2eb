//! IDL type system and its column-oriented storage mapping.

use serde_json::Value;

use crate::error::IdlError;

/// A type as declared in an Anchor/Shank IDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdlType {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    U128,
    I128,
    F32,
    F64,
    String,
    Pubkey,
    Bytes,
    Option(Box<IdlType>),
    Vec(Box<IdlType>),
    Array(Box<IdlType>, usize),
    Defined(String),
}

/// The column type a decoded field is stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 32-bit integer (`INTEGER`).
    Integer,
    /// 64-bit integer (`BIGINT`).
    BigInt,
    /// 128-bit decimal (`NUMERIC`).
    Numeric,
    /// Double-precision float (`DOUBLE PRECISION`).
    DoublePrecision,
    Boolean,
    Text,
    /// Byte array (`BYTEA`), hex-encoded with a `\x` prefix on output.
    Bytea,
    /// Nested structure (`JSONB`).
    Jsonb,
}

impl ColumnType {
    /// The SQL type name used when talking about this column.
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::DoublePrecision => "DOUBLE PRECISION",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Text => "TEXT",
            ColumnType::Bytea => "BYTEA",
            ColumnType::Jsonb => "JSONB",
        }
    }
}

impl IdlType {
    /// Parse a type from its IDL JSON representation: either a string
    /// (`"u64"`, `"pubkey"`) or an object (`{"vec": "u8"}`,
    /// `{"defined": {"name": "PoolState"}}`).
    pub fn parse(value: &Value) -> Result<Self, IdlError> {
        match value {
            Value::String(s) => Self::parse_primitive(s),
            Value::Object(map) => {
                if let Some(inner) = map.get("option").or_else(|| map.get("coption")) {
                    return Ok(IdlType::Option(Box::new(Self::parse(inner)?)));
                }
                if let Some(inner) = map.get("vec") {
                    return Ok(IdlType::Vec(Box::new(Self::parse(inner)?)));
                }
                if let Some(arr) = map.get("array") {
                    let parts = arr
                        .as_array()
                        .filter(|a| a.len() == 2)
                        .ok_or_else(|| IdlError::UnsupportedType(value.to_string()))?;
                    let elem = Self::parse(&parts[0])?;
                    let len = parts[1]
                        .as_u64()
                        .ok_or_else(|| IdlError::UnsupportedType(value.to_string()))?;
                    return Ok(IdlType::Array(Box::new(elem), len as usize));
                }
                if let Some(defined) = map.get("defined") {
                    // Legacy form: {"defined": "Name"}; 0.30 form: {"defined": {"name": "Name"}}
                    let name = defined
                        .as_str()
                        .map(str::to_string)
                        .or_else(|| {
                            defined
                                .get("name")
                                .and_then(Value::as_str)
                                .map(str::to_string)
                        })
                        .ok_or_else(|| IdlError::UnsupportedType(value.to_string()))?;
                    return Ok(IdlType::Defined(name));
                }
                Err(IdlError::UnsupportedType(value.to_string()))
            }
            other => Err(IdlError::UnsupportedType(other.to_string())),
        }
    }

    fn parse_primitive(s: &str) -> Result<Self, IdlError> {
        Ok(match s {
            "bool" => IdlType::Bool,
            "u8" => IdlType::U8,
            "i8" => IdlType::I8,
            "u16" => IdlType::U16,
            "i16" => IdlType::I16,
            "u32" => IdlType::U32,
            "i32" => IdlType::I32,
            "u64" => IdlType::U64,
            "i64" => IdlType::I64,
            "u128" => IdlType::U128,
            "i128" => IdlType::I128,
            "f32" => IdlType::F32,
            "f64" => IdlType::F64,
            "string" => IdlType::String,
            "pubkey" | "publicKey" => IdlType::Pubkey,
            "bytes" => IdlType::Bytes,
            other => return Err(IdlError::UnsupportedType(other.to_string())),
        })
    }

    /// Map this type to `(storage column type, nullable)`.
    ///
    /// `{option: T}` stores as T's column with `nullable = true`; composite
    /// types collapse to JSONB.
    pub fn storage(&self) -> (ColumnType, bool) {
        match self {
            IdlType::Bool => (ColumnType::Boolean, false),
            IdlType::U8
            | IdlType::I8
            | IdlType::U16
            | IdlType::I16
            | IdlType::U32
            | IdlType::I32 => (ColumnType::Integer, false),
            IdlType::U64 | IdlType::I64 => (ColumnType::BigInt, false),
            IdlType::U128 | IdlType::I128 => (ColumnType::Numeric, false),
            IdlType::F32 | IdlType::F64 => (ColumnType::DoublePrecision, false),
            IdlType::String | IdlType::Pubkey => (ColumnType::Text, false),
            IdlType::Bytes => (ColumnType::Bytea, false),
            IdlType::Option(inner) => {
                let (col, _) = inner.storage();
                (col, true)
            }
            IdlType::Vec(_) | IdlType::Array(_, _) | IdlType::Defined(_) => {
                (ColumnType::Jsonb, false)
            }
        }
    }

    /// Returns `true` if this type serializes as a decimal string in JSON
    /// output to avoid integer truncation on receivers.
    pub fn is_string_encoded(&self) -> bool {
        matches!(
            self,
            IdlType::U64 | IdlType::I64 | IdlType::U128 | IdlType::I128
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_primitives() {
        assert_eq!(IdlType::parse(&json!("u64")).unwrap(), IdlType::U64);
        assert_eq!(IdlType::parse(&json!("pubkey")).unwrap(), IdlType::Pubkey);
        assert_eq!(
            IdlType::parse(&json!("publicKey")).unwrap(),
            IdlType::Pubkey
        );
    }

    #[test]
    fn parse_composites() {
        assert_eq!(
            IdlType::parse(&json!({"vec": "u8"})).unwrap(),
            IdlType::Vec(Box::new(IdlType::U8))
        );
        assert_eq!(
            IdlType::parse(&json!({"array": ["u8", 32]})).unwrap(),
            IdlType::Array(Box::new(IdlType::U8), 32)
        );
        assert_eq!(
            IdlType::parse(&json!({"option": "u64"})).unwrap(),
            IdlType::Option(Box::new(IdlType::U64))
        );
        assert_eq!(
            IdlType::parse(&json!({"defined": "PoolState"})).unwrap(),
            IdlType::Defined("PoolState".into())
        );
        assert_eq!(
            IdlType::parse(&json!({"defined": {"name": "PoolState"}})).unwrap(),
            IdlType::Defined("PoolState".into())
        );
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!(IdlType::parse(&json!("q128")).is_err());
        assert!(IdlType::parse(&json!(42)).is_err());
    }

    #[test]
    fn storage_mapping() {
        assert_eq!(IdlType::U32.storage(), (ColumnType::Integer, false));
        assert_eq!(IdlType::U64.storage(), (ColumnType::BigInt, false));
        assert_eq!(IdlType::I128.storage(), (ColumnType::Numeric, false));
        assert_eq!(IdlType::Pubkey.storage(), (ColumnType::Text, false));
        assert_eq!(
            IdlType::Option(Box::new(IdlType::U64)).storage(),
            (ColumnType::BigInt, true)
        );
        assert_eq!(
            IdlType::Vec(Box::new(IdlType::U8)).storage(),
            (ColumnType::Jsonb, false)
        );
        assert_eq!(
            IdlType::Defined("Position".into()).storage(),
            (ColumnType::Jsonb, false)
        );
    }

    #[test]
    fn string_encoding_flags() {
        assert!(IdlType::U64.is_string_encoded());
        assert!(IdlType::I128.is_string_encoded());
        assert!(!IdlType::U32.is_string_encoded());
        assert!(!IdlType::Pubkey.is_string_encoded());
    }
}
