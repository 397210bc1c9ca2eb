//! Dynamic Borsh-compatible reader driven by IDL type descriptors.
//!
//! There is no compile-time type to derive against — the layout comes from a
//! user-supplied IDL — so the reader walks an [`IdlType`] tree against a byte
//! cursor, delegating leaf reads to `borsh`'s primitive impls: little-endian
//! integers, u32 length prefixes for vecs and strings, a 1-byte tag for
//! options.

use borsh::BorshDeserialize;
use indexmap::IndexMap;

use uho_idl::program::{EnumFieldsDef, TypeDef};
use uho_idl::{snake_case, IdlType, ProgramSpec};

use crate::error::DecodeError;
use crate::value::NormalizedValue;

/// Read one value of `ty` from the cursor, normalizing as it goes.
pub fn read_value(
    data: &mut &[u8],
    ty: &IdlType,
    program: &ProgramSpec,
) -> Result<NormalizedValue, DecodeError> {
    Ok(match ty {
        IdlType::Bool => NormalizedValue::Bool(bool::deserialize(data)?),
        IdlType::U8 => NormalizedValue::Uint(u8::deserialize(data)? as u32),
        IdlType::U16 => NormalizedValue::Uint(u16::deserialize(data)? as u32),
        IdlType::U32 => NormalizedValue::Uint(u32::deserialize(data)?),
        IdlType::I8 => NormalizedValue::Int(i8::deserialize(data)? as i32),
        IdlType::I16 => NormalizedValue::Int(i16::deserialize(data)? as i32),
        IdlType::I32 => NormalizedValue::Int(i32::deserialize(data)?),
        IdlType::U64 => NormalizedValue::ULong(u64::deserialize(data)?),
        IdlType::I64 => NormalizedValue::Long(i64::deserialize(data)?),
        IdlType::U128 => NormalizedValue::Decimal128(u128::deserialize(data)?.to_string()),
        IdlType::I128 => NormalizedValue::Decimal128(i128::deserialize(data)?.to_string()),
        IdlType::F32 => NormalizedValue::Float(f32::deserialize(data)? as f64),
        IdlType::F64 => NormalizedValue::Float(f64::deserialize(data)?),
        IdlType::String => NormalizedValue::Str(String::deserialize(data)?),
        IdlType::Pubkey => {
            let bytes = <[u8; 32]>::deserialize(data)?;
            NormalizedValue::Pubkey(bs58::encode(bytes).into_string())
        }
        IdlType::Bytes => NormalizedValue::Bytes(Vec::<u8>::deserialize(data)?),
        IdlType::Option(inner) => {
            let tag = u8::deserialize(data)?;
            if tag == 0 {
                NormalizedValue::Null
            } else {
                read_value(data, inner, program)?
            }
        }
        IdlType::Vec(inner) => {
            let len = u32::deserialize(data)? as usize;
            let mut items = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                items.push(read_value(data, inner, program)?);
            }
            NormalizedValue::List(items)
        }
        IdlType::Array(inner, len) => {
            let mut items = Vec::with_capacity(*len);
            for _ in 0..*len {
                items.push(read_value(data, inner, program)?);
            }
            NormalizedValue::List(items)
        }
        IdlType::Defined(name) => {
            let def = program
                .type_def(name)
                .ok_or_else(|| DecodeError::UnknownType(name.clone()))?;
            read_defined(data, def, program)?
        }
    })
}

fn read_defined(
    data: &mut &[u8],
    def: &TypeDef,
    program: &ProgramSpec,
) -> Result<NormalizedValue, DecodeError> {
    match def {
        TypeDef::Struct { fields } => {
            let mut map = IndexMap::with_capacity(fields.len());
            for (name, ty) in fields {
                map.insert(snake_case(name), read_value(data, ty, program)?);
            }
            Ok(NormalizedValue::Map(map))
        }
        TypeDef::Enum { variants } => {
            let idx = u8::deserialize(data)? as usize;
            let variant = variants.get(idx).ok_or_else(|| {
                DecodeError::Other(format!("enum variant index {idx} out of range"))
            })?;
            match &variant.fields {
                EnumFieldsDef::Unit => Ok(NormalizedValue::Str(variant.name.clone())),
                EnumFieldsDef::Named(fields) => {
                    let mut inner = IndexMap::with_capacity(fields.len());
                    for (name, ty) in fields {
                        inner.insert(snake_case(name), read_value(data, ty, program)?);
                    }
                    let mut map = IndexMap::with_capacity(1);
                    map.insert(variant.name.clone(), NormalizedValue::Map(inner));
                    Ok(NormalizedValue::Map(map))
                }
                EnumFieldsDef::Tuple(types) => {
                    let mut items = Vec::with_capacity(types.len());
                    for ty in types {
                        items.push(read_value(data, ty, program)?);
                    }
                    let mut map = IndexMap::with_capacity(1);
                    map.insert(variant.name.clone(), NormalizedValue::List(items));
                    Ok(NormalizedValue::Map(map))
                }
            }
        }
        TypeDef::Alias(ty) => read_value(data, ty, program),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec_with_types(types: serde_json::Value) -> ProgramSpec {
        ProgramSpec::from_value(
            &json!({
                "name": "t",
                "metadata": {"address": "T1111111111111111111111111111111111111111"},
                "types": types,
            }),
            None,
        )
        .unwrap()
    }

    fn empty_spec() -> ProgramSpec {
        spec_with_types(json!([]))
    }

    #[test]
    fn reads_le_integers() {
        let spec = empty_spec();
        let mut data: &[u8] = &1_000_000u64.to_le_bytes();
        assert_eq!(
            read_value(&mut data, &IdlType::U64, &spec).unwrap(),
            NormalizedValue::ULong(1_000_000)
        );
        assert!(data.is_empty());

        let mut data: &[u8] = &(-5i32).to_le_bytes();
        assert_eq!(
            read_value(&mut data, &IdlType::I32, &spec).unwrap(),
            NormalizedValue::Int(-5)
        );
    }

    #[test]
    fn reads_string_with_length_prefix() {
        let spec = empty_spec();
        let mut buf = 5u32.to_le_bytes().to_vec();
        buf.extend_from_slice(b"hello");
        let mut data: &[u8] = &buf;
        assert_eq!(
            read_value(&mut data, &IdlType::String, &spec).unwrap(),
            NormalizedValue::Str("hello".into())
        );
    }

    #[test]
    fn reads_pubkey_as_base58() {
        let spec = empty_spec();
        let raw = [7u8; 32];
        let mut data: &[u8] = &raw;
        let value = read_value(&mut data, &IdlType::Pubkey, &spec).unwrap();
        assert_eq!(
            value,
            NormalizedValue::Pubkey(bs58::encode(raw).into_string())
        );
    }

    #[test]
    fn reads_option_tags() {
        let spec = empty_spec();
        let ty = IdlType::Option(Box::new(IdlType::U64));

        let mut data: &[u8] = &[0u8];
        assert_eq!(read_value(&mut data, &ty, &spec).unwrap(), NormalizedValue::Null);

        let mut buf = vec![1u8];
        buf.extend_from_slice(&42u64.to_le_bytes());
        let mut data: &[u8] = &buf;
        assert_eq!(
            read_value(&mut data, &ty, &spec).unwrap(),
            NormalizedValue::ULong(42)
        );
    }

    #[test]
    fn reads_vec_with_length_prefix() {
        let spec = empty_spec();
        let mut buf = 3u32.to_le_bytes().to_vec();
        buf.extend_from_slice(&[1, 2, 3]);
        let mut data: &[u8] = &buf;
        assert_eq!(
            read_value(&mut data, &IdlType::Vec(Box::new(IdlType::U8)), &spec).unwrap(),
            NormalizedValue::List(vec![
                NormalizedValue::Uint(1),
                NormalizedValue::Uint(2),
                NormalizedValue::Uint(3),
            ])
        );
    }

    #[test]
    fn reads_defined_struct_with_snake_cased_keys() {
        let spec = spec_with_types(json!([{
            "name": "Position",
            "type": {"kind": "struct", "fields": [
                {"name": "baseAmount", "type": "u64"},
                {"name": "open", "type": "bool"}
            ]}
        }]));
        let mut buf = 7u64.to_le_bytes().to_vec();
        buf.push(1);
        let mut data: &[u8] = &buf;
        let value =
            read_value(&mut data, &IdlType::Defined("Position".into()), &spec).unwrap();
        let NormalizedValue::Map(map) = value else {
            panic!("expected map")
        };
        assert_eq!(map.get("base_amount"), Some(&NormalizedValue::ULong(7)));
        assert_eq!(map.get("open"), Some(&NormalizedValue::Bool(true)));
    }

    #[test]
    fn reads_enum_variants() {
        let spec = spec_with_types(json!([{
            "name": "Side",
            "type": {"kind": "enum", "variants": [
                {"name": "Buy"},
                {"name": "Sell"}
            ]}
        }]));
        let mut data: &[u8] = &[1u8];
        assert_eq!(
            read_value(&mut data, &IdlType::Defined("Side".into()), &spec).unwrap(),
            NormalizedValue::Str("Sell".into())
        );
    }

    #[test]
    fn truncated_body_is_an_error() {
        let spec = empty_spec();
        let mut data: &[u8] = &[1, 2, 3];
        assert!(read_value(&mut data, &IdlType::U64, &spec).is_err());
    }
}
