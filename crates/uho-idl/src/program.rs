//! Normalized program model — the parsed form of an IDL that the decoders
//! and the fan-out writer operate on.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::discriminator::{event_discriminator, instruction_discriminator, DISCRIMINATOR_LEN};
use crate::error::IdlError;
use crate::names::snake_case;
use crate::raw::{RawField, RawIdl, RawTypeDefTy, RawVariant};
use crate::types::{ColumnType, IdlType};

/// A single event or instruction-argument field.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Name as given in the IDL (used for parsed-mode lookups).
    pub name: String,
    /// Snake-cased column name.
    pub column: String,
    pub ty: IdlType,
    pub storage: ColumnType,
    pub nullable: bool,
}

impl FieldDef {
    fn from_raw(raw: &RawField) -> Result<Self, IdlError> {
        let ty = IdlType::parse(&raw.ty)?;
        let (storage, nullable) = ty.storage();
        Ok(Self {
            name: raw.name.clone(),
            column: snake_case(&raw.name),
            ty,
            storage,
            nullable,
        })
    }
}

/// An event definition with its resolved discriminator and ordered fields.
#[derive(Debug, Clone)]
pub struct EventDef {
    pub name: String,
    pub discriminator: [u8; DISCRIMINATOR_LEN],
    pub fields: Vec<FieldDef>,
}

/// An instruction definition: discriminator, ordered args, ordered account names.
#[derive(Debug, Clone)]
pub struct InstructionDef {
    pub name: String,
    pub discriminator: [u8; DISCRIMINATOR_LEN],
    pub args: Vec<FieldDef>,
    pub accounts: Vec<String>,
}

impl InstructionDef {
    /// Name comparison for parsed-mode matching: case-insensitive, ignoring
    /// underscores (`transferChecked` matches `transfer_checked`).
    pub fn matches_parsed_name(&self, parsed: &str) -> bool {
        fn fold(s: &str) -> String {
            s.chars()
                .filter(|c| *c != '_')
                .flat_map(char::to_lowercase)
                .collect()
        }
        fold(&self.name) == fold(parsed)
    }
}

/// A defined type from the IDL's `types[]` array.
#[derive(Debug, Clone)]
pub enum TypeDef {
    Struct { fields: Vec<(String, IdlType)> },
    Enum { variants: Vec<EnumVariantDef> },
    Alias(IdlType),
}

#[derive(Debug, Clone)]
pub struct EnumVariantDef {
    pub name: String,
    pub fields: EnumFieldsDef,
}

#[derive(Debug, Clone)]
pub enum EnumFieldsDef {
    Unit,
    Named(Vec<(String, IdlType)>),
    Tuple(Vec<IdlType>),
}

/// The normalized program model.
#[derive(Debug, Clone)]
pub struct ProgramSpec {
    /// On-chain program address (base58).
    pub program_id: String,
    /// Canonical snake_case program name, reused as the table prefix.
    pub program_name: String,
    pub events: Vec<EventDef>,
    pub instructions: Vec<InstructionDef>,
    /// Defined types, in declaration order.
    pub types: IndexMap<String, TypeDef>,
}

impl ProgramSpec {
    /// Parse an IDL from a JSON string. Fails if the IDL carries no program
    /// address.
    pub fn parse(idl_json: &str) -> Result<Self, IdlError> {
        let value: Value = serde_json::from_str(idl_json)?;
        Self::from_value(&value, None)
    }

    /// Parse an IDL from a JSON value, optionally overriding the program
    /// address (the control plane knows the address even when the IDL omits
    /// it).
    pub fn from_value(value: &Value, program_id: Option<&str>) -> Result<Self, IdlError> {
        let raw: RawIdl = serde_json::from_value(value.clone())?;

        let program_id = program_id
            .map(str::to_string)
            .or_else(|| raw.program_address().map(str::to_string))
            .ok_or(IdlError::MissingAddress)?;
        let program_name = raw
            .program_name()
            .map(snake_case)
            .ok_or(IdlError::MissingName)?;

        let mut types = IndexMap::new();
        for raw_ty in &raw.types {
            types.insert(raw_ty.name.clone(), parse_type_def(&raw_ty.ty)?);
        }

        let mut events = Vec::with_capacity(raw.events.len());
        for raw_event in &raw.events {
            let discriminator = resolve_discriminator(
                raw_event.discriminator.as_deref(),
                || event_discriminator(&raw_event.name),
            );
            let fields = if !raw_event.fields.is_empty() {
                raw_event
                    .fields
                    .iter()
                    .map(FieldDef::from_raw)
                    .collect::<Result<Vec<_>, _>>()?
            } else {
                event_fields_from_types(&raw_event.name, &types)
            };
            events.push(EventDef {
                name: raw_event.name.clone(),
                discriminator,
                fields,
            });
        }

        let mut instructions = Vec::with_capacity(raw.instructions.len());
        for raw_ix in &raw.instructions {
            let discriminator = resolve_discriminator(raw_ix.discriminator.as_deref(), || {
                instruction_discriminator(&raw_ix.name)
            });
            let args = raw_ix
                .args
                .iter()
                .map(FieldDef::from_raw)
                .collect::<Result<Vec<_>, _>>()?;
            let mut accounts = Vec::new();
            for account in &raw_ix.accounts {
                account.flatten_into(&mut accounts);
            }
            instructions.push(InstructionDef {
                name: raw_ix.name.clone(),
                discriminator,
                args,
                accounts,
            });
        }

        let mut spec = Self {
            program_id,
            program_name,
            events,
            instructions,
            types,
        };
        spec.patch_missing_types();
        Ok(spec)
    }

    /// Insert an empty struct for every `{defined}` reference that has no
    /// entry in `types[]`. Real-world IDLs carry such dangling references;
    /// rejecting them would strand the whole program.
    fn patch_missing_types(&mut self) {
        let mut referenced: Vec<IdlType> = Vec::new();
        for event in &self.events {
            referenced.extend(event.fields.iter().map(|f| f.ty.clone()));
        }
        for ix in &self.instructions {
            referenced.extend(ix.args.iter().map(|a| a.ty.clone()));
        }
        referenced.extend(self.types.values().flat_map(type_def_child_types));

        let mut missing: Vec<String> = Vec::new();
        for ty in &referenced {
            collect_missing(ty, &self.types, &mut missing);
        }
        missing.sort();
        missing.dedup();
        for name in missing {
            warn!(program = %self.program_name, type_name = %name, "IDL references undefined type; patching with empty struct");
            self.types
                .insert(name, TypeDef::Struct { fields: vec![] });
        }
    }

    /// Look up an event by its 8-byte discriminator prefix.
    pub fn event_by_discriminator(&self, prefix: &[u8]) -> Option<&EventDef> {
        if prefix.len() < DISCRIMINATOR_LEN {
            return None;
        }
        self.events
            .iter()
            .find(|e| e.discriminator == prefix[..DISCRIMINATOR_LEN])
    }

    /// Look up an instruction by its 8-byte discriminator prefix.
    pub fn instruction_by_discriminator(&self, prefix: &[u8]) -> Option<&InstructionDef> {
        if prefix.len() < DISCRIMINATOR_LEN {
            return None;
        }
        self.instructions
            .iter()
            .find(|i| i.discriminator == prefix[..DISCRIMINATOR_LEN])
    }

    /// Look up an instruction by the RPC's parsed `type` name.
    pub fn instruction_by_parsed_name(&self, parsed: &str) -> Option<&InstructionDef> {
        self.instructions
            .iter()
            .find(|i| i.matches_parsed_name(parsed))
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }
}

fn resolve_discriminator(
    given: Option<&[u8]>,
    derive: impl FnOnce() -> [u8; DISCRIMINATOR_LEN],
) -> [u8; DISCRIMINATOR_LEN] {
    match given {
        Some(bytes) if bytes.len() == DISCRIMINATOR_LEN => {
            let mut out = [0u8; DISCRIMINATOR_LEN];
            out.copy_from_slice(bytes);
            out
        }
        _ => derive(),
    }
}

/// 0.30+ IDLs declare event fields as a same-named struct in `types[]`.
fn event_fields_from_types(event_name: &str, types: &IndexMap<String, TypeDef>) -> Vec<FieldDef> {
    match types.get(event_name) {
        Some(TypeDef::Struct { fields }) => fields
            .iter()
            .map(|(name, ty)| {
                let (storage, nullable) = ty.storage();
                FieldDef {
                    name: name.clone(),
                    column: snake_case(name),
                    ty: ty.clone(),
                    storage,
                    nullable,
                }
            })
            .collect(),
        _ => {
            warn!(event = %event_name, "event has no inline fields and no matching type; treating as empty");
            vec![]
        }
    }
}

fn parse_type_def(raw: &RawTypeDefTy) -> Result<TypeDef, IdlError> {
    Ok(match raw {
        RawTypeDefTy::Struct { fields } => TypeDef::Struct {
            fields: fields
                .iter()
                .map(|f| Ok((f.name.clone(), IdlType::parse(&f.ty)?)))
                .collect::<Result<Vec<_>, IdlError>>()?,
        },
        RawTypeDefTy::Enum { variants } => TypeDef::Enum {
            variants: variants
                .iter()
                .map(parse_variant)
                .collect::<Result<Vec<_>, _>>()?,
        },
        RawTypeDefTy::Alias { value } => TypeDef::Alias(IdlType::parse(value)?),
    })
}

fn parse_variant(raw: &RawVariant) -> Result<EnumVariantDef, IdlError> {
    let fields = match &raw.fields {
        None => EnumFieldsDef::Unit,
        Some(Value::Array(items)) if items.is_empty() => EnumFieldsDef::Unit,
        Some(Value::Array(items)) => {
            if items[0].is_object() && items[0].get("name").is_some() {
                EnumFieldsDef::Named(
                    items
                        .iter()
                        .map(|item| {
                            let name = item
                                .get("name")
                                .and_then(Value::as_str)
                                .ok_or_else(|| IdlError::UnsupportedType(item.to_string()))?
                                .to_string();
                            let ty = IdlType::parse(
                                item.get("type")
                                    .ok_or_else(|| IdlError::UnsupportedType(item.to_string()))?,
                            )?;
                            Ok((name, ty))
                        })
                        .collect::<Result<Vec<_>, IdlError>>()?,
                )
            } else {
                EnumFieldsDef::Tuple(
                    items
                        .iter()
                        .map(IdlType::parse)
                        .collect::<Result<Vec<_>, _>>()?,
                )
            }
        }
        Some(other) => return Err(IdlError::UnsupportedType(other.to_string())),
    };
    Ok(EnumVariantDef {
        name: raw.name.clone(),
        fields,
    })
}

fn collect_missing(ty: &IdlType, types: &IndexMap<String, TypeDef>, out: &mut Vec<String>) {
    match ty {
        IdlType::Defined(name) => {
            if !types.contains_key(name) {
                out.push(name.clone());
            }
        }
        IdlType::Option(inner) | IdlType::Vec(inner) | IdlType::Array(inner, _) => {
            collect_missing(inner, types, out)
        }
        _ => {}
    }
}

fn type_def_child_types(def: &TypeDef) -> Vec<IdlType> {
    match def {
        TypeDef::Struct { fields } => fields.iter().map(|(_, t)| t.clone()).collect(),
        TypeDef::Enum { variants } => variants
            .iter()
            .flat_map(|v| match &v.fields {
                EnumFieldsDef::Unit => vec![],
                EnumFieldsDef::Named(fields) => fields.iter().map(|(_, t)| t.clone()).collect(),
                EnumFieldsDef::Tuple(types) => types.clone(),
            })
            .collect(),
        TypeDef::Alias(ty) => vec![ty.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discriminator::event_discriminator;
    use serde_json::json;

    fn swap_idl() -> Value {
        json!({
            "name": "myAmm",
            "version": "0.1.0",
            "metadata": {"address": "Amm111111111111111111111111111111111111111"},
            "events": [{
                "name": "SwapEvent",
                "fields": [
                    {"name": "amm", "type": "publicKey"},
                    {"name": "inputAmount", "type": "u64"},
                    {"name": "outputAmount", "type": "u64"},
                    {"name": "fee", "type": "u64"},
                    {"name": "timestamp", "type": "i64"}
                ]
            }],
            "instructions": [{
                "name": "swap",
                "accounts": [{"name": "amm"}, {"name": "user"}],
                "args": [{"name": "amountIn", "type": "u64"}]
            }]
        })
    }

    #[test]
    fn parses_swap_event_with_derived_discriminator() {
        let spec = ProgramSpec::from_value(&swap_idl(), None).unwrap();
        assert_eq!(spec.program_name, "my_amm");
        let event = &spec.events[0];
        assert_eq!(event.discriminator, event_discriminator("SwapEvent"));
        let columns: Vec<&str> = event.fields.iter().map(|f| f.column.as_str()).collect();
        assert_eq!(
            columns,
            vec!["amm", "input_amount", "output_amount", "fee", "timestamp"]
        );
        assert_eq!(event.fields[1].storage, ColumnType::BigInt);
        assert_eq!(event.fields[0].storage, ColumnType::Text);
    }

    #[test]
    fn discriminator_lookup() {
        let spec = ProgramSpec::from_value(&swap_idl(), None).unwrap();
        let disc = event_discriminator("SwapEvent");
        let mut payload = disc.to_vec();
        payload.extend_from_slice(&[0u8; 16]);
        assert!(spec.event_by_discriminator(&payload).is_some());
        assert!(spec.event_by_discriminator(&[0u8; 8]).is_none());
        assert!(spec.event_by_discriminator(&disc[..4]).is_none());
    }

    #[test]
    fn instruction_parsed_name_matching() {
        let spec = ProgramSpec::from_value(&swap_idl(), None).unwrap();
        assert!(spec.instruction_by_parsed_name("swap").is_some());
        assert!(spec.instruction_by_parsed_name("Swap").is_some());
        assert!(spec.instruction_by_parsed_name("s_wap").is_some());
        assert!(spec.instruction_by_parsed_name("deposit").is_none());
    }

    #[test]
    fn missing_defined_type_is_patched() {
        let idl = json!({
            "name": "lending",
            "metadata": {"address": "Lend11111111111111111111111111111111111111"},
            "events": [{
                "name": "Liquidation",
                "fields": [{"name": "position", "type": {"defined": "PositionState"}}]
            }]
        });
        let spec = ProgramSpec::from_value(&idl, None).unwrap();
        assert!(matches!(
            spec.type_def("PositionState"),
            Some(TypeDef::Struct { fields }) if fields.is_empty()
        ));
    }

    #[test]
    fn missing_address_is_an_error_unless_overridden() {
        let idl = json!({"name": "x", "events": []});
        assert!(matches!(
            ProgramSpec::from_value(&idl, None),
            Err(IdlError::MissingAddress)
        ));
        let spec =
            ProgramSpec::from_value(&idl, Some("Over11111111111111111111111111111111111111"))
                .unwrap();
        assert_eq!(
            spec.program_id,
            "Over11111111111111111111111111111111111111"
        );
    }

    #[test]
    fn modern_idl_resolves_event_fields_from_types() {
        let idl = json!({
            "address": "Mod111111111111111111111111111111111111111",
            "metadata": {"name": "modern", "version": "0.30.0"},
            "events": [{"name": "PriceUpdate", "discriminator": [9,9,9,9,9,9,9,9]}],
            "types": [{
                "name": "PriceUpdate",
                "type": {"kind": "struct", "fields": [
                    {"name": "price", "type": "u128"},
                    {"name": "expo", "type": "i32"}
                ]}
            }]
        });
        let spec = ProgramSpec::from_value(&idl, None).unwrap();
        let event = &spec.events[0];
        assert_eq!(event.discriminator, [9u8; 8]);
        assert_eq!(event.fields.len(), 2);
        assert_eq!(event.fields[0].storage, ColumnType::Numeric);
    }
}
