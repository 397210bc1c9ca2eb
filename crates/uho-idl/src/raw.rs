//! Serde model of raw Anchor/Shank IDL JSON.
//!
//! Two shapes are accepted: the legacy Anchor layout (program address under
//! `metadata.address`, event fields inline) and the 0.30+ layout (top-level
//! `address`, event fields behind a same-named entry in `types[]`). Shank
//! IDLs use the same layout with `metadata.origin = "shank"`.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct RawIdl {
    pub address: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub metadata: Option<RawMetadata>,
    #[serde(default)]
    pub events: Vec<RawEventDef>,
    #[serde(default)]
    pub instructions: Vec<RawInstructionDef>,
    #[serde(default)]
    pub types: Vec<RawTypeDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMetadata {
    pub address: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub origin: Option<String>,
}

impl RawIdl {
    /// The program address, wherever the IDL shape put it.
    pub fn program_address(&self) -> Option<&str> {
        self.address
            .as_deref()
            .or_else(|| self.metadata.as_ref()?.address.as_deref())
    }

    /// The program name, wherever the IDL shape put it.
    pub fn program_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or_else(|| self.metadata.as_ref()?.name.as_deref())
    }

    /// Returns `true` for Shank-origin IDLs.
    pub fn is_shank(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.origin.as_deref())
            .is_some_and(|o| o.eq_ignore_ascii_case("shank"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEventDef {
    pub name: String,
    /// Explicit discriminator bytes; derived from the name when absent.
    pub discriminator: Option<Vec<u8>>,
    /// Legacy layout: fields declared inline on the event.
    #[serde(default)]
    pub fields: Vec<RawField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInstructionDef {
    pub name: String,
    pub discriminator: Option<Vec<u8>>,
    #[serde(default)]
    pub accounts: Vec<RawAccountRef>,
    #[serde(default)]
    pub args: Vec<RawField>,
}

/// A named account in an instruction's account list. Anchor nests account
/// groups; `flatten_into` walks them in declaration order.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAccountRef {
    pub name: String,
    #[serde(default)]
    pub accounts: Vec<RawAccountRef>,
}

impl RawAccountRef {
    pub fn flatten_into(&self, out: &mut Vec<String>) {
        if self.accounts.is_empty() {
            out.push(self.name.clone());
        } else {
            for nested in &self.accounts {
                nested.flatten_into(out);
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTypeDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: RawTypeDefTy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RawTypeDefTy {
    Struct {
        #[serde(default)]
        fields: Vec<RawField>,
    },
    Enum {
        #[serde(default)]
        variants: Vec<RawVariant>,
    },
    Alias {
        value: Value,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawVariant {
    pub name: String,
    /// Named fields (`[{name, type}]`) or a tuple (`[type, ...]`); absent for
    /// unit variants.
    pub fields: Option<Value>,
}
