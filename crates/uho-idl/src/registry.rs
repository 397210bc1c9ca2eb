//! Builtin program registry — resolves well-known programs by alias or
//! address to a bundled IDL.

use crate::error::IdlError;
use crate::program::ProgramSpec;

/// The SPL Token program address.
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
/// The SPL Token-2022 program address.
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

/// A well-known program with a bundled IDL.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinProgram {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub program_id: &'static str,
    pub idl_json: &'static str,
}

const BUILTINS: &[BuiltinProgram] = &[
    BuiltinProgram {
        name: "spl_token",
        aliases: &["token", "spl-token", "tokenkeg"],
        program_id: TOKEN_PROGRAM_ID,
        idl_json: include_str!("../idl/token.json"),
    },
    BuiltinProgram {
        name: "spl_token_2022",
        aliases: &["token-2022", "token22", "spl-token-2022"],
        program_id: TOKEN_2022_PROGRAM_ID,
        idl_json: include_str!("../idl/token_2022.json"),
    },
];

/// Resolve a builtin program by name, alias (case-insensitive), or program
/// address.
pub fn resolve_builtin(name_or_address: &str) -> Option<&'static BuiltinProgram> {
    BUILTINS.iter().find(|b| {
        b.program_id == name_or_address
            || b.name.eq_ignore_ascii_case(name_or_address)
            || b.aliases
                .iter()
                .any(|a| a.eq_ignore_ascii_case(name_or_address))
    })
}

/// Resolve and parse a builtin program's IDL.
pub fn builtin_spec(name_or_address: &str) -> Result<ProgramSpec, IdlError> {
    let builtin = resolve_builtin(name_or_address)
        .ok_or_else(|| IdlError::UnknownProgram(name_or_address.to_string()))?;
    ProgramSpec::parse(builtin.idl_json)
}
