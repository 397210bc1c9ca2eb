//! Naming conventions shared by the writer and orchestrator.
//!
//! Event and instruction names are preserved as-given for discriminator
//! matching; everything that reaches SQL (table and column identifiers) is
//! snake-cased here.

/// Postgres identifier length limit (bytes, NAMEDATALEN - 1).
const MAX_IDENT_LEN: usize = 63;

/// Convert an identifier to snake_case.
///
/// Idempotent: `snake_case(snake_case(x)) == snake_case(x)`.
pub fn snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev_lower = false;
    for ch in s.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else if ch == '-' || ch == ' ' {
            out.push('_');
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

/// Deterministic table identifier for a `(program_name, event_or_instruction_name)`
/// pair, truncated to the Postgres identifier limit.
pub fn table_name(program_name: &str, item_name: &str) -> String {
    let mut name = format!("{}_{}", snake_case(program_name), snake_case(item_name));
    if name.len() > MAX_IDENT_LEN {
        let mut cut = MAX_IDENT_LEN;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
    }
    name
}

/// Quote a SQL identifier, doubling any embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
