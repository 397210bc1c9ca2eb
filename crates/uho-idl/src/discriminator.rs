//! Anchor discriminators — 8-byte prefixes identifying events and instructions.
//!
//! When an IDL does not supply a discriminator, it is derived by hashing the
//! item's name with a namespace prefix: `"event:"` for events (name as-given),
//! `"global:"` for instructions (snake-cased name).

use sha2::{Digest, Sha256};

use crate::names::snake_case;

/// Discriminator width in bytes.
pub const DISCRIMINATOR_LEN: usize = 8;

fn sighash(namespace: &str, name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
    out
}

/// Discriminator for an event: first 8 bytes of `SHA-256("event:<Name>")`.
pub fn event_discriminator(name: &str) -> [u8; DISCRIMINATOR_LEN] {
    sighash("event", name)
}

/// Discriminator for an instruction: first 8 bytes of
/// `SHA-256("global:<snake_case_name>")`.
pub fn instruction_discriminator(name: &str) -> [u8; DISCRIMINATOR_LEN] {
    sighash("global", &snake_case(name))
}
