//! uho-decode — turns raw parsed transactions into typed records.
//!
//! Three decoders share one transaction input:
//!
//! ```text
//! ParsedTransaction ──▶ EventDecoder          (Program data: logs → DecodedEvent)
//!                   ──▶ InstructionDecoder    (top-level + CPI → DecodedInstruction)
//!                   ──▶ TokenTransferDecoder  (token programs → DecodedTokenTransfer)
//! ```
//!
//! All decoded field values are normalized into [`NormalizedValue`] so
//! consumers never see chain-specific representations: 64-bit integers keep
//! full width, pubkeys are base58, byte arrays are hex.

pub mod borsh_read;
pub mod error;
pub mod event;
pub mod instruction;
pub mod record;
pub mod token;
pub mod value;

pub use error::DecodeError;
pub use event::EventDecoder;
pub use instruction::{scan_instructions, InstructionDecoder, InstructionRef};
pub use record::{DecodedEvent, DecodedInstruction, DecodedTokenTransfer, TokenInstructionType};
pub use token::TokenTransferDecoder;
pub use value::NormalizedValue;
