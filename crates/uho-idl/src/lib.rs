//! uho-idl — Anchor/Shank IDL model and parser for the uho indexer.
//!
//! # Architecture
//!
//! ```text
//! raw IDL JSON ──parse──▶ ProgramSpec
//!                             ├── EventDef        (name, discriminator, fields)
//!                             ├── InstructionDef  (name, discriminator, args, accounts)
//!                             └── TypeDef map     (defined structs / enums / aliases)
//! ```
//!
//! A `ProgramSpec` is the single source of truth for the decoders: it carries
//! the 8-byte discriminators, the ordered field layouts, and the storage-type
//! mapping used by the schema layer and the fan-out writer.

pub mod discriminator;
pub mod error;
pub mod names;
pub mod program;
pub mod raw;
pub mod registry;
pub mod types;

pub use discriminator::{event_discriminator, instruction_discriminator};
pub use error::IdlError;
pub use names::{quote_ident, snake_case, table_name};
pub use program::{EventDef, FieldDef, InstructionDef, ProgramSpec, TypeDef};
pub use registry::{resolve_builtin, BuiltinProgram};
pub use types::{ColumnType, IdlType};
