//! Bytecode definitions and the append-only bytecode section.
//!
//! # Module Structure
//!
//! - `opcode`: Opcode vocabulary and per-opcode metadata
//! - `section`: The append-only byte buffer with jump patching and stack
//!   depth accounting
//! - `trynotes`: The exception-unwind region table

pub mod opcode;
pub mod section;
pub mod trynotes;

pub use opcode::Opcode;
pub use section::{BytecodeOffset, BytecodeSection};
pub use trynotes::{TryNote, TryNoteKind, TryNoteList};
