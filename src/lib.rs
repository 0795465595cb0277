// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # osprey-frontend
//!
//! Structured-control-flow bytecode emission for the Osprey stack-machine VM.
//!
//! ## Overview
//!
//! This crate contains the pieces of the frontend that turn structured loop
//! statements (`while`, `do-while`, `for-in`, `for-of`) into a linear,
//! jump-based bytecode stream, together with the side channels the rest of
//! the engine needs to make sense of that stream:
//!
//! - A bytecode section with forward-jump patching and operand stack depth
//!   accounting
//! - A compact, delta-encoded source-note stream for the debugger and
//!   decompiler
//! - A try-note table describing the bytecode ranges that need iterator or
//!   environment cleanup when an exception or `break` unwinds through them
//!
//! Parsing, scope analysis, expression emission, and the VM itself live in
//! their own crates; this crate consumes position hints and scope
//! descriptors from the parser and produces finished bytecode metadata.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use osprey_frontend::{BytecodeEmitter, WhileEmitter, Opcode};
//!
//! let mut bce = BytecodeEmitter::new("while (x) x;");
//! let mut loop_ = WhileEmitter::new();
//! loop_.emit_cond(&mut bce, Some(0), Some(7), Some(11))?;
//! bce.emit1(Opcode::True)?; // condition
//! loop_.emit_body(&mut bce)?;
//! bce.emit1(Opcode::Nop)?; // body
//! loop_.emit_end(&mut bce)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bytecode;
pub mod emitter;
pub mod notes;
pub mod source;

// Re-exports for convenience
pub use bytecode::opcode::Opcode;
pub use bytecode::section::{BytecodeOffset, BytecodeSection};
pub use bytecode::trynotes::{TryNote, TryNoteKind};
pub use emitter::BytecodeEmitter;
pub use emitter::control::{LoopControl, StatementKind};
pub use emitter::do_while::DoWhileEmitter;
pub use emitter::for_in::ForInEmitter;
pub use emitter::for_of::ForOfEmitter;
pub use emitter::while_loop::WhileEmitter;
pub use notes::SrcNoteType;

/// Errors that can occur during bytecode emission.
///
/// Only resource exhaustion is recoverable at this layer; it aborts the
/// current compilation unit. Out-of-order emitter calls, stack-depth
/// mismatches, and unrepresentable notes are compiler defects and panic
/// instead of returning a value of this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The bytecode section grew past the maximum representable offset.
    TooMuchCode,
    /// The source-note stream grew past its maximum length.
    TooManyNotes,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::TooMuchCode => write!(f, "script too large"),
            Error::TooManyNotes => write!(f, "source-note stream too large"),
        }
    }
}

impl std::error::Error for Error {}
