//! Bytecode emission for structured control flow.
//!
//! [`BytecodeEmitter`] owns the growing bytecode section, the source-note
//! stream, and the unwind-region table, and keeps the current source
//! line/column in sync with what has been emitted. The per-statement
//! emitters ([`WhileEmitter`], [`DoWhileEmitter`], [`ForInEmitter`],
//! [`ForOfEmitter`]) drive it through the fixed shape of each loop form.

pub mod control;
pub mod do_while;
pub mod for_in;
pub mod for_of;
pub mod scope;
pub mod while_loop;

#[cfg(test)]
mod tests;

pub use control::{JumpList, JumpSite, LoopControl, StatementKind};
pub use do_while::DoWhileEmitter;
pub use for_in::ForInEmitter;
pub use for_of::ForOfEmitter;
pub use scope::{LexicalScope, TdzCheckCache};
pub use while_loop::WhileEmitter;

use crate::Error;
use crate::bytecode::opcode::Opcode;
use crate::bytecode::section::{BytecodeOffset, BytecodeSection};
use crate::bytecode::trynotes::{TryNote, TryNoteKind, TryNoteList};
use crate::notes::{SrcNoteType, SrcNoteWriter, colspan_to_offset};
use crate::source::SourceInfo;

/// Above this line-step cost, a set-line note beats a run of newline notes.
const MAX_NEWLINE_RUN: u32 = 2;

/// The finished products of emission, ready to hand to an interpreter or
/// debugger.
#[derive(Debug)]
pub struct CompiledScript {
    /// Encoded bytecode.
    pub bytecode: Vec<u8>,
    /// Largest operand stack depth any instruction can observe.
    pub max_stack_depth: u32,
    /// Terminated source-note stream.
    pub source_notes: Vec<u8>,
    /// Unwind regions, in emission order.
    pub try_notes: Vec<TryNote>,
}

/// Emits bytecode, source notes, and unwind regions for one script.
#[derive(Debug)]
pub struct BytecodeEmitter {
    code: BytecodeSection,
    notes: SrcNoteWriter,
    try_notes: TryNoteList,
    source: SourceInfo,
    current_line: u32,
    last_column: u32,
    tdz_cache_depth: usize,
}

impl BytecodeEmitter {
    /// Creates an emitter over the given source text.
    pub fn new(source: &str) -> Self {
        Self {
            code: BytecodeSection::new(),
            notes: SrcNoteWriter::new(),
            try_notes: TryNoteList::new(),
            source: SourceInfo::new(source),
            current_line: 1,
            last_column: 0,
            tdz_cache_depth: 0,
        }
    }

    /// The bytecode section being built.
    pub fn section(&self) -> &BytecodeSection {
        &self.code
    }

    pub(crate) fn section_mut(&mut self) -> &mut BytecodeSection {
        &mut self.code
    }

    /// The source-note stream being built.
    pub fn notes(&self) -> &SrcNoteWriter {
        &self.notes
    }

    /// The unwind-region table being built.
    pub fn try_notes(&self) -> &TryNoteList {
        &self.try_notes
    }

    /// Line/column lookup for the source being compiled.
    pub fn source(&self) -> &SourceInfo {
        &self.source
    }

    /// Offset one past the last emitted instruction.
    pub fn offset(&self) -> BytecodeOffset {
        self.code.offset()
    }

    /// Current operand stack depth.
    pub fn stack_depth(&self) -> i32 {
        self.code.stack_depth()
    }

    /// Overrides the tracked stack depth where control-flow merges leave
    /// the straight-line model short.
    pub fn set_stack_depth(&mut self, depth: i32) {
        self.code.set_stack_depth(depth);
    }

    /// Emits an operand-less instruction.
    pub fn emit1(&mut self, op: Opcode) -> Result<(), Error> {
        self.code.emit1(op)
    }

    /// Emits an instruction with a 4-byte operand.
    pub fn emit_with_operand(&mut self, op: Opcode, operand: u32) -> Result<(), Error> {
        self.code.emit_with_operand(op, operand)
    }

    /// Emits a forward jump with a placeholder operand, returning the site
    /// to register on a [`JumpList`].
    pub fn emit_forward_jump(&mut self, op: Opcode) -> Result<JumpSite, Error> {
        let offset = self.code.emit_jump_placeholder(op)?;
        Ok(JumpSite::new(offset, self.code.stack_depth()))
    }

    /// Emits a jump to an already-emitted target.
    pub fn emit_backward_jump(
        &mut self,
        op: Opcode,
        target: BytecodeOffset,
    ) -> Result<BytecodeOffset, Error> {
        self.code.emit_backward_jump(op, target)
    }

    /// Appends an operand-less source note at the current offset.
    pub fn new_src_note(&mut self, ty: SrcNoteType) -> Result<(), Error> {
        self.notes.new_note(ty, self.code.offset(), &[])
    }

    /// Appends a source note with operands at the current offset.
    pub fn new_src_note_with_operands(
        &mut self,
        ty: SrcNoteType,
        operands: &[u32],
    ) -> Result<(), Error> {
        self.notes.new_note(ty, self.code.offset(), operands)
    }

    /// Brings the line/column the note stream implies up to the source
    /// position `pos`, emitting newline, set-line, or column-span notes as
    /// needed.
    ///
    /// A short forward hop is cheaper as one newline note per line; longer
    /// or backward movement takes an absolute set-line note. Crossing a
    /// line resets the tracked column to the start of the line.
    pub fn update_source_coord_notes(&mut self, pos: u32) -> Result<(), Error> {
        let line = self.source.line_at(pos);
        let column = self.source.column_at(pos);
        if line != self.current_line {
            if line > self.current_line && line - self.current_line <= MAX_NEWLINE_RUN {
                for _ in 0..line - self.current_line {
                    self.new_src_note(SrcNoteType::Newline)?;
                }
            } else {
                self.new_src_note_with_operands(SrcNoteType::SetLine, &[line])?;
            }
            self.current_line = line;
            self.last_column = 0;
        }
        if column != self.last_column {
            let colspan = column as i64 - self.last_column as i64;
            self.new_src_note_with_operands(
                SrcNoteType::ColSpan,
                &[colspan_to_offset(colspan as i32)],
            )?;
            self.last_column = column;
        }
        Ok(())
    }

    /// Records an unwind region over `[start, end)`.
    pub fn add_try_note(
        &mut self,
        kind: TryNoteKind,
        stack_depth: u32,
        start: BytecodeOffset,
        end: BytecodeOffset,
    ) {
        self.try_notes.append(TryNote {
            kind,
            stack_depth,
            start,
            end,
        });
    }

    pub(crate) fn push_tdz_cache(&mut self) -> usize {
        self.tdz_cache_depth += 1;
        self.tdz_cache_depth - 1
    }

    pub(crate) fn pop_tdz_cache(&mut self, index: usize) {
        assert_eq!(
            index + 1,
            self.tdz_cache_depth,
            "TDZ cache levels must close in LIFO order"
        );
        self.tdz_cache_depth -= 1;
    }

    /// Finishes emission, terminating the note stream.
    ///
    /// Every TDZ cache level must be closed by now.
    pub fn finish(self) -> Result<CompiledScript, Error> {
        assert_eq!(self.tdz_cache_depth, 0, "TDZ cache level left open");
        Ok(CompiledScript {
            bytecode: self.code.code().to_vec(),
            max_stack_depth: self.code.max_stack_depth(),
            source_notes: self.notes.finish()?,
            try_notes: self.try_notes.into_notes(),
        })
    }
}
