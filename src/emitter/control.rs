//! Loop bookkeeping: pending-jump lists and the per-loop control record.
//!
//! A `LoopControl` lives for exactly one loop. It remembers where the loop
//! head landed, where `continue` goes, and which forward jumps are still
//! waiting for the break target. Its methods must be called in a fixed
//! order; calling out of order is a defect in the statement emitter driving
//! it and fails fatally.

use crate::Error;
use crate::bytecode::opcode::Opcode;
use crate::bytecode::section::{BytecodeOffset, BytecodeSection};
use crate::emitter::BytecodeEmitter;
use crate::notes::SrcNoteType;

/// The statement form a loop control record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// C-style `for (;;)` loop.
    ForLoop,
    /// `while` loop.
    WhileLoop,
    /// `do-while` loop.
    DoWhileLoop,
    /// `for-in` loop.
    ForInLoop,
    /// `for-of` loop.
    ForOfLoop,
}

impl StatementKind {
    /// The source-note type written at the loop head for this kind.
    pub fn src_note_type(self) -> SrcNoteType {
        match self {
            StatementKind::ForLoop => SrcNoteType::For,
            StatementKind::WhileLoop => SrcNoteType::While,
            StatementKind::DoWhileLoop => SrcNoteType::DoWhile,
            StatementKind::ForInLoop => SrcNoteType::ForIn,
            StatementKind::ForOfLoop => SrcNoteType::ForOf,
        }
    }
}

/// A forward jump whose target operand is still the placeholder.
///
/// The stack depth reaching the target along this edge is recorded at
/// emission time so it can be checked against the depth at the target when
/// the jump is finally patched.
#[derive(Debug, Clone, Copy)]
pub struct JumpSite {
    offset: BytecodeOffset,
    stack_depth: i32,
}

impl JumpSite {
    pub(crate) fn new(offset: BytecodeOffset, stack_depth: i32) -> Self {
        Self {
            offset,
            stack_depth,
        }
    }

    /// Offset of the jump instruction.
    pub fn offset(self) -> BytecodeOffset {
        self.offset
    }
}

/// A growable set of pending forward jumps sharing one eventual target.
#[derive(Debug, Default)]
pub struct JumpList {
    sites: Vec<JumpSite>,
}

impl JumpList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether every registered site has been patched.
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Number of still-pending sites.
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Registers a pending jump.
    pub fn register(&mut self, site: JumpSite) {
        self.sites.push(site);
    }

    /// Patches every pending site to `target` and empties the list.
    ///
    /// The operand stack depth the section tracks at the target must match
    /// the depth recorded at each jump; a mismatch means some path would
    /// reach the target with a different stack than the fall-through path.
    pub fn patch_all(&mut self, section: &mut BytecodeSection, target: BytecodeOffset) {
        for site in self.sites.drain(..) {
            assert_eq!(
                site.stack_depth,
                section.stack_depth(),
                "stack depth at jump target differs between control edges"
            );
            section.patch_jump(site.offset, target);
        }
    }
}

/// Lifecycle of a `LoopControl`; transitions are linear and mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Created,
    HeadEmitted,
    ContinueTargetSet,
    Ended,
    Patched,
}

/// Jump-patching and bookkeeping for one active loop.
#[derive(Debug)]
pub struct LoopControl {
    kind: StatementKind,
    state: LoopState,
    /// Operand stack depth when the control record was created.
    entry_stack_depth: i32,
    head: BytecodeOffset,
    continue_target: Option<BytecodeOffset>,
    break_target: Option<BytecodeOffset>,
    breaks: JumpList,
    continues: JumpList,
}

impl LoopControl {
    /// Creates the control record for a loop about to be emitted.
    pub fn new(bce: &BytecodeEmitter, kind: StatementKind) -> Self {
        Self {
            kind,
            state: LoopState::Created,
            entry_stack_depth: bce.stack_depth(),
            head: BytecodeOffset::new(0),
            continue_target: None,
            break_target: None,
            breaks: JumpList::new(),
            continues: JumpList::new(),
        }
    }

    fn transition(&mut self, from: LoopState, to: LoopState) {
        assert_eq!(
            self.state, from,
            "loop control method called out of order ({:?} -> {:?})",
            self.state, to
        );
        self.state = to;
    }

    /// The loop kind this record was created with.
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Operand stack depth at creation.
    pub fn entry_stack_depth(&self) -> i32 {
        self.entry_stack_depth
    }

    /// Offset of the loop-head instruction. Valid once the head is emitted.
    pub fn head_offset(&self) -> BytecodeOffset {
        assert!(self.state != LoopState::Created, "loop head not emitted yet");
        self.head
    }

    /// One past the loop-end jump; where `break` lands. Valid once the loop
    /// end is emitted.
    pub fn break_target_offset(&self) -> BytecodeOffset {
        self.break_target.expect("loop end not emitted yet")
    }

    /// Emits the loop-head marker and the kind source note, optionally
    /// attributing it to a source position first.
    ///
    /// Must be the first emission step on this record.
    pub fn emit_loop_head(
        &mut self,
        bce: &mut BytecodeEmitter,
        next_pos: Option<u32>,
    ) -> Result<(), Error> {
        assert_eq!(self.state, LoopState::Created, "loop head emitted twice");
        if let Some(pos) = next_pos {
            bce.update_source_coord_notes(pos)?;
        }
        bce.new_src_note(self.kind.src_note_type())?;
        self.head = bce.offset();
        bce.emit1(Opcode::LoopHead)?;
        self.transition(LoopState::Created, LoopState::HeadEmitted);
        Ok(())
    }

    /// Records the current offset as the continue target and patches every
    /// pending `continue` jump to it.
    pub fn emit_continue_target(&mut self, bce: &mut BytecodeEmitter) {
        let target = bce.offset();
        self.continues.patch_all(bce.section_mut(), target);
        self.continue_target = Some(target);
        self.transition(LoopState::HeadEmitted, LoopState::ContinueTargetSet);
    }

    /// Emits the backward jump to the loop head; the last instruction of
    /// the loop. The break target is the offset just past it.
    pub fn emit_loop_end(&mut self, bce: &mut BytecodeEmitter, op: Opcode) -> Result<(), Error> {
        assert_eq!(
            self.state,
            LoopState::ContinueTargetSet,
            "loop end before continue target"
        );
        bce.emit_backward_jump(op, self.head)?;
        self.break_target = Some(bce.offset());
        self.transition(LoopState::ContinueTargetSet, LoopState::Ended);
        Ok(())
    }

    /// Emits a forward jump to the (future) break target and registers it
    /// for patching.
    pub fn emit_jump_to_break(
        &mut self,
        bce: &mut BytecodeEmitter,
        op: Opcode,
    ) -> Result<(), Error> {
        assert!(
            matches!(self.state, LoopState::HeadEmitted | LoopState::ContinueTargetSet),
            "break jump registered outside the loop body"
        );
        let site = bce.emit_forward_jump(op)?;
        self.breaks.register(site);
        Ok(())
    }

    /// Emits an unconditional `break` out of this loop.
    pub fn emit_break(&mut self, bce: &mut BytecodeEmitter) -> Result<(), Error> {
        self.emit_jump_to_break(bce, Opcode::Goto)
    }

    /// Emits a `continue` to this loop's continue target.
    pub fn emit_continue(&mut self, bce: &mut BytecodeEmitter) -> Result<(), Error> {
        assert_eq!(
            self.state,
            LoopState::HeadEmitted,
            "continue registered after the continue target was set"
        );
        let site = bce.emit_forward_jump(Opcode::Goto)?;
        self.continues.register(site);
        Ok(())
    }

    /// Patches every pending break to one past the loop-end jump. The last
    /// emission step; `continues` must already have been drained by
    /// `emit_continue_target`.
    pub fn patch_breaks_and_continues(&mut self, bce: &mut BytecodeEmitter) {
        assert_eq!(self.state, LoopState::Ended, "loop end not emitted yet");
        assert!(
            self.continues.is_empty(),
            "continues survived past the continue target"
        );
        let target = self.break_target.expect("loop end not emitted yet");
        self.breaks.patch_all(bce.section_mut(), target);
        self.transition(LoopState::Ended, LoopState::Patched);
    }

    /// Consumes the record, checking that nothing is left unpatched.
    pub fn dispose(self) {
        assert_eq!(self.state, LoopState::Patched, "loop disposed before patching");
        assert!(self.breaks.is_empty(), "unpatched break at loop disposal");
        assert!(self.continues.is_empty(), "unpatched continue at loop disposal");
    }
}
