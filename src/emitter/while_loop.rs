//! Emitter for `while` statements.

use crate::Error;
use crate::bytecode::opcode::Opcode;
use crate::bytecode::trynotes::TryNoteKind;
use crate::emitter::BytecodeEmitter;
use crate::emitter::control::{LoopControl, StatementKind};
use crate::emitter::scope::TdzCheckCache;

/// Emits the fixed shape of a `while` loop around caller-supplied condition
/// and body bytecode.
///
/// The condition sits at the loop head; a conditional forward jump past the
/// body exits the loop and an unconditional backward jump re-tests the
/// condition. Usage:
///
/// ```text
/// emit_cond -> [condition] -> emit_body -> [body] -> emit_end
/// ```
#[derive(Debug, Default)]
pub struct WhileEmitter {
    state: State,
    loop_info: Option<LoopControl>,
    tdz_cache: Option<TdzCheckCache>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum State {
    #[default]
    Start,
    Cond,
    Body,
    End,
}

impl WhileEmitter {
    /// Creates an emitter in its initial state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the loop; the caller emits the condition next.
    ///
    /// `while_pos` and `end_pos` delimit the whole statement; when both
    /// fall on one source line an extra `Nop` is emitted so the statement
    /// has a bytecode entry of its own for breakpoints, distinct from the
    /// per-iteration condition check. `cond_pos` attributes the loop head
    /// to the condition.
    pub fn emit_cond(
        &mut self,
        bce: &mut BytecodeEmitter,
        while_pos: Option<u32>,
        cond_pos: Option<u32>,
        end_pos: Option<u32>,
    ) -> Result<(), Error> {
        assert_eq!(self.state, State::Start, "condition emitted out of order");
        if let (Some(while_pos), Some(end_pos)) = (while_pos, end_pos)
            && bce.source().line_at(while_pos) == bce.source().line_at(end_pos)
        {
            bce.update_source_coord_notes(while_pos)?;
            bce.emit1(Opcode::Nop)?;
        }
        let mut loop_info = LoopControl::new(bce, StatementKind::WhileLoop);
        loop_info.emit_loop_head(bce, cond_pos)?;
        self.loop_info = Some(loop_info);
        self.state = State::Cond;
        Ok(())
    }

    /// Ends the condition; the caller emits the body next.
    pub fn emit_body(&mut self, bce: &mut BytecodeEmitter) -> Result<(), Error> {
        assert_eq!(self.state, State::Cond, "body emitted out of order");
        self.loop_info
            .as_mut()
            .expect("emit_cond registers the loop")
            .emit_jump_to_break(bce, Opcode::IfEq)?;
        self.tdz_cache = Some(TdzCheckCache::open(bce));
        self.state = State::Body;
        Ok(())
    }

    /// Finishes the loop: backward jump, unwind region, break patching.
    pub fn emit_end(&mut self, bce: &mut BytecodeEmitter) -> Result<(), Error> {
        assert_eq!(self.state, State::Body, "loop ended out of order");
        self.tdz_cache
            .take()
            .expect("emit_body opens the cache")
            .close(bce);
        let mut loop_info = self.loop_info.take().expect("emit_cond registers the loop");
        loop_info.emit_continue_target(bce);
        loop_info.emit_loop_end(bce, Opcode::Goto)?;
        bce.add_try_note(
            TryNoteKind::Loop,
            bce.stack_depth() as u32,
            loop_info.head_offset(),
            bce.offset(),
        );
        loop_info.patch_breaks_and_continues(bce);
        loop_info.dispose();
        self.state = State::End;
        Ok(())
    }

    /// The active loop record, for `break`/`continue` emission inside the
    /// body.
    pub fn loop_info(&mut self) -> &mut LoopControl {
        self.loop_info.as_mut().expect("loop not started")
    }
}
