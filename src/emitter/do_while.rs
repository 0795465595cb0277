//! Emitter for `do-while` statements.

use crate::Error;
use crate::bytecode::opcode::Opcode;
use crate::bytecode::trynotes::TryNoteKind;
use crate::emitter::BytecodeEmitter;
use crate::emitter::control::{LoopControl, StatementKind};
use crate::emitter::scope::TdzCheckCache;

/// Emits the fixed shape of a `do-while` loop.
///
/// The body sits at the loop head and the condition at the bottom, so the
/// backward jump is conditional and no separate exit jump is needed.
/// `continue` lands on the condition. Usage:
///
/// ```text
/// emit_body -> [body] -> emit_cond -> [condition] -> emit_end
/// ```
#[derive(Debug, Default)]
pub struct DoWhileEmitter {
    state: State,
    loop_info: Option<LoopControl>,
    tdz_cache: Option<TdzCheckCache>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum State {
    #[default]
    Start,
    Body,
    Cond,
    End,
}

impl DoWhileEmitter {
    /// Creates an emitter in its initial state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the loop; the caller emits the body next.
    ///
    /// A leading `Nop` attributed to `do_pos` gives the `do` keyword its
    /// own bytecode entry for breakpoints.
    pub fn emit_body(
        &mut self,
        bce: &mut BytecodeEmitter,
        do_pos: Option<u32>,
    ) -> Result<(), Error> {
        assert_eq!(self.state, State::Start, "body emitted out of order");
        if let Some(pos) = do_pos {
            bce.update_source_coord_notes(pos)?;
        }
        bce.emit1(Opcode::Nop)?;
        let mut loop_info = LoopControl::new(bce, StatementKind::DoWhileLoop);
        loop_info.emit_loop_head(bce, None)?;
        self.loop_info = Some(loop_info);
        self.tdz_cache = Some(TdzCheckCache::open(bce));
        self.state = State::Body;
        Ok(())
    }

    /// Ends the body; the caller emits the condition next. This is where
    /// `continue` lands.
    pub fn emit_cond(&mut self, bce: &mut BytecodeEmitter) -> Result<(), Error> {
        assert_eq!(self.state, State::Body, "condition emitted out of order");
        self.tdz_cache
            .take()
            .expect("emit_body opens the cache")
            .close(bce);
        self.loop_info
            .as_mut()
            .expect("emit_body registers the loop")
            .emit_continue_target(bce);
        self.state = State::Cond;
        Ok(())
    }

    /// Finishes the loop with the conditional backward jump.
    pub fn emit_end(&mut self, bce: &mut BytecodeEmitter) -> Result<(), Error> {
        assert_eq!(self.state, State::Cond, "loop ended out of order");
        let mut loop_info = self.loop_info.take().expect("emit_body registers the loop");
        loop_info.emit_loop_end(bce, Opcode::IfNe)?;
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
