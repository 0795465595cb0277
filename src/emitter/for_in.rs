//! Emitter for `for-in` statements.

use crate::Error;
use crate::bytecode::opcode::Opcode;
use crate::bytecode::trynotes::TryNoteKind;
use crate::emitter::BytecodeEmitter;
use crate::emitter::control::{LoopControl, StatementKind};
use crate::emitter::scope::{LexicalScope, TdzCheckCache};

/// Emits the fixed shape of a `for-in` loop.
///
/// The iterated object is turned into a property iterator that lives on the
/// operand stack for the whole loop; each turn pushes the next property
/// name, tests it against the exhaustion sentinel, and hands it to the
/// caller-emitted target assignment. A for-in try note covers the region so
/// the unwinder can close the iterator. Usage:
///
/// ```text
/// emit_iterated -> [object expression] -> emit_initialize
///     -> [target assignment] -> emit_body -> [body] -> emit_end
/// ```
#[derive(Debug)]
pub struct ForInEmitter<'a> {
    /// Bindings declared in the loop head, freshened per iteration.
    head_lexical_scope: Option<&'a LexicalScope>,
    state: State,
    loop_info: Option<LoopControl>,
    tdz_cache: Option<TdzCheckCache>,
    /// Operand stack depth before the iterated object is evaluated.
    entry_depth: i32,
    /// Depth inside the loop: `entry_depth` plus the iterator and the
    /// current property name.
    loop_depth: i32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum State {
    #[default]
    Start,
    Iterated,
    Initialize,
    Body,
    End,
}

impl<'a> ForInEmitter<'a> {
    /// Creates an emitter. `head_lexical_scope` describes bindings declared
    /// in the loop head, if any.
    pub fn new(head_lexical_scope: Option<&'a LexicalScope>) -> Self {
        Self {
            head_lexical_scope,
            state: State::Start,
            loop_info: None,
            tdz_cache: None,
            entry_depth: 0,
            loop_depth: 0,
        }
    }

    /// Starts the loop; the caller emits the iterated object expression
    /// next.
    pub fn emit_iterated(&mut self, bce: &mut BytecodeEmitter) -> Result<(), Error> {
        assert_eq!(self.state, State::Start, "iterated emitted out of order");
        self.entry_depth = bce.stack_depth();
        // The object expression can read head bindings before the loop
        // initializes them, so it gets its own cache level.
        self.tdz_cache = Some(TdzCheckCache::open(bce));
        self.state = State::Iterated;
        Ok(())
    }

    /// Converts the object to an iterator and emits the per-iteration head:
    /// fetch the next property name, exit when exhausted, refresh head
    /// bindings. The caller emits the target assignment next, consuming
    /// nothing; the current name stays on top of the stack.
    pub fn emit_initialize(&mut self, bce: &mut BytecodeEmitter) -> Result<(), Error> {
        assert_eq!(self.state, State::Iterated, "initialize emitted out of order");
        self.tdz_cache
            .take()
            .expect("emit_iterated opens the cache")
            .close(bce);
        bce.emit1(Opcode::Iter)?;

        let mut loop_info = LoopControl::new(bce, StatementKind::ForInLoop);
        loop_info.emit_loop_head(bce, None)?;
        bce.emit1(Opcode::MoreIter)?;
        bce.emit1(Opcode::IsNoIter)?;
        loop_info.emit_jump_to_break(bce, Opcode::IfNe)?;

        if let Some(scope) = self.head_lexical_scope {
            if scope.has_environment() {
                bce.emit1(Opcode::RecreateLexicalEnv)?;
            }
            scope.dead_zone_frame_slots(bce)?;
        }

        self.loop_depth = bce.stack_depth();
        assert_eq!(
            self.loop_depth,
            self.entry_depth + 2,
            "iterator and property name must be the only loop slots"
        );
        bce.emit1(Opcode::IterNext)?;
        self.loop_info = Some(loop_info);
        self.state = State::Initialize;
        Ok(())
    }

    /// Ends the target assignment; the caller emits the body next.
    pub fn emit_body(&mut self, bce: &mut BytecodeEmitter) -> Result<(), Error> {
        assert_eq!(self.state, State::Initialize, "body emitted out of order");
        assert_eq!(
            bce.stack_depth(),
            self.loop_depth,
            "target assignment must leave the stack balanced"
        );
        self.tdz_cache = Some(TdzCheckCache::open(bce));
        self.state = State::Body;
        Ok(())
    }

    /// Finishes the loop: backward jump, break patching, iterator cleanup,
    /// and the for-in unwind region. `for_pos` attributes the per-iteration
    /// jump back to the `for` keyword.
    pub fn emit_end(
        &mut self,
        bce: &mut BytecodeEmitter,
        for_pos: Option<u32>,
    ) -> Result<(), Error> {
        assert_eq!(self.state, State::Body, "loop ended out of order");
        self.tdz_cache
            .take()
            .expect("emit_body opens the cache")
            .close(bce);
        let mut loop_info = self.loop_info.take().expect("emit_initialize registers the loop");

        if let Some(pos) = for_pos {
            bce.update_source_coord_notes(pos)?;
        }
        loop_info.emit_continue_target(bce);

        // The fall-through path drops the property name before jumping
        // back; break edges skip that pop, so the tracked depth has to be
        // re-inflated before they are patched.
        bce.emit1(Opcode::Pop)?;
        loop_info.emit_loop_end(bce, Opcode::Goto)?;
        bce.set_stack_depth(self.loop_depth);
        loop_info.patch_breaks_and_continues(bce);
        bce.emit1(Opcode::Pop)?;

        bce.add_try_note(
            TryNoteKind::ForIn,
            bce.stack_depth() as u32,
            loop_info.head_offset(),
            bce.offset(),
        );
        bce.emit1(Opcode::EndIter)?;

        assert_eq!(
            bce.stack_depth(),
            self.entry_depth,
            "loop must leave the stack as it found it"
        );
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
