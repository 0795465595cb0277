//! End-to-end emission tests driving the statement emitters the way a
//! parser would.

use crate::Error;
use crate::bytecode::opcode::Opcode;
use crate::bytecode::section::BytecodeOffset;
use crate::bytecode::trynotes::TryNoteKind;
use crate::emitter::{
    BytecodeEmitter, DoWhileEmitter, ForInEmitter, ForOfEmitter, LexicalScope, WhileEmitter,
};
use crate::notes::{SrcNote, SrcNoteReader, SrcNoteType, offset_to_colspan};

fn opcodes(bce: &BytecodeEmitter) -> Vec<Opcode> {
    bce.section().iter_opcodes().map(|(_, op)| op).collect()
}

fn notes(bce: &BytecodeEmitter) -> Vec<SrcNote> {
    SrcNoteReader::new(bce.notes().bytes()).collect()
}

/// `while (cond) body;` with a one-opcode condition and body.
fn emit_simple_while(bce: &mut BytecodeEmitter) -> Result<(), Error> {
    let mut loop_ = WhileEmitter::new();
    loop_.emit_cond(bce, None, None, None)?;
    bce.emit1(Opcode::True)?;
    loop_.emit_body(bce)?;
    bce.emit1(Opcode::Nop)?;
    loop_.emit_end(bce)
}

#[test]
fn test_while_shape() {
    let mut bce = BytecodeEmitter::new("while (x)\n  x;\n");
    emit_simple_while(&mut bce).unwrap();

    assert_eq!(
        opcodes(&bce),
        vec![
            Opcode::LoopHead, // 0
            Opcode::True,     // 1
            Opcode::IfEq,     // 2, exits the loop
            Opcode::Nop,      // 7, body
            Opcode::Goto,     // 8, back to the head
        ]
    );
    let section = bce.section();
    assert_eq!(section.jump_target(BytecodeOffset::new(8)), BytecodeOffset::new(0));
    assert_eq!(
        section.jump_target(BytecodeOffset::new(2)),
        BytecodeOffset::new(13),
        "the exit jump lands just past the backward jump"
    );
    assert_eq!(bce.stack_depth(), 0);
    assert_eq!(section.max_stack_depth(), 1);

    let try_notes = bce.try_notes().notes();
    assert_eq!(try_notes.len(), 1);
    assert_eq!(try_notes[0].kind, TryNoteKind::Loop);
    assert_eq!(try_notes[0].stack_depth, 0);
    assert_eq!(try_notes[0].start, BytecodeOffset::new(0));
    assert_eq!(try_notes[0].end, BytecodeOffset::new(13));

    let notes = notes(&bce);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].ty, SrcNoteType::While);
    assert_eq!(notes[0].offset, BytecodeOffset::new(0), "kind note sits on the loop head");
}

#[test]
fn test_while_on_one_line_gets_its_own_entry_point() {
    // The whole statement is on line 1, so stepping needs a Nop distinct
    // from the per-iteration condition check.
    let mut bce = BytecodeEmitter::new("while (x) x;");
    let mut loop_ = WhileEmitter::new();
    loop_.emit_cond(&mut bce, Some(0), Some(7), Some(11)).unwrap();
    bce.emit1(Opcode::True).unwrap();
    loop_.emit_body(&mut bce).unwrap();
    bce.emit1(Opcode::Nop).unwrap();
    loop_.emit_end(&mut bce).unwrap();

    let ops = opcodes(&bce);
    assert_eq!(ops[0], Opcode::Nop);
    assert_eq!(ops[1], Opcode::LoopHead);
    // The condition position is mid-line, so the loop head carries a
    // column-span note alongside the kind note.
    let notes = notes(&bce);
    assert_eq!(notes[0].ty, SrcNoteType::ColSpan);
    assert_eq!(offset_to_colspan(notes[0].operands[0]), 7);
    assert_eq!(notes[1].ty, SrcNoteType::While);
    assert_eq!(notes[1].offset, BytecodeOffset::new(1));
}

#[test]
fn test_while_not_on_one_line_has_no_entry_nop() {
    let mut bce = BytecodeEmitter::new("while (x)\n  x;");
    let mut loop_ = WhileEmitter::new();
    loop_.emit_cond(&mut bce, Some(0), None, Some(12)).unwrap();
    bce.emit1(Opcode::True).unwrap();
    loop_.emit_body(&mut bce).unwrap();
    bce.emit1(Opcode::Nop).unwrap();
    loop_.emit_end(&mut bce).unwrap();

    assert_eq!(opcodes(&bce)[0], Opcode::LoopHead);
}

#[test]
fn test_do_while_shape() {
    let mut bce = BytecodeEmitter::new("do x; while (x);");
    let mut loop_ = DoWhileEmitter::new();
    loop_.emit_body(&mut bce, Some(0)).unwrap();
    bce.emit1(Opcode::Nop).unwrap();
    loop_.emit_cond(&mut bce).unwrap();
    bce.emit1(Opcode::True).unwrap();
    loop_.emit_end(&mut bce).unwrap();

    assert_eq!(
        opcodes(&bce),
        vec![
            Opcode::Nop,      // 0, breakpoint entry for `do`
            Opcode::LoopHead, // 1
            Opcode::Nop,      // 2, body
            Opcode::True,     // 3, condition; also the continue target
            Opcode::IfNe,     // 4, back to the head while true
        ]
    );
    let section = bce.section();
    assert_eq!(section.jump_target(BytecodeOffset::new(4)), BytecodeOffset::new(1));
    assert_eq!(bce.stack_depth(), 0);

    let try_notes = bce.try_notes().notes();
    assert_eq!(try_notes.len(), 1);
    assert_eq!(try_notes[0].kind, TryNoteKind::Loop);
    assert_eq!(try_notes[0].start, BytecodeOffset::new(1));
    assert_eq!(try_notes[0].end, BytecodeOffset::new(9));

    let notes = notes(&bce);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].ty, SrcNoteType::DoWhile);
    assert_eq!(notes[0].offset, BytecodeOffset::new(1));
}

#[test]
fn test_break_and_continue_patching() {
    let mut bce = BytecodeEmitter::new("while (x) { continue; break; }");
    let mut loop_ = WhileEmitter::new();
    loop_.emit_cond(&mut bce, None, None, None).unwrap();
    bce.emit1(Opcode::True).unwrap();
    loop_.emit_body(&mut bce).unwrap();
    let continue_at = bce.offset();
    loop_.loop_info().emit_continue(&mut bce).unwrap();
    let break_at = bce.offset();
    loop_.loop_info().emit_break(&mut bce).unwrap();
    loop_.emit_end(&mut bce).unwrap();

    let section = bce.section();
    // Continue lands on the backward jump, break just past it.
    let backward_goto = BytecodeOffset::new(break_at.value() + 5);
    assert_eq!(section.jump_target(continue_at), backward_goto);
    assert_eq!(
        section.jump_target(break_at),
        BytecodeOffset::new(backward_goto.value() + 5)
    );
}

#[test]
fn test_for_in_shape() {
    let mut bce = BytecodeEmitter::new("for (x in o) x;");
    let mut loop_ = ForInEmitter::new(None);
    loop_.emit_iterated(&mut bce).unwrap();
    bce.emit1(Opcode::True).unwrap(); // the iterated object
    loop_.emit_initialize(&mut bce).unwrap();
    loop_.emit_body(&mut bce).unwrap();
    bce.emit1(Opcode::Nop).unwrap();
    loop_.emit_end(&mut bce, None).unwrap();

    assert_eq!(
        opcodes(&bce),
        vec![
            Opcode::True,     // 0, iterated object
            Opcode::Iter,     // 1
            Opcode::LoopHead, // 2
            Opcode::MoreIter, // 3
            Opcode::IsNoIter, // 4
            Opcode::IfNe,     // 5, exit when exhausted
            Opcode::IterNext, // 10
            Opcode::Nop,      // 11, body
            Opcode::Pop,      // 12, drop the property name
            Opcode::Goto,     // 13, back to the head
            Opcode::Pop,      // 18, break edges land here
            Opcode::EndIter,  // 19
        ]
    );
    let section = bce.section();
    assert_eq!(section.jump_target(BytecodeOffset::new(13)), BytecodeOffset::new(2));
    assert_eq!(
        section.jump_target(BytecodeOffset::new(5)),
        BytecodeOffset::new(18),
        "the exhaustion exit keeps the un-popped iterator slots"
    );
    assert_eq!(bce.stack_depth(), 0);
    assert_eq!(section.max_stack_depth(), 3);

    let try_notes = bce.try_notes().notes();
    assert_eq!(try_notes.len(), 1);
    assert_eq!(try_notes[0].kind, TryNoteKind::ForIn);
    assert_eq!(try_notes[0].stack_depth, 1, "the unwinder keeps the iterator to close it");
    assert_eq!(try_notes[0].start, BytecodeOffset::new(2));
    assert_eq!(try_notes[0].end, BytecodeOffset::new(19));

    let notes = notes(&bce);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].ty, SrcNoteType::ForIn);
    assert_eq!(notes[0].offset, BytecodeOffset::new(2));
}

#[test]
fn test_for_in_head_scope_is_freshened_each_iteration() {
    let mut scope = LexicalScope::new(true);
    scope.declare("x", 0);

    let mut bce = BytecodeEmitter::new("for (let x in o) f = () => x;");
    let mut loop_ = ForInEmitter::new(Some(&scope));
    loop_.emit_iterated(&mut bce).unwrap();
    bce.emit1(Opcode::True).unwrap();
    loop_.emit_initialize(&mut bce).unwrap();
    loop_.emit_body(&mut bce).unwrap();
    loop_.emit_end(&mut bce, None).unwrap();

    let ops = opcodes(&bce);
    let exit = ops.iter().position(|&op| op == Opcode::IfNe).unwrap();
    assert_eq!(
        &ops[exit + 1..exit + 5],
        &[
            Opcode::RecreateLexicalEnv,
            Opcode::Uninitialized,
            Opcode::InitLexical,
            Opcode::Pop,
        ]
    );
    assert_eq!(bce.stack_depth(), 0);
}

#[test]
fn test_for_of_shape() {
    let mut bce = BytecodeEmitter::new("for (x of o) x;");
    let mut loop_ = ForOfEmitter::new(None);
    loop_.emit_iterated(&mut bce).unwrap();
    bce.emit1(Opcode::True).unwrap(); // the iterated object
    loop_.emit_initialize(&mut bce).unwrap();
    loop_.emit_body(&mut bce).unwrap();
    bce.emit1(Opcode::Nop).unwrap();
    loop_.emit_end(&mut bce, None).unwrap();

    assert_eq!(
        opcodes(&bce),
        vec![
            Opcode::True,     // 0, iterated object
            Opcode::GetIter,  // 1
            Opcode::LoopHead, // 2
            Opcode::NextIter, // 3
            Opcode::IfNe,     // 4, exit when done
            Opcode::Nop,      // 9, body
            Opcode::Pop,      // 10, drop the step result
            Opcode::Goto,     // 11, back to the head
            Opcode::Pop,      // 16, break edges land here
            Opcode::EndIter,  // 17
            Opcode::Pop,      // 18, drop the next method
        ]
    );
    let section = bce.section();
    assert_eq!(section.jump_target(BytecodeOffset::new(11)), BytecodeOffset::new(2));
    assert_eq!(section.jump_target(BytecodeOffset::new(4)), BytecodeOffset::new(16));
    assert_eq!(bce.stack_depth(), 0);
    assert_eq!(section.max_stack_depth(), 4);

    let try_notes = bce.try_notes().notes();
    assert_eq!(try_notes.len(), 1);
    assert_eq!(try_notes[0].kind, TryNoteKind::ForOf);
    assert_eq!(try_notes[0].stack_depth, 2);
    assert_eq!(try_notes[0].start, BytecodeOffset::new(2));
    assert_eq!(try_notes[0].end, BytecodeOffset::new(17));

    let notes = notes(&bce);
    assert_eq!(notes[0].ty, SrcNoteType::ForOf);
}

#[test]
fn test_nested_loops_give_nested_try_notes() {
    let mut bce = BytecodeEmitter::new("while (x) { while (y) y; }");
    let mut outer = WhileEmitter::new();
    outer.emit_cond(&mut bce, None, None, None).unwrap();
    bce.emit1(Opcode::True).unwrap();
    outer.emit_body(&mut bce).unwrap();
    emit_simple_while(&mut bce).unwrap();
    outer.emit_end(&mut bce).unwrap();

    let try_notes = bce.try_notes().notes();
    assert_eq!(try_notes.len(), 2);
    // Inner recorded first, nested inside the outer region.
    assert!(try_notes[1].start < try_notes[0].start);
    assert!(try_notes[0].end < try_notes[1].end);
    let inner_offset = try_notes[0].start;
    assert_eq!(
        bce.try_notes().find_innermost(inner_offset).unwrap().start,
        try_notes[0].start
    );
}

#[test]
fn test_line_and_column_notes() {
    let mut bce = BytecodeEmitter::new("a;\nbb;\nccc;\n\n\n\ndddd;");
    // Forward one line: a newline note.
    bce.update_source_coord_notes(3).unwrap();
    // Forward three lines at once: an absolute set-line note.
    bce.update_source_coord_notes(15).unwrap();
    // Column movement on the same line: a signed column span.
    bce.update_source_coord_notes(19).unwrap();
    // Backward: absolute again.
    bce.update_source_coord_notes(0).unwrap();

    let notes = notes(&bce);
    let kinds: Vec<SrcNoteType> = notes.iter().map(|n| n.ty).collect();
    assert_eq!(
        kinds,
        vec![
            SrcNoteType::Newline,
            SrcNoteType::SetLine,
            SrcNoteType::ColSpan,
            SrcNoteType::SetLine,
        ]
    );
    assert_eq!(notes[1].operands, vec![7]);
    assert_eq!(offset_to_colspan(notes[2].operands[0]), 4);
    assert_eq!(notes[3].operands, vec![1]);
}

#[test]
fn test_finish_produces_terminated_notes() {
    let mut bce = BytecodeEmitter::new("while (x) x;");
    emit_simple_while(&mut bce).unwrap();
    let script = bce.finish().unwrap();

    assert_eq!(*script.source_notes.last().unwrap(), 0);
    assert_eq!(script.try_notes.len(), 1);
    assert_eq!(script.max_stack_depth, 1);
    assert_eq!(script.bytecode.len(), 13);
}

#[test]
#[should_panic(expected = "loop ended out of order")]
fn test_while_end_before_body_panics() {
    let mut bce = BytecodeEmitter::new("");
    let mut loop_ = WhileEmitter::new();
    loop_.emit_cond(&mut bce, None, None, None).unwrap();
    bce.emit1(Opcode::True).unwrap();
    let _ = loop_.emit_end(&mut bce);
}

#[test]
#[should_panic(expected = "body emitted out of order")]
fn test_for_in_body_before_initialize_panics() {
    let mut bce = BytecodeEmitter::new("");
    let mut loop_ = ForInEmitter::new(None);
    loop_.emit_iterated(&mut bce).unwrap();
    let _ = loop_.emit_body(&mut bce);
}

#[test]
#[should_panic(expected = "leave the stack balanced")]
fn test_for_in_unbalanced_assignment_panics() {
    let mut bce = BytecodeEmitter::new("");
    let mut loop_ = ForInEmitter::new(None);
    loop_.emit_iterated(&mut bce).unwrap();
    bce.emit1(Opcode::True).unwrap();
    loop_.emit_initialize(&mut bce).unwrap();
    // A target assignment that leaks a value.
    bce.emit1(Opcode::True).unwrap();
    let _ = loop_.emit_body(&mut bce);
}

#[test]
#[should_panic(expected = "after the continue target")]
fn test_continue_after_cond_in_do_while_panics() {
    let mut bce = BytecodeEmitter::new("");
    let mut loop_ = DoWhileEmitter::new();
    loop_.emit_body(&mut bce, None).unwrap();
    bce.emit1(Opcode::Nop).unwrap();
    loop_.emit_cond(&mut bce).unwrap();
    let _ = loop_.loop_info().emit_continue(&mut bce);
}
