//! The append-only bytecode section.
//!
//! Instructions are encoded into a flat byte buffer with a monotonically
//! increasing offset cursor. Forward jumps are emitted with a placeholder
//! operand and patched once their target is known; the section also tracks
//! the operand stack depth implied by the emitted opcodes so that control
//! flow joins can be checked against it.

use crate::Error;
use crate::bytecode::opcode::Opcode;

/// A byte position in the bytecode section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BytecodeOffset(u32);

impl BytecodeOffset {
    /// Creates an offset from a raw byte position.
    pub fn new(value: u32) -> Self {
        BytecodeOffset(value)
    }

    /// The raw byte position.
    pub fn value(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for BytecodeOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Largest bytecode offset a jump operand or source note can describe.
pub const MAX_BYTECODE_LENGTH: u32 = i32::MAX as u32;

/// Placeholder operand for a not-yet-patched forward jump.
const UNPATCHED_JUMP: i32 = i32::MIN;

/// The append-only instruction buffer for one compilation unit.
#[derive(Debug, Default)]
pub struct BytecodeSection {
    /// Encoded instructions.
    code: Vec<u8>,
    /// Operand stack depth after the last emitted instruction.
    stack_depth: i32,
    /// High-water mark of the operand stack.
    max_stack_depth: u32,
}

impl BytecodeSection {
    /// Creates an empty section.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current end of the buffer; the offset the next instruction gets.
    pub fn offset(&self) -> BytecodeOffset {
        BytecodeOffset(self.code.len() as u32)
    }

    /// The encoded bytes emitted so far.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Operand stack depth after the last emitted instruction.
    pub fn stack_depth(&self) -> i32 {
        self.stack_depth
    }

    /// Overrides the tracked stack depth.
    ///
    /// Needed where control-flow edges reaching the next instruction carry a
    /// different depth than the fall-through path, e.g. the break target of
    /// a for-in loop, where the iteration value is still on the stack.
    pub fn set_stack_depth(&mut self, depth: i32) {
        assert!(depth >= 0, "stack depth must not go negative");
        self.stack_depth = depth;
        self.max_stack_depth = self.max_stack_depth.max(depth as u32);
    }

    /// High-water mark of the operand stack.
    pub fn max_stack_depth(&self) -> u32 {
        self.max_stack_depth
    }

    fn check_length(&self, additional: usize) -> Result<(), Error> {
        if self.code.len() + additional > MAX_BYTECODE_LENGTH as usize {
            return Err(Error::TooMuchCode);
        }
        Ok(())
    }

    fn update_depth(&mut self, op: Opcode) {
        let after = self.stack_depth - op.uses() as i32;
        assert!(after >= 0, "{} underflows the operand stack", op.name());
        self.set_stack_depth(after + op.defs() as i32);
    }

    /// Emits an instruction with no operand.
    pub fn emit1(&mut self, op: Opcode) -> Result<(), Error> {
        assert_eq!(op.operand_len(), 0, "{} takes an operand", op.name());
        self.check_length(1)?;
        self.code.push(op as u8);
        self.update_depth(op);
        Ok(())
    }

    /// Emits an instruction with a 4-byte immediate operand.
    pub fn emit_with_operand(&mut self, op: Opcode, operand: u32) -> Result<(), Error> {
        assert_eq!(op.operand_len(), 4, "{} takes no operand", op.name());
        assert!(!op.is_jump(), "jumps go through emit_jump_placeholder");
        self.check_length(op.len())?;
        self.code.push(op as u8);
        self.code.extend_from_slice(&operand.to_le_bytes());
        self.update_depth(op);
        Ok(())
    }

    /// Emits a forward jump with a placeholder operand and returns the
    /// offset of the jump instruction, to be patched later.
    pub fn emit_jump_placeholder(&mut self, op: Opcode) -> Result<BytecodeOffset, Error> {
        assert!(op.is_jump(), "{} is not a jump", op.name());
        self.check_length(op.len())?;
        let offset = self.offset();
        self.code.push(op as u8);
        self.code.extend_from_slice(&UNPATCHED_JUMP.to_le_bytes());
        self.update_depth(op);
        Ok(offset)
    }

    /// Emits a jump whose target is already known (a backward jump).
    pub fn emit_backward_jump(
        &mut self,
        op: Opcode,
        target: BytecodeOffset,
    ) -> Result<BytecodeOffset, Error> {
        assert!(op.is_jump(), "{} is not a jump", op.name());
        self.check_length(op.len())?;
        let offset = self.offset();
        assert!(target <= offset, "backward jump to a later offset");
        let rel = target.0 as i64 - offset.0 as i64;
        self.code.push(op as u8);
        self.code.extend_from_slice(&(rel as i32).to_le_bytes());
        self.update_depth(op);
        Ok(offset)
    }

    /// Patches the forward jump at `jump` to land on `target`.
    ///
    /// Each jump is patched exactly once; patching a site that does not hold
    /// the placeholder operand is a compiler defect.
    pub fn patch_jump(&mut self, jump: BytecodeOffset, target: BytecodeOffset) {
        let op = Opcode::from_u8(self.code[jump.0 as usize]).expect("patching garbage");
        assert!(op.is_jump(), "patch target is not a jump instruction");
        let operand_at = jump.0 as usize + 1;
        let old = i32::from_le_bytes(
            self.code[operand_at..operand_at + 4]
                .try_into()
                .expect("truncated jump operand"),
        );
        assert_eq!(old, UNPATCHED_JUMP, "jump patched twice");
        assert!(target.0 <= self.code.len() as u32, "jump target out of range");
        let rel = target.0 as i64 - jump.0 as i64;
        self.code[operand_at..operand_at + 4].copy_from_slice(&(rel as i32).to_le_bytes());
    }

    /// Decodes the jump at `jump` and returns its absolute target.
    pub fn jump_target(&self, jump: BytecodeOffset) -> BytecodeOffset {
        let operand_at = jump.0 as usize + 1;
        let rel = i32::from_le_bytes(
            self.code[operand_at..operand_at + 4]
                .try_into()
                .expect("truncated jump operand"),
        );
        assert_ne!(rel, UNPATCHED_JUMP, "jump never patched");
        BytecodeOffset((jump.0 as i64 + rel as i64) as u32)
    }

    /// Iterates over `(offset, opcode)` pairs of the emitted instructions.
    pub fn iter_opcodes(&self) -> OpcodeIter<'_> {
        OpcodeIter {
            code: &self.code,
            at: 0,
        }
    }
}

/// Iterator over the instructions in a section.
#[derive(Debug)]
pub struct OpcodeIter<'a> {
    code: &'a [u8],
    at: usize,
}

impl Iterator for OpcodeIter<'_> {
    type Item = (BytecodeOffset, Opcode);

    fn next(&mut self) -> Option<Self::Item> {
        if self.at >= self.code.len() {
            return None;
        }
        let offset = BytecodeOffset(self.at as u32);
        let op = Opcode::from_u8(self.code[self.at]).expect("garbage in bytecode section");
        self.at += op.len();
        Some((offset, op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_advance_by_instruction_length() {
        let mut section = BytecodeSection::new();
        section.emit1(Opcode::Nop).unwrap();
        assert_eq!(section.offset().value(), 1);
        section.emit1(Opcode::True).unwrap();
        assert_eq!(section.offset().value(), 2);
        section.emit_jump_placeholder(Opcode::IfEq).unwrap();
        assert_eq!(section.offset().value(), 7);
    }

    #[test]
    fn test_stack_depth_tracking() {
        let mut section = BytecodeSection::new();
        section.emit1(Opcode::True).unwrap();
        section.emit1(Opcode::Dup).unwrap();
        assert_eq!(section.stack_depth(), 2);
        section.emit1(Opcode::Pop).unwrap();
        section.emit1(Opcode::Pop).unwrap();
        assert_eq!(section.stack_depth(), 0);
        assert_eq!(section.max_stack_depth(), 2);
    }

    #[test]
    #[should_panic(expected = "underflows")]
    fn test_stack_underflow_panics() {
        let mut section = BytecodeSection::new();
        section.emit1(Opcode::Pop).unwrap();
    }

    #[test]
    fn test_forward_jump_patch_round_trip() {
        let mut section = BytecodeSection::new();
        section.emit1(Opcode::True).unwrap();
        let jump = section.emit_jump_placeholder(Opcode::IfEq).unwrap();
        section.emit1(Opcode::Nop).unwrap();
        let target = section.offset();
        section.patch_jump(jump, target);
        assert_eq!(section.jump_target(jump), target);
    }

    #[test]
    #[should_panic(expected = "patched twice")]
    fn test_double_patch_panics() {
        let mut section = BytecodeSection::new();
        section.emit1(Opcode::True).unwrap();
        let jump = section.emit_jump_placeholder(Opcode::IfEq).unwrap();
        let target = section.offset();
        section.patch_jump(jump, target);
        section.patch_jump(jump, target);
    }

    #[test]
    fn test_backward_jump_encodes_negative_offset() {
        let mut section = BytecodeSection::new();
        let head = section.offset();
        section.emit1(Opcode::LoopHead).unwrap();
        section.emit1(Opcode::Nop).unwrap();
        let jump = section.emit_backward_jump(Opcode::Goto, head).unwrap();
        assert_eq!(section.jump_target(jump), head);
    }

    #[test]
    fn test_iter_opcodes_walks_operands() {
        let mut section = BytecodeSection::new();
        section.emit1(Opcode::True).unwrap();
        let jump = section.emit_jump_placeholder(Opcode::IfEq).unwrap();
        section.emit1(Opcode::Nop).unwrap();
        section.patch_jump(jump, section.offset());
        let ops: Vec<Opcode> = section.iter_opcodes().map(|(_, op)| op).collect();
        assert_eq!(ops, vec![Opcode::True, Opcode::IfEq, Opcode::Nop]);
    }
}
