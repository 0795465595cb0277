//! Opcode definitions.
//!
//! Only the slice of the VM's opcode vocabulary that loop emission needs is
//! defined here; the full set lives with the interpreter. Every opcode
//! carries enough metadata (operand length, stack uses/defs) for the
//! bytecode section to keep its offset cursor and tracked stack depth
//! correct without knowing what the VM will do with the instruction.

/// Operation codes for the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// No operation. Also used as a breakpoint anchor for `do` and
    /// single-line `while`.
    Nop,
    /// Marks the entry of a loop; target of every backward jump.
    LoopHead,
    /// Unconditional jump. 4-byte signed relative operand.
    Goto,
    /// Pop the top value, jump if it was false. 4-byte signed relative
    /// operand.
    IfEq,
    /// Pop the top value, jump if it was true. 4-byte signed relative
    /// operand.
    IfNe,
    /// Pop the top value.
    Pop,
    /// Duplicate the top value.
    Dup,
    /// Push true.
    True,
    /// Push false.
    False,
    /// Push undefined.
    Undefined,

    // Enumeration (for-in)
    /// Replace the top object with a property iterator over it.
    Iter,
    /// Advance the iterator, pushing the next property key (or a sentinel
    /// when exhausted) above it.
    MoreIter,
    /// Push whether the value above the iterator is the exhaustion
    /// sentinel.
    IsNoIter,
    /// Materialize the current iteration value in place.
    IterNext,
    /// Close and pop the iterator on top of the stack.
    EndIter,

    // Iteration (for-of)
    /// Replace the top object with its iterator's next method and the
    /// iterator itself.
    GetIter,
    /// Call the next method, pushing the step value and a done flag.
    NextIter,

    // Lexical environment maintenance
    /// Push the uninitialized magic value.
    Uninitialized,
    /// Initialize the lexical binding in the given frame slot from the top
    /// of the stack. 4-byte slot operand.
    InitLexical,
    /// Replace the innermost lexical environment with a fresh copy, so
    /// closures capture per-iteration bindings.
    RecreateLexicalEnv,
}

/// Every opcode in discriminant order, for decoding raw bytes.
const ALL_OPCODES: [Opcode; 20] = [
    Opcode::Nop,
    Opcode::LoopHead,
    Opcode::Goto,
    Opcode::IfEq,
    Opcode::IfNe,
    Opcode::Pop,
    Opcode::Dup,
    Opcode::True,
    Opcode::False,
    Opcode::Undefined,
    Opcode::Iter,
    Opcode::MoreIter,
    Opcode::IsNoIter,
    Opcode::IterNext,
    Opcode::EndIter,
    Opcode::GetIter,
    Opcode::NextIter,
    Opcode::Uninitialized,
    Opcode::InitLexical,
    Opcode::RecreateLexicalEnv,
];

impl Opcode {
    /// Length in bytes of the operand following this opcode (zero for most).
    pub fn operand_len(self) -> usize {
        match self {
            Opcode::Goto | Opcode::IfEq | Opcode::IfNe => 4,
            Opcode::InitLexical => 4,
            _ => 0,
        }
    }

    /// Total encoded length of an instruction with this opcode.
    pub fn len(self) -> usize {
        1 + self.operand_len()
    }

    /// Number of stack values this opcode consumes.
    pub fn uses(self) -> u32 {
        match self {
            Opcode::Nop
            | Opcode::LoopHead
            | Opcode::Goto
            | Opcode::True
            | Opcode::False
            | Opcode::Undefined
            | Opcode::Uninitialized
            | Opcode::RecreateLexicalEnv => 0,
            Opcode::IfEq
            | Opcode::IfNe
            | Opcode::Pop
            | Opcode::Dup
            | Opcode::Iter
            | Opcode::MoreIter
            | Opcode::IsNoIter
            | Opcode::IterNext
            | Opcode::EndIter
            | Opcode::GetIter
            | Opcode::InitLexical => 1,
            Opcode::NextIter => 2,
        }
    }

    /// Number of stack values this opcode pushes.
    pub fn defs(self) -> u32 {
        match self {
            Opcode::Nop
            | Opcode::LoopHead
            | Opcode::Goto
            | Opcode::IfEq
            | Opcode::IfNe
            | Opcode::Pop
            | Opcode::EndIter
            | Opcode::RecreateLexicalEnv => 0,
            Opcode::True
            | Opcode::False
            | Opcode::Undefined
            | Opcode::Uninitialized
            | Opcode::Iter
            | Opcode::IterNext
            | Opcode::InitLexical => 1,
            Opcode::Dup | Opcode::MoreIter | Opcode::IsNoIter | Opcode::GetIter => 2,
            Opcode::NextIter => 4,
        }
    }

    /// Decodes a raw opcode byte.
    pub fn from_u8(byte: u8) -> Option<Opcode> {
        const LAST: u8 = Opcode::RecreateLexicalEnv as u8;
        match byte {
            0..=LAST => Some(ALL_OPCODES[byte as usize]),
            _ => None,
        }
    }

    /// Whether this opcode's operand is a jump target.
    pub fn is_jump(self) -> bool {
        matches!(self, Opcode::Goto | Opcode::IfEq | Opcode::IfNe)
    }

    /// Name used by the disassembler and in test output.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::LoopHead => "loophead",
            Opcode::Goto => "goto",
            Opcode::IfEq => "ifeq",
            Opcode::IfNe => "ifne",
            Opcode::Pop => "pop",
            Opcode::Dup => "dup",
            Opcode::True => "true",
            Opcode::False => "false",
            Opcode::Undefined => "undefined",
            Opcode::Iter => "iter",
            Opcode::MoreIter => "moreiter",
            Opcode::IsNoIter => "isnoiter",
            Opcode::IterNext => "iternext",
            Opcode::EndIter => "enditer",
            Opcode::GetIter => "getiter",
            Opcode::NextIter => "nextiter",
            Opcode::Uninitialized => "uninitialized",
            Opcode::InitLexical => "initlexical",
            Opcode::RecreateLexicalEnv => "recreatelexicalenv",
        }
    }
}
