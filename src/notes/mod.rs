//! Source notes: the debugger/decompiler side channel.
//!
//! Source notes are generated along with bytecode and map bytecode offsets
//! back to source positions and line-stepping hints. A note is one byte with
//! 5 bits of type and 3 bits of bytecode-offset delta from the previous
//! note. When 3 bits of delta aren't enough, extended-delta bytes (top two
//! bits set, low 6 bits of partial delta) are chained in front of the note.
//! Some note types carry offset operands immediately after the note byte,
//! frequency-encoded: values in `[0, 0x7f]` take one byte, larger values
//! take four with the high bit of the first byte set.
//!
//! ```text
//!     Source Note               Extended Delta
//!  +7-6-5-4-3+2-1-0+           +7-6+5-4-3-2-1-0+
//!  |note-type|delta|           |1 1| ext-delta |
//!  +---------+-----+           +---+-----------+
//! ```
//!
//! The stream is terminated by a single all-zero byte. At most one
//! "gettable" note (a type other than the line/column bookkeeping notes)
//! applies to a given bytecode offset.

use crate::Error;
use crate::bytecode::section::BytecodeOffset;

/// Bits of note type in a note byte.
const TYPE_BITS: u32 = 5;
/// Bits of offset delta in a note byte.
const DELTA_BITS: u32 = 3;
/// Bits of offset delta in an extended-delta byte.
const XDELTA_BITS: u32 = 6;

/// Largest delta a plain note byte can carry, exclusive.
const DELTA_LIMIT: u32 = 1 << DELTA_BITS;
const DELTA_MASK: u8 = (DELTA_LIMIT - 1) as u8;
const XDELTA_MASK: u8 = ((1u32 << XDELTA_BITS) - 1) as u8;

/// Marker bit on the first byte of a 4-byte operand.
const FOUR_BYTE_OFFSET_FLAG: u8 = 0x80;

/// Bits in a note offset operand.
pub const OFFSET_BITS: u32 = 31;
/// Largest representable note operand.
pub const MAX_OFFSET: u32 = (1 << OFFSET_BITS) - 1;

const COLSPAN_SIGN_BIT: i64 = 1 << (OFFSET_BITS - 1);
/// Most negative representable column span.
pub const MIN_COLSPAN: i32 = -(COLSPAN_SIGN_BIT as i32);
/// Most positive representable column span.
pub const MAX_COLSPAN: i32 = COLSPAN_SIGN_BIT as i32 - 1;

/// Source note types.
///
/// Types `24..=31` of the 5-bit space are reserved for extended-delta
/// bytes, which is why `XDelta` sits at 24.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SrcNoteType {
    /// Terminates a note vector.
    Null = 0,
    /// The loop head belongs to a C-style `for` loop.
    For = 1,
    /// The loop head belongs to a `while` loop.
    While = 2,
    /// The loop head belongs to a `do-while` loop.
    DoWhile = 3,
    /// The loop head belongs to a `for-in` loop.
    ForIn = 4,
    /// The loop head belongs to a `for-of` loop.
    ForOf = 5,
    /// A compound assignment operator follows.
    AssignOp = 6,
    /// Starting and ending source offsets of a class body. Two operands.
    ClassSpan = 7,
    /// Marks the try instruction of a try block; the operand is the offset
    /// of the jump at the end of the block. Last gettable type.
    Try = 8,
    /// Signed change to the current column. One operand, stored truncated.
    ColSpan = 9,
    /// The bytecode at this offset follows a source newline.
    Newline = 10,
    /// Sets the absolute source line of the bytecode. One operand.
    SetLine = 11,
    /// The bytecode is a recommended breakpoint.
    Breakpoint = 12,
    /// The bytecode starts a new steppable area.
    StepSep = 13,
    /// Extended delta carrier; never appears as a decoded note type.
    XDelta = 24,
}

impl SrcNoteType {
    /// Decodes a 5-bit type value; types `24..=31` all decode as `XDelta`.
    pub fn from_u8(value: u8) -> Option<SrcNoteType> {
        match value {
            0 => Some(SrcNoteType::Null),
            1 => Some(SrcNoteType::For),
            2 => Some(SrcNoteType::While),
            3 => Some(SrcNoteType::DoWhile),
            4 => Some(SrcNoteType::ForIn),
            5 => Some(SrcNoteType::ForOf),
            6 => Some(SrcNoteType::AssignOp),
            7 => Some(SrcNoteType::ClassSpan),
            8 => Some(SrcNoteType::Try),
            9 => Some(SrcNoteType::ColSpan),
            10 => Some(SrcNoteType::Newline),
            11 => Some(SrcNoteType::SetLine),
            12 => Some(SrcNoteType::Breakpoint),
            13 => Some(SrcNoteType::StepSep),
            24..=31 => Some(SrcNoteType::XDelta),
            _ => None,
        }
    }

    /// Name for disassembly and debugging output.
    pub fn name(self) -> &'static str {
        match self {
            SrcNoteType::Null => "null",
            SrcNoteType::For => "for",
            SrcNoteType::While => "while",
            SrcNoteType::DoWhile => "do-while",
            SrcNoteType::ForIn => "for-in",
            SrcNoteType::ForOf => "for-of",
            SrcNoteType::AssignOp => "assignop",
            SrcNoteType::ClassSpan => "class",
            SrcNoteType::Try => "try",
            SrcNoteType::ColSpan => "colspan",
            SrcNoteType::Newline => "newline",
            SrcNoteType::SetLine => "setline",
            SrcNoteType::Breakpoint => "breakpoint",
            SrcNoteType::StepSep => "step-sep",
            SrcNoteType::XDelta => "xdelta",
        }
    }

    /// Number of offset operands following the note byte.
    pub fn arity(self) -> usize {
        match self {
            SrcNoteType::ClassSpan => 2,
            SrcNoteType::Try | SrcNoteType::ColSpan | SrcNoteType::SetLine => 1,
            _ => 0,
        }
    }

    /// Whether a debugger query for "the note at this offset" should return
    /// this note type. Line/column bookkeeping notes are not gettable.
    pub fn is_gettable(self) -> bool {
        (self as u8) <= (SrcNoteType::Try as u8)
    }
}

/// Truncates a signed column span to the 31-bit operand field.
pub fn colspan_to_offset(colspan: i32) -> u32 {
    assert!(
        (MIN_COLSPAN..=MAX_COLSPAN).contains(&colspan),
        "column span not representable in a source note"
    );
    (colspan as u32) & MAX_OFFSET
}

/// Sign-extends a 31-bit operand field back into a column span.
pub fn offset_to_colspan(offset: u32) -> i32 {
    assert!(offset <= MAX_OFFSET, "operand has bits outside the field");
    ((offset as i64 ^ COLSPAN_SIGN_BIT) - COLSPAN_SIGN_BIT) as i32
}

/// Cap on the encoded note stream length.
const MAX_NOTES_LENGTH: usize = MAX_OFFSET as usize;

/// Append-only encoder for the source-note stream.
#[derive(Debug, Default)]
pub struct SrcNoteWriter {
    notes: Vec<u8>,
    /// Bytecode offset of the most recently written note.
    last_note_offset: u32,
}

impl SrcNoteWriter {
    /// Creates an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytecode offset the next note's delta will be computed against.
    pub fn last_note_offset(&self) -> BytecodeOffset {
        BytecodeOffset::new(self.last_note_offset)
    }

    /// Encoded bytes so far, without the terminator.
    pub fn bytes(&self) -> &[u8] {
        &self.notes
    }

    fn push(&mut self, byte: u8) -> Result<(), Error> {
        if self.notes.len() >= MAX_NOTES_LENGTH {
            return Err(Error::TooManyNotes);
        }
        self.notes.push(byte);
        Ok(())
    }

    /// Appends a note of type `ty` attached to the bytecode at `offset`,
    /// with exactly `ty.arity()` operands.
    ///
    /// Notes must be written in nondecreasing bytecode-offset order; the
    /// gap since the previous note is delta-encoded, chaining extended-delta
    /// bytes for gaps of eight or more.
    pub fn new_note(
        &mut self,
        ty: SrcNoteType,
        offset: BytecodeOffset,
        operands: &[u32],
    ) -> Result<(), Error> {
        assert!(
            !matches!(ty, SrcNoteType::Null | SrcNoteType::XDelta),
            "{} notes are encoding artifacts, not writable notes",
            ty.name()
        );
        assert_eq!(operands.len(), ty.arity(), "wrong operand count for {}", ty.name());
        assert!(
            offset.value() >= self.last_note_offset,
            "source notes must be appended in bytecode order"
        );

        let mut delta = offset.value() - self.last_note_offset;
        while delta >= DELTA_LIMIT {
            let chunk = delta.min(XDELTA_MASK as u32);
            let sym = SrcNoteType::XDelta as u8;
            self.push((sym << DELTA_BITS) | (chunk as u8 & XDELTA_MASK))?;
            delta -= chunk;
        }
        self.push(((ty as u8) << DELTA_BITS) | (delta as u8 & DELTA_MASK))?;

        for &operand in operands {
            self.write_operand(operand)?;
        }
        self.last_note_offset = offset.value();
        Ok(())
    }

    fn write_operand(&mut self, value: u32) -> Result<(), Error> {
        assert!(value <= MAX_OFFSET, "note operand exceeds the 31-bit field");
        if value <= 0x7f {
            self.push(value as u8)
        } else {
            self.push(FOUR_BYTE_OFFSET_FLAG | (value >> 24) as u8)?;
            self.push((value >> 16) as u8)?;
            self.push((value >> 8) as u8)?;
            self.push(value as u8)
        }
    }

    /// Terminates the stream and returns the encoded bytes.
    pub fn finish(mut self) -> Result<Vec<u8>, Error> {
        self.push(SrcNoteType::Null as u8)?;
        Ok(self.notes)
    }
}

/// A decoded source note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcNote {
    /// The note type.
    pub ty: SrcNoteType,
    /// Absolute bytecode offset the note applies to.
    pub offset: BytecodeOffset,
    /// Decoded offset operands, `ty.arity()` of them.
    pub operands: Vec<u32>,
}

/// Decoder over an encoded note stream.
#[derive(Debug)]
pub struct SrcNoteReader<'a> {
    bytes: &'a [u8],
    at: usize,
    offset: u32,
}

impl<'a> SrcNoteReader<'a> {
    /// Creates a reader over `bytes`, which must be a terminated stream.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            at: 0,
            offset: 0,
        }
    }

    fn read_operand(&mut self) -> u32 {
        let first = self.bytes[self.at];
        self.at += 1;
        if first & FOUR_BYTE_OFFSET_FLAG == 0 {
            return first as u32;
        }
        let mut value = (first & !FOUR_BYTE_OFFSET_FLAG) as u32;
        for _ in 0..3 {
            value = (value << 8) | self.bytes[self.at] as u32;
            self.at += 1;
        }
        value
    }
}

impl Iterator for SrcNoteReader<'_> {
    type Item = SrcNote;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let byte = *self.bytes.get(self.at)?;
            let ty = SrcNoteType::from_u8(byte >> DELTA_BITS)
                .expect("unused source note type in stream");
            if ty == SrcNoteType::Null {
                return None;
            }
            self.at += 1;
            if ty == SrcNoteType::XDelta {
                self.offset += (byte & XDELTA_MASK) as u32;
                continue;
            }
            self.offset += (byte & DELTA_MASK) as u32;
            let operands = (0..ty.arity()).map(|_| self.read_operand()).collect();
            return Some(SrcNote {
                ty,
                offset: BytecodeOffset::new(self.offset),
                operands,
            });
        }
    }
}
