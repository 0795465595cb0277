//! The exception-unwind region table.
//!
//! Each try-note brackets a bytecode range whose resources must be cleaned
//! up when an exception or abrupt completion crosses it. The VM's exception
//! dispatcher walks this table to find cleanup work; emission only ever
//! appends.

use crate::bytecode::section::BytecodeOffset;

/// What the VM must do when unwinding through a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryNoteKind {
    /// A `while`/`do-while`/`for` body: unwind the operand stack to the
    /// recorded depth, nothing else to close.
    Loop,
    /// A `for-in` body: additionally pop and close the in-flight property
    /// iterator.
    ForIn,
    /// A `for-of` body: additionally close the iterator via its return
    /// protocol.
    ForOf,
}

/// One unwind region. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryNote {
    /// Cleanup semantics for the region.
    pub kind: TryNoteKind,
    /// Operand stack depth at region entry.
    pub stack_depth: u32,
    /// First bytecode offset covered.
    pub start: BytecodeOffset,
    /// One past the last bytecode offset covered.
    pub end: BytecodeOffset,
}

/// Append-only list of unwind regions for one compilation unit.
#[derive(Debug, Default)]
pub struct TryNoteList {
    notes: Vec<TryNote>,
}

impl TryNoteList {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a region. Regions must be well nested: lexical loop nesting
    /// means an inner loop's region is recorded before its enclosing loop's,
    /// and lies entirely inside it or entirely outside it.
    pub fn append(&mut self, note: TryNote) {
        assert!(note.start < note.end, "empty or inverted unwind region");
        for prev in &self.notes {
            let nested = note.start <= prev.start && prev.end <= note.end;
            let disjoint = prev.end <= note.start || note.end <= prev.start;
            assert!(
                nested || disjoint,
                "unwind regions must be strictly nested or disjoint"
            );
        }
        self.notes.push(note);
    }

    /// The recorded regions, in emission order.
    pub fn notes(&self) -> &[TryNote] {
        &self.notes
    }

    /// Number of recorded regions.
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    /// Consumes the table, yielding the notes in emission order.
    pub fn into_notes(self) -> Vec<TryNote> {
        self.notes
    }

    /// Whether any regions have been recorded.
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Innermost region covering `offset`, if any: the last-appended match
    /// is the innermost only among nested regions, so scan for the
    /// narrowest.
    pub fn find_innermost(&self, offset: BytecodeOffset) -> Option<&TryNote> {
        self.notes
            .iter()
            .filter(|n| n.start <= offset && offset < n.end)
            .min_by_key(|n| n.end.value() - n.start.value())
    }
}
