//! Lexical-scope descriptors and the TDZ check cache guard.

use rustc_hash::FxHashMap;

use crate::Error;
use crate::bytecode::opcode::Opcode;
use crate::emitter::BytecodeEmitter;

/// A block of lexical bindings declared in a loop head or body.
///
/// Records each binding's frame slot and whether the block needs a runtime
/// environment object (because some binding is captured by a closure).
#[derive(Debug, Default)]
pub struct LexicalScope {
    bindings: FxHashMap<String, u32>,
    has_environment: bool,
}

impl LexicalScope {
    /// Creates an empty scope.
    pub fn new(has_environment: bool) -> Self {
        Self {
            bindings: FxHashMap::default(),
            has_environment,
        }
    }

    /// Declares a binding at the given frame slot.
    pub fn declare(&mut self, name: &str, slot: u32) {
        let prev = self.bindings.insert(name.to_owned(), slot);
        assert!(prev.is_none(), "binding redeclared in the same lexical scope");
    }

    /// Whether this scope carries a runtime environment object.
    pub fn has_environment(&self) -> bool {
        self.has_environment
    }

    /// Frame slot of a binding, if declared here.
    pub fn slot_of(&self, name: &str) -> Option<u32> {
        self.bindings.get(name).copied()
    }

    /// Number of bindings declared in this scope.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the scope declares no bindings.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Re-poisons every frame slot of this scope with the sentinel that
    /// makes reads-before-initialization throw.
    ///
    /// Slots are processed in slot order so emission is deterministic.
    pub fn dead_zone_frame_slots(&self, bce: &mut BytecodeEmitter) -> Result<(), Error> {
        let mut slots: Vec<u32> = self.bindings.values().copied().collect();
        slots.sort_unstable();
        for slot in slots {
            bce.emit1(Opcode::Uninitialized)?;
            bce.emit_with_operand(Opcode::InitLexical, slot)?;
            bce.emit1(Opcode::Pop)?;
        }
        Ok(())
    }
}

/// Guard for one level of the emitter's TDZ check cache.
///
/// The cache memoizes which bindings are known to be initialized; any
/// control-flow merge point invalidates it, so loop emitters open a fresh
/// level around each body and close it when the body ends. Levels must
/// close in LIFO order and every opened level must be closed; both are
/// checked fatally.
#[derive(Debug)]
pub struct TdzCheckCache {
    index: usize,
}

impl TdzCheckCache {
    /// Opens a new cache level on the emitter.
    pub fn open(bce: &mut BytecodeEmitter) -> Self {
        Self {
            index: bce.push_tdz_cache(),
        }
    }

    /// Closes this level. Must be the innermost open level.
    pub fn close(self, bce: &mut BytecodeEmitter) {
        bce.pop_tdz_cache(self.index);
    }
}
