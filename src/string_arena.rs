//! The VM's string arena (C5): a bump allocator over a fixed-size byte
//! buffer, used for every string the VM produces at runtime (string
//! operations, node construction, `TO_STRING`).

use log::warn;

use crate::error::{VmError, VmResult};
use crate::value::{StringRef, StringStore};

/// A bump allocator over a fixed-capacity byte buffer.
///
/// Strings are appended and never mutated or freed individually; the whole
/// arena is cleared at once by [`StringArena::reset`], which invalidates
/// every [`StringRef`] that pointed into it (this is the monotonic-growth
/// invariant from §3: once reset, all prior pointers are invalid).
#[derive(Debug, Clone)]
pub struct StringArena {
    bytes: Vec<u8>,
    capacity: usize,
}

impl StringArena {
    /// Creates an empty arena with the given byte capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Copies `data` into the arena, returning a reference to it.
    ///
    /// Fails with [`VmError::StringOverflow`] if the arena's fixed capacity
    /// would be exceeded; the arena is left unmodified on failure.
    pub fn alloc(&mut self, data: &[u8]) -> VmResult<StringRef> {
        if self.bytes.len() + data.len() > self.capacity {
            return Err(VmError::StringOverflow {
                capacity: self.capacity,
            });
        }
        if self.capacity > 0 && (self.bytes.len() + data.len()) * 10 >= self.capacity * 9 {
            warn!(
                "string arena at {}/{} bytes",
                self.bytes.len() + data.len(),
                self.capacity
            );
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(data);
        Ok(StringRef::new(StringStore::Arena, offset, data.len() as u32))
    }

    /// Reads back the bytes a reference points to. Panics if `reference`
    /// does not point into this arena or is out of range — callers must
    /// only pass references this arena produced since the last reset.
    pub fn read(&self, reference: StringRef) -> &[u8] {
        debug_assert_eq!(reference.store(), StringStore::Arena);
        let start = reference.offset() as usize;
        let end = start + reference.len() as usize;
        &self.bytes[start..end]
    }

    /// Clears the high-water mark, discarding all allocated strings.
    pub fn reset(&mut self) {
        self.bytes.clear();
    }

    /// Current number of bytes allocated.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the arena holds no strings.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The fixed capacity this arena was constructed with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_read_round_trips() {
        let mut arena = StringArena::new(64);
        let r = arena.alloc(b"hello").unwrap();
        assert_eq!(arena.read(r), b"hello");
    }

    #[test]
    fn overflow_is_rejected_and_leaves_arena_unchanged() {
        let mut arena = StringArena::new(4);
        assert!(arena.alloc(b"hello").is_err());
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn reset_invalidates_high_water_mark() {
        let mut arena = StringArena::new(64);
        arena.alloc(b"abc").unwrap();
        arena.reset();
        assert_eq!(arena.len(), 0);
        let r = arena.alloc(b"xyz").unwrap();
        assert_eq!(r.offset(), 0);
    }

    #[test]
    fn monotonic_growth_within_one_run() {
        let mut arena = StringArena::new(64);
        let first = arena.alloc(b"ab").unwrap();
        let second = arena.alloc(b"cd").unwrap();
        assert_eq!(first.offset(), 0);
        assert_eq!(second.offset(), 2);
    }
}
