//! The VM's node heap (C6): an append-only store of composite, AST-like
//! values used for the `MAKE_*`/`NODE_*`/`ATTR_*`/`CHILD_*` opcode family.
//!
//! A node never mutates in place. `APPEND_CHILD` and friends always create
//! a *new* node record that shares no heap structure with its inputs other
//! than immutable, already-written slices — this keeps handles stable for
//! the life of a run and makes node equality a cheap handle comparison.

use log::warn;

use crate::error::{VmError, VmResult};
use crate::string_arena::StringArena;
use crate::value::{NodeHandle, StringRef};

/// The kind of an attribute's value, matching the closed set from §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum AttrKind {
    /// An unquoted identifier, stored like a string but tagged separately.
    Identifier,
    /// A string value.
    String,
    /// An integer value.
    Int,
    /// A boolean value.
    Bool,
}

/// An attribute value paired with its kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum AttrValue {
    /// An identifier or string payload, already copied into the arena.
    Text(StringRef),
    /// An integer payload.
    Int(i64),
    /// A boolean payload.
    Bool(bool),
}

/// One `{ key, kind, value }` attribute record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct AttrRecord {
    key: StringRef,
    kind: AttrKind,
    value: AttrValue,
}

impl AttrRecord {
    /// The attribute's key.
    pub fn key(&self) -> StringRef {
        self.key
    }

    /// The attribute's kind tag.
    pub fn kind(&self) -> AttrKind {
        self.kind
    }

    /// The attribute's value.
    pub fn value(&self) -> AttrValue {
        self.value
    }
}

/// An attribute as supplied by a caller constructing a node: strings are
/// plain `&str` here and get copied into the arena by [`NodeHeap::create`].
#[derive(Debug, Clone, Copy)]
pub enum AttrInput<'a> {
    /// An identifier attribute.
    Identifier(&'a str, &'a str),
    /// A string attribute.
    String(&'a str, &'a str),
    /// An integer attribute.
    Int(&'a str, i64),
    /// A boolean attribute.
    Bool(&'a str, bool),
}

/// A fully-materialized node record: a kind, an id, and slices into the
/// heap's shared attribute and child-handle vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeRecord {
    kind: StringRef,
    id: StringRef,
    attrs_start: u32,
    attrs_len: u32,
    children_start: u32,
    children_len: u32,
}

impl NodeRecord {
    /// The node's kind string reference.
    pub fn kind(&self) -> StringRef {
        self.kind
    }

    /// The node's id string reference.
    pub fn id(&self) -> StringRef {
        self.id
    }
}

/// The append-only node heap: three parallel vectors (node records,
/// attribute records, child handles) plus the capacities from [`crate::limits::Limits`].
#[derive(Debug, Clone)]
pub struct NodeHeap {
    nodes: Vec<NodeRecord>,
    attrs: Vec<AttrRecord>,
    children: Vec<NodeHandle>,
    node_capacity: usize,
    attrs_capacity: usize,
    children_capacity: usize,
}

impl NodeHeap {
    /// Creates an empty heap with the given capacities.
    pub fn new(node_capacity: usize, attrs_capacity: usize, children_capacity: usize) -> Self {
        Self {
            nodes: Vec::new(),
            attrs: Vec::new(),
            children: Vec::new(),
            node_capacity,
            attrs_capacity,
            children_capacity,
        }
    }

    /// Clears the heap entirely (part of `reset_state`, §3).
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.attrs.clear();
        self.children.clear();
    }

    /// Number of live node records.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the heap holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Creates a new node, copying `kind`, `id`, and every attribute/child
    /// string into `arena`. Returns the new 1-based handle.
    ///
    /// Every string copy must succeed or this call fails as a whole with
    /// the propagated [`VmError::StringOverflow`] — the reference
    /// implementation's `create_node_record` silently drops a failed copy,
    /// which this port treats as a defect to fix rather than emulate (see
    /// DESIGN.md).
    pub fn create(
        &mut self,
        arena: &mut StringArena,
        kind: &str,
        id: &str,
        attrs: &[AttrInput<'_>],
        children: &[NodeHandle],
    ) -> VmResult<NodeHandle> {
        if self.nodes.len() >= self.node_capacity {
            return Err(VmError::invalid_program(format!(
                "node heap exhausted: capacity {} exceeded",
                self.node_capacity
            )));
        }
        if self.node_capacity > 0 && (self.nodes.len() + 1) * 10 >= self.node_capacity * 9 {
            warn!("node heap at {}/{} records", self.nodes.len() + 1, self.node_capacity);
        }
        if self.attrs.len() + attrs.len() > self.attrs_capacity {
            return Err(VmError::invalid_program(format!(
                "node attribute heap exhausted: capacity {} exceeded",
                self.attrs_capacity
            )));
        }
        if self.children.len() + children.len() > self.children_capacity {
            return Err(VmError::invalid_program(format!(
                "node child heap exhausted: capacity {} exceeded",
                self.children_capacity
            )));
        }

        let kind_ref = arena.alloc(kind.as_bytes())?;
        let id_ref = arena.alloc(id.as_bytes())?;

        let attrs_start = self.attrs.len() as u32;
        for attr in attrs {
            let record = match *attr {
                AttrInput::Identifier(key, value) => AttrRecord {
                    key: arena.alloc(key.as_bytes())?,
                    kind: AttrKind::Identifier,
                    value: AttrValue::Text(arena.alloc(value.as_bytes())?),
                },
                AttrInput::String(key, value) => AttrRecord {
                    key: arena.alloc(key.as_bytes())?,
                    kind: AttrKind::String,
                    value: AttrValue::Text(arena.alloc(value.as_bytes())?),
                },
                AttrInput::Int(key, value) => AttrRecord {
                    key: arena.alloc(key.as_bytes())?,
                    kind: AttrKind::Int,
                    value: AttrValue::Int(value),
                },
                AttrInput::Bool(key, value) => AttrRecord {
                    key: arena.alloc(key.as_bytes())?,
                    kind: AttrKind::Bool,
                    value: AttrValue::Bool(value),
                },
            };
            self.attrs.push(record);
        }

        let children_start = self.children.len() as u32;
        self.children.extend_from_slice(children);

        let record = NodeRecord {
            kind: kind_ref,
            id: id_ref,
            attrs_start,
            attrs_len: attrs.len() as u32,
            children_start,
            children_len: children.len() as u32,
        };
        self.nodes.push(record);
        Ok(self.nodes.len() as NodeHandle)
    }

    /// Looks up a node by handle. Rejects `handle <= 0` and out-of-range
    /// handles.
    pub fn lookup(&self, handle: NodeHandle) -> VmResult<&NodeRecord> {
        if handle == 0 {
            return Err(VmError::invalid_program("node handle is 0 (none)"));
        }
        self.nodes
            .get(handle as usize - 1)
            .ok_or_else(|| VmError::invalid_program(format!("unknown node handle {handle}")))
    }

    /// Returns the attribute records belonging to `node`.
    pub fn attrs_of(&self, node: &NodeRecord) -> &[AttrRecord] {
        let start = node.attrs_start as usize;
        let end = start + node.attrs_len as usize;
        &self.attrs[start..end]
    }

    /// Returns the child handles belonging to `node`.
    pub fn children_of(&self, node: &NodeRecord) -> &[NodeHandle] {
        let start = node.children_start as usize;
        let end = start + node.children_len as usize;
        &self.children[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap_and_arena() -> (NodeHeap, StringArena) {
        (NodeHeap::new(16, 64, 64), StringArena::new(1024))
    }

    #[test]
    fn create_then_lookup_round_trips() {
        let (mut heap, mut arena) = heap_and_arena();
        let handle = heap.create(&mut arena, "Block", "b1", &[], &[]).unwrap();
        assert_eq!(handle, 1);
        let record = heap.lookup(handle).unwrap();
        assert_eq!(arena.read(record.kind()), b"Block");
        assert_eq!(arena.read(record.id()), b"b1");
    }

    #[test]
    fn handle_zero_is_rejected() {
        let (heap, _arena) = heap_and_arena();
        assert!(heap.lookup(0).is_err());
    }

    #[test]
    fn out_of_range_handle_is_rejected() {
        let (heap, _arena) = heap_and_arena();
        assert!(heap.lookup(99).is_err());
    }

    #[test]
    fn append_child_style_copy_preserves_original() {
        let (mut heap, mut arena) = heap_and_arena();
        let parent = heap
            .create(&mut arena, "Block", "p", &[], &[])
            .unwrap();
        let child = heap.create(&mut arena, "Block", "c", &[], &[]).unwrap();

        let parent_record = *heap.lookup(parent).unwrap();
        let mut children: Vec<NodeHandle> = heap.children_of(&parent_record).to_vec();
        children.push(child);
        let new_parent = heap
            .create(&mut arena, "Block", "p", &[], &children)
            .unwrap();

        assert_ne!(new_parent, parent);
        let original = heap.lookup(parent).unwrap();
        assert!(heap.children_of(original).is_empty());
        let updated = heap.lookup(new_parent).unwrap();
        assert_eq!(heap.children_of(updated), &[child]);
    }

    #[test]
    fn node_capacity_is_enforced() {
        let mut heap = NodeHeap::new(1, 64, 64);
        let mut arena = StringArena::new(1024);
        heap.create(&mut arena, "Block", "a", &[], &[]).unwrap();
        assert!(heap.create(&mut arena, "Block", "b", &[], &[]).is_err());
    }
}
