//! Fixed-capacity configuration for an [`crate::execution_state::ExecutionState`].
//!
//! Every dynamic resource the VM manages — the operand stack, call frames,
//! locals, the node heap, the string arena, completed tasks, and parallel
//! contexts — is backed by a fixed-capacity store. `Limits` bundles those
//! capacities in one place, the way the reference engine's configurable
//! limits object does, with a `Default` matching the recommended minima
//! from §6 of the specification.
//!
//! Limits are captured once when an `ExecutionState` is constructed and are
//! immutable for the life of a run: raising them mid-run would violate the
//! fixed-capacity invariant every helper operation relies on.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Limits {
    /// Maximum depth of the operand stack.
    pub stack_capacity: usize,
    /// Maximum depth of the call-frame stack.
    pub frame_capacity: usize,
    /// Maximum number of live local slots.
    pub locals_capacity: usize,
    /// Maximum bytes the string arena may hold.
    pub string_arena_capacity: usize,
    /// Maximum arguments a single syscall invocation may pass.
    pub syscall_args_capacity: usize,
    /// Maximum number of node records on the node heap.
    pub node_capacity: usize,
    /// Maximum number of attribute records across all nodes.
    pub node_attrs_capacity: usize,
    /// Maximum number of child handles across all nodes.
    pub node_children_capacity: usize,
    /// Maximum number of completed async tasks.
    pub tasks_capacity: usize,
    /// Maximum nesting depth of parallel contexts.
    pub par_contexts_capacity: usize,
    /// Maximum number of values staged across all parallel contexts.
    pub par_values_capacity: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            stack_capacity: 1024,
            frame_capacity: 256,
            locals_capacity: 1024,
            string_arena_capacity: 8 * 1024,
            syscall_args_capacity: 16,
            node_capacity: 256,
            node_attrs_capacity: 1024,
            node_children_capacity: 2048,
            tasks_capacity: 256,
            par_contexts_capacity: 64,
            par_values_capacity: 1024,
        }
    }
}

impl Limits {
    /// Starts from the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the operand-stack capacity.
    pub fn with_stack_capacity(mut self, capacity: usize) -> Self {
        self.stack_capacity = capacity;
        self
    }

    /// Overrides the call-frame capacity.
    pub fn with_frame_capacity(mut self, capacity: usize) -> Self {
        self.frame_capacity = capacity;
        self
    }

    /// Overrides the locals capacity.
    pub fn with_locals_capacity(mut self, capacity: usize) -> Self {
        self.locals_capacity = capacity;
        self
    }

    /// Overrides the string arena capacity, in bytes.
    pub fn with_string_arena_capacity(mut self, capacity: usize) -> Self {
        self.string_arena_capacity = capacity;
        self
    }

    /// Overrides the node heap capacity.
    pub fn with_node_capacity(mut self, capacity: usize) -> Self {
        self.node_capacity = capacity;
        self
    }

    /// Overrides the completed-task table capacity.
    pub fn with_tasks_capacity(mut self, capacity: usize) -> Self {
        self.tasks_capacity = capacity;
        self
    }
}

/// Hard caps enforced while loading an `AiBC1` program (§6). These bound the
/// program itself, independent of the `Limits` an execution is configured
/// with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramLimits {
    /// Maximum number of instructions a program may contain.
    pub max_instructions: usize,
    /// Maximum number of constants a program may contain.
    pub max_constants: usize,
    /// Maximum total bytes of constant-pool string data.
    pub max_string_bytes: usize,
    /// Maximum number of sections in the wire header.
    pub max_sections: usize,
}

impl Default for ProgramLimits {
    fn default() -> Self {
        Self {
            max_instructions: 4096,
            max_constants: 1024,
            max_string_bytes: 8 * 1024,
            max_sections: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_recommended_minima() {
        let limits = Limits::default();
        assert_eq!(limits.stack_capacity, 1024);
        assert_eq!(limits.frame_capacity, 256);
        assert_eq!(limits.node_capacity, 256);
    }

    #[test]
    fn builder_overrides_apply() {
        let limits = Limits::new().with_stack_capacity(16).with_node_capacity(4);
        assert_eq!(limits.stack_capacity, 16);
        assert_eq!(limits.node_capacity, 4);
        assert_eq!(limits.frame_capacity, 256);
    }
}
