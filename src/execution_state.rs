//! Execution state (C7): every fixed-capacity resource a run touches,
//! plus the sticky status/error pair the dispatcher (C8) writes to.
//!
//! `ExecutionState` owns the operand stack, the call-frame stack, locals,
//! the completed-task table, the parallel-context stack and its staging
//! area, the string arena, and the node heap. Nothing here decodes
//! instructions — that is [`crate::execution_engine`]'s job; this module
//! only provides the primitive, capacity-checked operations the dispatcher
//! composes.

use log::debug;

use crate::error::{VmError, VmResult};
use crate::limits::Limits;
use crate::node_heap::NodeHeap;
use crate::string_arena::StringArena;
use crate::value::Value;
use crate::vm_state::VmStatus;

/// `{ return_ip, frame_base, locals_base }` — everything needed to restore
/// the caller's view of the operand stack and locals on `RET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    /// Instruction index to resume at in the caller.
    pub return_ip: usize,
    /// Operand-stack depth at call time.
    pub frame_base: usize,
    /// Locals high-water mark at call time.
    pub locals_base: usize,
}

/// A completed async task: `{ handle, result }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedTask {
    /// The task's dense, 1-based handle.
    pub handle: i64,
    /// The value the task completed with.
    pub result: Value,
}

/// A nested parallel context: `{ expected_count, start_index }` into the
/// shared par-value staging area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParContext {
    /// Number of forks this context expects before `PAR_JOIN`.
    pub expected_count: usize,
    /// Index into the par-value staging area where this context's values
    /// begin.
    pub start_index: usize,
}

/// All dynamic state for one run of the machine.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    limits: Limits,
    ip: usize,
    status: VmStatus,
    error: Option<VmError>,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    locals: Vec<Value>,
    tasks: Vec<CompletedTask>,
    next_task_handle: i64,
    par_contexts: Vec<ParContext>,
    par_values: Vec<Value>,
    string_arena: StringArena,
    node_heap: NodeHeap,
}

impl ExecutionState {
    /// Builds a fresh, `Ready` execution state sized by `limits`.
    pub fn new(limits: Limits) -> Self {
        Self {
            string_arena: StringArena::new(limits.string_arena_capacity),
            node_heap: NodeHeap::new(
                limits.node_capacity,
                limits.node_attrs_capacity,
                limits.node_children_capacity,
            ),
            limits,
            ip: 0,
            status: VmStatus::Ready,
            error: None,
            stack: Vec::new(),
            frames: Vec::new(),
            locals: Vec::new(),
            tasks: Vec::new(),
            next_task_handle: 1,
            par_contexts: Vec::new(),
            par_values: Vec::new(),
        }
    }

    /// Returns every resource to its initial, empty state (§3 "Lifecycle").
    /// All VM-produced strings and nodes die with this call.
    pub fn reset_state(&mut self) {
        self.ip = 0;
        self.status = VmStatus::Ready;
        self.error = None;
        self.stack.clear();
        self.frames.clear();
        self.locals.clear();
        self.tasks.clear();
        self.next_task_handle = 1;
        self.par_contexts.clear();
        self.par_values.clear();
        self.string_arena.reset();
        self.node_heap.reset();
    }

    /// The capacities this state was constructed with.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// The current instruction pointer.
    pub fn ip(&self) -> usize {
        self.ip
    }

    /// Overwrites the instruction pointer (used for jumps/calls/returns).
    pub fn set_ip(&mut self, ip: usize) {
        self.ip = ip;
    }

    /// Advances the instruction pointer by one.
    pub fn advance_ip(&mut self) {
        self.ip += 1;
    }

    /// The current run status.
    pub fn status(&self) -> VmStatus {
        self.status
    }

    /// Forces the status directly; used by the dispatcher for `Running`/
    /// `Halted` transitions that are not themselves errors.
    pub fn set_status(&mut self, status: VmStatus) {
        self.status = status;
    }

    /// The sticky error recorded for this run, if any.
    pub fn error(&self) -> Option<&VmError> {
        self.error.as_ref()
    }

    /// Records `err` as the sticky error, flips status to `Error`, and
    /// parks the instruction pointer past the end of `instruction_count`
    /// so a subsequent `run()` loop exits immediately. Idempotent: only the
    /// first error recorded in a run is kept.
    pub fn fail(&mut self, err: VmError, instruction_count: usize) {
        if self.status == VmStatus::Error {
            return;
        }
        self.status = VmStatus::Error;
        self.ip = instruction_count;
        self.error = Some(err);
    }

    /// The string arena backing VM-produced strings.
    pub fn string_arena(&self) -> &StringArena {
        &self.string_arena
    }

    /// Mutable access to the string arena.
    pub fn string_arena_mut(&mut self) -> &mut StringArena {
        &mut self.string_arena
    }

    /// The node heap.
    pub fn node_heap(&self) -> &NodeHeap {
        &self.node_heap
    }

    /// Mutable access to the node heap.
    pub fn node_heap_mut(&mut self) -> &mut NodeHeap {
        &mut self.node_heap
    }

    /// Mutable access to both the node heap and the string arena at once —
    /// needed by [`crate::node_heap::NodeHeap::create`], which copies
    /// strings into the arena while building a node record.
    pub fn node_heap_and_arena_mut(&mut self) -> (&mut NodeHeap, &mut StringArena) {
        (&mut self.node_heap, &mut self.string_arena)
    }

    /// Current operand-stack depth.
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Pushes a value, failing with `StackOverflow` at capacity.
    pub fn push(&mut self, value: Value) -> VmResult<()> {
        if self.stack.len() >= self.limits.stack_capacity {
            return Err(VmError::StackOverflow {
                capacity: self.limits.stack_capacity,
            });
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pops a value, failing with `StackUnderflow` on an empty stack.
    pub fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    /// Peeks the top value without removing it.
    pub fn peek(&self) -> VmResult<&Value> {
        self.stack.last().ok_or(VmError::StackUnderflow)
    }

    /// Truncates the operand stack to `len`, failing if it is currently
    /// shorter (callers must only shrink).
    pub fn truncate_stack(&mut self, len: usize) {
        self.stack.truncate(len);
    }

    /// Current call-frame depth.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Pushes a call frame, failing with `FrameOverflow` at capacity.
    pub fn frame_push(&mut self, frame: CallFrame) -> VmResult<()> {
        if self.frames.len() >= self.limits.frame_capacity {
            return Err(VmError::FrameOverflow {
                capacity: self.limits.frame_capacity,
            });
        }
        debug!(
            "call frame pushed: return_ip={} frame_base={} locals_base={}",
            frame.return_ip, frame.frame_base, frame.locals_base
        );
        self.frames.push(frame);
        Ok(())
    }

    /// Pops the top call frame, failing with `FrameUnderflow` if none.
    pub fn frame_pop(&mut self) -> VmResult<CallFrame> {
        let frame = self.frames.pop().ok_or(VmError::FrameUnderflow)?;
        debug!("call frame popped: return_ip={}", frame.return_ip);
        Ok(frame)
    }

    /// Current number of live local slots.
    pub fn locals_len(&self) -> usize {
        self.locals.len()
    }

    /// Truncates locals back to `len` (used on `RET` to restore
    /// `locals_base`).
    pub fn truncate_locals(&mut self, len: usize) {
        self.locals.truncate(len);
    }

    /// Writes `value` into local slot `index`, growing the locals vector
    /// with `Value::Void` as needed. Fails with `LocalOutOfRange` if
    /// `index` would exceed capacity.
    pub fn local_set(&mut self, index: usize, value: Value) -> VmResult<()> {
        if index >= self.limits.locals_capacity {
            return Err(VmError::LocalOutOfRange { index });
        }
        if index >= self.locals.len() {
            self.locals.resize(index + 1, Value::Void);
        }
        self.locals[index] = value;
        Ok(())
    }

    /// Reads local slot `index`. Fails with `LocalOutOfRange` if the slot
    /// was never written.
    pub fn local_get(&self, index: usize) -> VmResult<Value> {
        self.locals
            .get(index)
            .copied()
            .ok_or(VmError::LocalOutOfRange { index })
    }

    /// Records a new completed task, failing with `InvalidProgram` at
    /// capacity. Returns the task's dense, 1-based handle.
    pub fn complete_task(&mut self, result: Value) -> VmResult<i64> {
        if self.tasks.len() >= self.limits.tasks_capacity {
            return Err(VmError::invalid_program(format!(
                "task table exhausted: capacity {} exceeded",
                self.limits.tasks_capacity
            )));
        }
        let handle = self.next_task_handle;
        self.next_task_handle += 1;
        debug!("async task {handle} completed");
        self.tasks.push(CompletedTask { handle, result });
        Ok(handle)
    }

    /// Looks up a completed task's result by handle.
    pub fn task_result(&self, handle: i64) -> VmResult<Value> {
        self.tasks
            .iter()
            .find(|task| task.handle == handle)
            .map(|task| task.result)
            .ok_or_else(|| VmError::invalid_program(format!("unknown task handle {handle}")))
    }

    /// Current parallel-context nesting depth.
    pub fn par_depth(&self) -> usize {
        self.par_contexts.len()
    }

    /// Opens a new parallel context expecting `expected_count` forks.
    pub fn par_begin(&mut self, expected_count: usize) -> VmResult<()> {
        if self.par_contexts.len() >= self.limits.par_contexts_capacity {
            return Err(VmError::invalid_program(format!(
                "parallel context depth exhausted: capacity {} exceeded",
                self.limits.par_contexts_capacity
            )));
        }
        debug!("parallel context opened: expecting {expected_count} forks");
        self.par_contexts.push(ParContext {
            expected_count,
            start_index: self.par_values.len(),
        });
        Ok(())
    }

    /// Stages `value` into the current parallel context, failing with
    /// `InvalidProgram` if no context is open or with capacity exhaustion.
    pub fn par_fork(&mut self, value: Value) -> VmResult<()> {
        if self.par_contexts.is_empty() {
            return Err(VmError::invalid_program("PAR_FORK with no open parallel context"));
        }
        if self.par_values.len() >= self.limits.par_values_capacity {
            return Err(VmError::invalid_program(format!(
                "parallel value staging exhausted: capacity {} exceeded",
                self.limits.par_values_capacity
            )));
        }
        self.par_values.push(value);
        Ok(())
    }

    /// Closes the top parallel context, verifying it expected exactly
    /// `expected_count` forks and received exactly that many since it was
    /// opened.
    pub fn par_join(&mut self, expected_count: usize) -> VmResult<()> {
        let context = self
            .par_contexts
            .last()
            .copied()
            .ok_or_else(|| VmError::invalid_program("PAR_JOIN with no open parallel context"))?;
        let staged = self.par_values.len() - context.start_index;
        if context.expected_count != expected_count || staged != expected_count {
            return Err(VmError::invalid_program(format!(
                "PAR_JOIN shape mismatch: opened for {}, joined for {expected_count}, staged {staged}",
                context.expected_count
            )));
        }
        self.par_values.truncate(context.start_index);
        self.par_contexts.pop();
        debug!("parallel context closed: joined {expected_count} forks");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ExecutionState {
        ExecutionState::new(Limits::new().with_stack_capacity(4).with_frame_capacity(2))
    }

    #[test]
    fn push_pop_round_trips() {
        let mut state = state();
        state.push(Value::int(1)).unwrap();
        assert_eq!(state.pop().unwrap(), Value::int(1));
    }

    #[test]
    fn stack_overflow_is_reported() {
        let mut state = state();
        for _ in 0..4 {
            state.push(Value::int(0)).unwrap();
        }
        assert!(state.push(Value::int(0)).is_err());
    }

    #[test]
    fn stack_underflow_is_reported() {
        let mut state = state();
        assert_eq!(state.pop().unwrap_err(), VmError::StackUnderflow);
    }

    #[test]
    fn frame_push_pop_round_trips() {
        let mut state = state();
        let frame = CallFrame {
            return_ip: 3,
            frame_base: 0,
            locals_base: 0,
        };
        state.frame_push(frame).unwrap();
        assert_eq!(state.frame_pop().unwrap(), frame);
    }

    #[test]
    fn locals_grow_on_write_and_reject_unwritten_reads() {
        let mut state = state();
        state.local_set(2, Value::int(9)).unwrap();
        assert_eq!(state.locals_len(), 3);
        assert_eq!(state.local_get(2).unwrap(), Value::int(9));
        assert_eq!(state.local_get(1).unwrap(), Value::Void);
    }

    #[test]
    fn task_handles_are_dense_and_one_based() {
        let mut state = state();
        let first = state.complete_task(Value::int(1)).unwrap();
        let second = state.complete_task(Value::int(2)).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(state.task_result(1).unwrap(), Value::int(1));
    }

    #[test]
    fn unknown_task_handle_is_invalid_program() {
        let state = state();
        assert!(state.task_result(1).is_err());
    }

    #[test]
    fn par_join_requires_exact_fork_count() {
        let mut state = state();
        state.par_begin(2).unwrap();
        state.par_fork(Value::int(1)).unwrap();
        assert!(state.par_join(2).is_err());
        state.par_fork(Value::int(2)).unwrap();
        assert!(state.par_join(2).is_ok());
    }

    #[test]
    fn par_fork_without_context_fails() {
        let mut state = state();
        assert!(state.par_fork(Value::int(1)).is_err());
    }

    #[test]
    fn fail_is_sticky() {
        let mut state = state();
        state.fail(VmError::StackUnderflow, 10);
        assert_eq!(state.status(), VmStatus::Error);
        state.fail(VmError::FrameUnderflow, 10);
        assert_eq!(state.error().unwrap(), &VmError::StackUnderflow);
    }

    #[test]
    fn reset_clears_everything() {
        let mut state = state();
        state.push(Value::int(1)).unwrap();
        state.local_set(0, Value::int(2)).unwrap();
        state.reset_state();
        assert_eq!(state.stack_len(), 0);
        assert_eq!(state.locals_len(), 0);
        assert_eq!(state.status(), VmStatus::Ready);
    }
}
