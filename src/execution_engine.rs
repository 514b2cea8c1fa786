//! The instruction dispatcher (C8): decodes and executes each opcode,
//! maintains the machine's invariants, and surfaces errors.
//!
//! [`ExecutionEngine`] pairs a borrowed [`Program`] with an owned
//! [`ExecutionState`] and an optional syscall binding table. `step()` is the
//! single transition function; `run()` loops it until the machine leaves
//! `Running`. Every fallible piece of work returns a [`VmResult`]; `step()`
//! is the one place that catches the first `Err`, records it on the state,
//! and flips status to `Error` — the rest of the dispatcher never has to
//! recheck status after a helper call.

use log::{error, trace};

use crate::error::{VmError, VmResult};
use crate::execution_state::{CallFrame, ExecutionState};
use crate::instruction::Instruction;
use crate::limits::Limits;
use crate::node_heap::{AttrInput, AttrKind, AttrValue, NodeRecord};
use crate::opcode::OpCode;
use crate::program::Program;
use crate::syscall::dispatch::{dispatch_checked, SyscallBinding};
use crate::value::{NodeHandle, StringRef, StringStore, Value};
use crate::vm_state::VmStatus;

/// Owned reconstruction of an attribute, used when an existing node's
/// attributes need to be copied into a freshly-created node (`APPEND_CHILD`,
/// `MAKE_NODE`). [`AttrInput`] borrows `&str`, so the bytes have to be
/// materialized here first.
enum OwnedAttr {
    Identifier(String, String),
    String(String, String),
    Int(String, i64),
    Bool(String, bool),
}

impl OwnedAttr {
    fn as_input(&self) -> AttrInput<'_> {
        match self {
            OwnedAttr::Identifier(k, v) => AttrInput::Identifier(k, v),
            OwnedAttr::String(k, v) => AttrInput::String(k, v),
            OwnedAttr::Int(k, v) => AttrInput::Int(k, *v),
            OwnedAttr::Bool(k, v) => AttrInput::Bool(k, *v),
        }
    }
}

/// The instruction dispatcher. Borrows a [`Program`] and an optional
/// syscall binding table for the life of a run; owns the mutable
/// [`ExecutionState`] it drives.
pub struct ExecutionEngine<'p, 'h> {
    program: &'p Program,
    bindings: &'h [SyscallBinding<'h>],
    state: ExecutionState,
}

impl<'p> ExecutionEngine<'p, 'static> {
    /// Builds an engine with no bound syscall handlers. `CALL_SYS` and
    /// `ASYNC_CALL_SYS` will always fail dispatch in this configuration,
    /// since every target is unbound.
    pub fn new(program: &'p Program, limits: Limits) -> Self {
        Self {
            program,
            bindings: &[],
            state: ExecutionState::new(limits),
        }
    }
}

impl<'p, 'h> ExecutionEngine<'p, 'h> {
    /// Builds an engine bound to a host's syscall table.
    pub fn with_bindings(program: &'p Program, limits: Limits, bindings: &'h [SyscallBinding<'h>]) -> Self {
        Self {
            program,
            bindings,
            state: ExecutionState::new(limits),
        }
    }

    /// The program this engine is driving.
    pub fn program(&self) -> &'p Program {
        self.program
    }

    /// Read-only access to the execution state.
    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    /// Mutable access to the execution state (for drivers that need to seed
    /// locals or inspect internals between steps).
    pub fn state_mut(&mut self) -> &mut ExecutionState {
        &mut self.state
    }

    /// Returns the machine to `Ready` with every resource cleared (§3
    /// "Lifecycle"). Frees the engine to run the same program again.
    pub fn reset(&mut self) {
        self.state.reset_state();
    }

    /// If the machine halted with an `Int` on top of the operand stack, the
    /// value a consuming host may interpret as an exit code.
    pub fn exit_code(&self) -> Option<i64> {
        if self.state.status() != VmStatus::Halted {
            return None;
        }
        self.state.peek().ok().and_then(Value::as_int)
    }

    /// Executes exactly one instruction and returns the resulting status.
    /// A no-op once the machine has reached a terminal state.
    pub fn step(&mut self) -> VmStatus {
        let status = self.state.status();
        if status.is_terminal() {
            return status;
        }
        if status == VmStatus::Ready {
            self.state.set_status(VmStatus::Running);
        }

        let instruction_count = self.program.instruction_count();
        let ip = self.state.ip();
        if ip >= instruction_count {
            self.state.set_status(VmStatus::Halted);
            return VmStatus::Halted;
        }

        let instr = self.program.instructions()[ip];
        trace!(
            "dispatch ip={ip} opcode={:?} operand={}",
            instr.opcode(),
            instr.operand()
        );

        if let Err(err) = self.execute(instr) {
            error!("vm fault at ip={ip}: {err} ({})", err.kind_name());
            self.state.fail(err, instruction_count);
            return VmStatus::Error;
        }
        self.state.status()
    }

    /// Loops [`Self::step`] until the machine reaches a terminal state.
    pub fn run(&mut self) -> VmStatus {
        loop {
            let status = self.step();
            if status.is_terminal() {
                return status;
            }
        }
    }

    // -- operand helpers --------------------------------------------------

    fn pop_node(&mut self) -> VmResult<NodeHandle> {
        match self.state.pop()? {
            Value::Node(handle) => Ok(handle),
            other => Err(VmError::type_mismatch(format!(
                "expected Node, got {}",
                other.type_name()
            ))),
        }
    }

    fn pop_int(&mut self) -> VmResult<i64> {
        match self.state.pop()? {
            Value::Int(i) => Ok(i),
            other => Err(VmError::type_mismatch(format!(
                "expected Int, got {}",
                other.type_name()
            ))),
        }
    }

    fn pop_bool(&mut self) -> VmResult<bool> {
        match self.state.pop()? {
            Value::Bool(b) => Ok(b),
            other => Err(VmError::type_mismatch(format!(
                "expected Bool, got {}",
                other.type_name()
            ))),
        }
    }

    fn pop_string_ref(&mut self) -> VmResult<StringRef> {
        match self.state.pop()? {
            Value::String(Some(r)) => Ok(r),
            Value::String(None) => Err(VmError::type_mismatch("expected non-null String")),
            other => Err(VmError::type_mismatch(format!(
                "expected String, got {}",
                other.type_name()
            ))),
        }
    }

    /// Reads back the bytes a [`StringRef`] points to, dereferencing
    /// whichever store (program constants or VM arena) it names.
    fn read_string_ref(&self, reference: StringRef) -> &[u8] {
        match reference.store() {
            StringStore::Constants => self.program.read_const_string(reference),
            StringStore::Arena => self.state.string_arena().read(reference),
        }
    }

    fn pop_string_owned(&mut self) -> VmResult<String> {
        let r = self.pop_string_ref()?;
        Ok(String::from_utf8_lossy(self.read_string_ref(r)).into_owned())
    }

    fn alloc_string(&mut self, bytes: &[u8]) -> VmResult<StringRef> {
        self.state.string_arena_mut().alloc(bytes)
    }

    /// A target/jump/call/slot/constant-index operand: must be present and
    /// non-negative.
    fn operand_index(instr: Instruction, what: &str) -> VmResult<usize> {
        instr
            .operand_usize()
            .ok_or_else(|| VmError::invalid_program(format!("{what} must be non-negative, got {}", instr.operand())))
    }

    fn branch_target(&self, instr: Instruction, allow_end: bool) -> VmResult<usize> {
        let target = Self::operand_index(instr, "branch target")?;
        let instruction_count = self.program.instruction_count();
        let in_range = if allow_end {
            target <= instruction_count
        } else {
            target < instruction_count
        };
        if !in_range {
            return Err(VmError::invalid_program(format!(
                "branch target {target} out of range (instruction_count={instruction_count})"
            )));
        }
        Ok(target)
    }

    /// Value equality per §3: tags must match; strings compare by byte
    /// content (dereferencing whichever store they point into), never by
    /// reference identity.
    fn values_equal(&self, a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::Void, Value::Void) => true,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Node(x), Value::Node(y)) => x == y,
            (Value::String(None), Value::String(None)) => true,
            (Value::String(None), Value::String(Some(_))) | (Value::String(Some(_)), Value::String(None)) => false,
            (Value::String(Some(ra)), Value::String(Some(rb))) => self.read_string_ref(ra) == self.read_string_ref(rb),
            _ => false,
        }
    }

    fn owned_attrs_of(&self, record: &NodeRecord) -> Vec<OwnedAttr> {
        self.state
            .node_heap()
            .attrs_of(record)
            .iter()
            .map(|attr| {
                let key = String::from_utf8_lossy(self.read_string_ref(attr.key())).into_owned();
                match (attr.kind(), attr.value()) {
                    (AttrKind::Identifier, AttrValue::Text(r)) => {
                        OwnedAttr::Identifier(key, String::from_utf8_lossy(self.read_string_ref(r)).into_owned())
                    }
                    (AttrKind::String, AttrValue::Text(r)) => {
                        OwnedAttr::String(key, String::from_utf8_lossy(self.read_string_ref(r)).into_owned())
                    }
                    (AttrKind::Int, AttrValue::Int(v)) => OwnedAttr::Int(key, v),
                    (AttrKind::Bool, AttrValue::Bool(v)) => OwnedAttr::Bool(key, v),
                    // kind/value are always written together by NodeHeap::create.
                    _ => unreachable!("attribute kind/value tag mismatch"),
                }
            })
            .collect()
    }

    fn attr_indexed<T>(&mut self, extract: impl Fn(&crate::node_heap::AttrRecord) -> Option<T>, default: T) -> VmResult<T> {
        let index = self.pop_int()?;
        let handle = self.pop_node()?;
        let record = *self.state.node_heap().lookup(handle)?;
        let attrs = self.state.node_heap().attrs_of(&record);
        let value = usize::try_from(index).ok().and_then(|i| attrs.get(i)).and_then(extract).unwrap_or(default);
        Ok(value)
    }

    // -- the dispatch table -------------------------------------------------

    fn execute(&mut self, instr: Instruction) -> VmResult<()> {
        use OpCode::*;
        match instr.opcode() {
            Nop | Stub => {
                self.state.advance_ip();
                Ok(())
            }
            Halt => {
                self.state.set_status(VmStatus::Halted);
                Ok(())
            }
            Jump => {
                let target = self.branch_target(instr, true)?;
                self.state.set_ip(target);
                Ok(())
            }
            JumpIfFalse => {
                let cond = self.pop_bool()?;
                if cond {
                    self.state.advance_ip();
                } else {
                    let target = self.branch_target(instr, true)?;
                    self.state.set_ip(target);
                }
                Ok(())
            }
            PushInt => {
                self.state.push(Value::int(instr.operand()))?;
                self.state.advance_ip();
                Ok(())
            }
            PushBool => {
                self.state.push(Value::bool_from_int(instr.operand()))?;
                self.state.advance_ip();
                Ok(())
            }
            Const => {
                let index = Self::operand_index(instr, "constant index")?;
                let value = self
                    .program
                    .constant(index)
                    .copied()
                    .ok_or_else(|| VmError::invalid_program(format!("constant index {index} out of range")))?;
                self.state.push(value)?;
                self.state.advance_ip();
                Ok(())
            }
            Pop => {
                self.state.pop()?;
                self.state.advance_ip();
                Ok(())
            }
            StoreLocal => {
                let index = Self::operand_index(instr, "local index")?;
                let value = self.state.pop()?;
                self.state.local_set(index, value)?;
                self.state.advance_ip();
                Ok(())
            }
            LoadLocal => {
                let index = Self::operand_index(instr, "local index")?;
                let value = self.state.local_get(index)?;
                self.state.push(value)?;
                self.state.advance_ip();
                Ok(())
            }
            AddInt => {
                let b = self.pop_int()?;
                let a = self.pop_int()?;
                self.state.push(Value::int(a.wrapping_add(b)))?;
                self.state.advance_ip();
                Ok(())
            }
            EqInt => {
                let b = self.pop_int()?;
                let a = self.pop_int()?;
                self.state.push(Value::bool(a == b))?;
                self.state.advance_ip();
                Ok(())
            }
            Eq => {
                let b = self.state.pop()?;
                let a = self.state.pop()?;
                let eq = self.values_equal(a, b);
                self.state.push(Value::bool(eq))?;
                self.state.advance_ip();
                Ok(())
            }
            Call => {
                let target = self.branch_target(instr, false)?;
                let frame = CallFrame {
                    return_ip: self.state.ip() + 1,
                    frame_base: self.state.stack_len(),
                    locals_base: self.state.locals_len(),
                };
                self.state.frame_push(frame)?;
                self.state.set_ip(target);
                Ok(())
            }
            Ret | Return => self.execute_ret(),
            StrConcat => {
                let rb = self.pop_string_ref()?;
                let ra = self.pop_string_ref()?;
                let mut bytes = self.read_string_ref(ra).to_vec();
                bytes.extend_from_slice(self.read_string_ref(rb));
                let r = self.alloc_string(&bytes)?;
                self.state.push(Value::string(r))?;
                self.state.advance_ip();
                Ok(())
            }
            ToString => {
                let value = self.state.pop()?;
                let text = match value {
                    Value::String(Some(r)) => self.read_string_ref(r).to_vec(),
                    Value::String(None) => return Err(VmError::type_mismatch("TO_STRING on a null string")),
                    Value::Bool(b) => {
                        if b {
                            b"true".to_vec()
                        } else {
                            b"false".to_vec()
                        }
                    }
                    Value::Void => b"null".to_vec(),
                    Value::Int(n) => n.to_string().into_bytes(),
                    Value::Node(_) => return Err(VmError::type_mismatch("TO_STRING on a Node")),
                };
                let r = self.alloc_string(&text)?;
                self.state.push(Value::string(r))?;
                self.state.advance_ip();
                Ok(())
            }
            StrEscape => {
                let r = self.pop_string_ref()?;
                let escaped = escape_bytes(self.read_string_ref(r));
                let out = self.alloc_string(&escaped)?;
                self.state.push(Value::string(out))?;
                self.state.advance_ip();
                Ok(())
            }
            StrSubstring => {
                let length = self.pop_int()?;
                let start = self.pop_int()?;
                let r = self.pop_string_ref()?;
                let sliced = substring_bytes(self.read_string_ref(r), start, length);
                let out = self.alloc_string(&sliced)?;
                self.state.push(Value::string(out))?;
                self.state.advance_ip();
                Ok(())
            }
            StrRemove => {
                let length = self.pop_int()?;
                let start = self.pop_int()?;
                let r = self.pop_string_ref()?;
                let removed = remove_bytes(self.read_string_ref(r), start, length);
                let out = self.alloc_string(&removed)?;
                self.state.push(Value::string(out))?;
                self.state.advance_ip();
                Ok(())
            }
            StrUtf8ByteCount => {
                let r = self.pop_string_ref()?;
                let len = self.read_string_ref(r).len() as i64;
                self.state.push(Value::int(len))?;
                self.state.advance_ip();
                Ok(())
            }
            CallSys => {
                let value = self.do_syscall(instr)?;
                self.state.push(value)?;
                self.state.advance_ip();
                Ok(())
            }
            AsyncCall => {
                let target = self.branch_target(instr, false)?;
                let result = self.run_async_body(target)?;
                let handle = self.state.complete_task(result)?;
                self.state.push(Value::int(handle))?;
                self.state.advance_ip();
                Ok(())
            }
            AsyncCallSys => {
                let value = self.do_syscall(instr)?;
                let handle = self.state.complete_task(value)?;
                self.state.push(Value::int(handle))?;
                self.state.advance_ip();
                Ok(())
            }
            Await => {
                let handle = self.pop_int()?;
                let result = self.state.task_result(handle)?;
                self.state.push(result)?;
                self.state.advance_ip();
                Ok(())
            }
            ParBegin => {
                let n = Self::operand_index(instr, "PAR_BEGIN count")?;
                self.state.par_begin(n)?;
                self.state.advance_ip();
                Ok(())
            }
            ParFork => {
                let value = self.state.pop()?;
                self.state.par_fork(value)?;
                self.state.advance_ip();
                Ok(())
            }
            ParJoin => {
                let n = Self::operand_index(instr, "PAR_JOIN count")?;
                self.state.par_join(n)?;
                self.state.push(Value::int(n as i64))?;
                self.state.advance_ip();
                Ok(())
            }
            ParCancel => {
                self.state.advance_ip();
                Ok(())
            }
            NodeKind => {
                let handle = self.pop_node()?;
                let record = *self.state.node_heap().lookup(handle)?;
                self.state.push(Value::string(record.kind()))?;
                self.state.advance_ip();
                Ok(())
            }
            NodeId => {
                let handle = self.pop_node()?;
                let record = *self.state.node_heap().lookup(handle)?;
                self.state.push(Value::string(record.id()))?;
                self.state.advance_ip();
                Ok(())
            }
            AttrCount => {
                let handle = self.pop_node()?;
                let record = *self.state.node_heap().lookup(handle)?;
                let count = self.state.node_heap().attrs_of(&record).len() as i64;
                self.state.push(Value::int(count))?;
                self.state.advance_ip();
                Ok(())
            }
            AttrKey => {
                let empty = self.empty_string_ref()?;
                let r = self.attr_indexed(|a| Some(a.key()), empty)?;
                self.state.push(Value::string(r))?;
                self.state.advance_ip();
                Ok(())
            }
            AttrValueKind => {
                let tag = self.attr_indexed(|a| Some(attr_kind_tag(a.kind())), -1)?;
                self.state.push(Value::int(tag))?;
                self.state.advance_ip();
                Ok(())
            }
            AttrValueString => {
                let empty = self.empty_string_ref()?;
                let r = self.attr_indexed(
                    |a| match a.value() {
                        AttrValue::Text(r) => Some(r),
                        _ => None,
                    },
                    empty,
                )?;
                self.state.push(Value::string(r))?;
                self.state.advance_ip();
                Ok(())
            }
            AttrValueInt => {
                let v = self.attr_indexed(
                    |a| match a.value() {
                        AttrValue::Int(v) => Some(v),
                        _ => None,
                    },
                    0,
                )?;
                self.state.push(Value::int(v))?;
                self.state.advance_ip();
                Ok(())
            }
            AttrValueBool => {
                let v = self.attr_indexed(
                    |a| match a.value() {
                        AttrValue::Bool(v) => Some(v),
                        _ => None,
                    },
                    false,
                )?;
                self.state.push(Value::bool(v))?;
                self.state.advance_ip();
                Ok(())
            }
            ChildCount => {
                let handle = self.pop_node()?;
                let record = *self.state.node_heap().lookup(handle)?;
                let count = self.state.node_heap().children_of(&record).len() as i64;
                self.state.push(Value::int(count))?;
                self.state.advance_ip();
                Ok(())
            }
            ChildAt => {
                let index = self.pop_int()?;
                let handle = self.pop_node()?;
                let record = *self.state.node_heap().lookup(handle)?;
                let children = self.state.node_heap().children_of(&record);
                let i = usize::try_from(index)
                    .ok()
                    .filter(|&i| i < children.len())
                    .ok_or_else(|| VmError::invalid_program(format!("child index {index} out of range")))?;
                self.state.push(Value::node(children[i]))?;
                self.state.advance_ip();
                Ok(())
            }
            MakeBlock => {
                let id = self.pop_string_owned()?;
                let (heap, arena) = self.state.node_heap_and_arena_mut();
                let handle = heap.create(arena, "Block", &id, &[], &[])?;
                self.state.push(Value::node(handle))?;
                self.state.advance_ip();
                Ok(())
            }
            AppendChild => {
                let child = self.pop_node()?;
                let parent = self.pop_node()?;
                let record = *self.state.node_heap().lookup(parent)?;
                let kind = String::from_utf8_lossy(self.read_string_ref(record.kind())).into_owned();
                let id = String::from_utf8_lossy(self.read_string_ref(record.id())).into_owned();
                let owned_attrs = self.owned_attrs_of(&record);
                let attrs: Vec<AttrInput<'_>> = owned_attrs.iter().map(OwnedAttr::as_input).collect();
                let mut children = self.state.node_heap().children_of(&record).to_vec();
                children.push(child);
                let (heap, arena) = self.state.node_heap_and_arena_mut();
                let handle = heap.create(arena, &kind, &id, &attrs, &children)?;
                self.state.push(Value::node(handle))?;
                self.state.advance_ip();
                Ok(())
            }
            MakeErr => {
                let node_id = self.pop_string_owned()?;
                let message = self.pop_string_owned()?;
                let code = self.pop_string_owned()?;
                let id = self.pop_string_owned()?;
                let attrs = [
                    AttrInput::String("code", &code),
                    AttrInput::String("message", &message),
                    AttrInput::String("nodeId", &node_id),
                ];
                let (heap, arena) = self.state.node_heap_and_arena_mut();
                let handle = heap.create(arena, "Err", &id, &attrs, &[])?;
                self.state.push(Value::node(handle))?;
                self.state.advance_ip();
                Ok(())
            }
            MakeLitString => {
                let value = self.pop_string_owned()?;
                let id = self.pop_string_owned()?;
                let attrs = [AttrInput::String("value", &value)];
                let (heap, arena) = self.state.node_heap_and_arena_mut();
                let handle = heap.create(arena, "Lit", &id, &attrs, &[])?;
                self.state.push(Value::node(handle))?;
                self.state.advance_ip();
                Ok(())
            }
            MakeLitInt => {
                let value = self.pop_int()?;
                let id = self.pop_string_owned()?;
                let attrs = [AttrInput::Int("value", value)];
                let (heap, arena) = self.state.node_heap_and_arena_mut();
                let handle = heap.create(arena, "Lit", &id, &attrs, &[])?;
                self.state.push(Value::node(handle))?;
                self.state.advance_ip();
                Ok(())
            }
            MakeNode => {
                let argc = Self::operand_index(instr, "MAKE_NODE argc")?;
                let mut popped_children = Vec::with_capacity(argc);
                for _ in 0..argc {
                    popped_children.push(self.pop_node()?);
                }
                popped_children.reverse();
                let template = self.pop_node()?;
                let record = *self.state.node_heap().lookup(template)?;
                let kind = String::from_utf8_lossy(self.read_string_ref(record.kind())).into_owned();
                let id = String::from_utf8_lossy(self.read_string_ref(record.id())).into_owned();
                let owned_attrs = self.owned_attrs_of(&record);
                let attrs: Vec<AttrInput<'_>> = owned_attrs.iter().map(OwnedAttr::as_input).collect();
                let (heap, arena) = self.state.node_heap_and_arena_mut();
                let handle = heap.create(arena, &kind, &id, &attrs, &popped_children)?;
                self.state.push(Value::node(handle))?;
                self.state.advance_ip();
                Ok(())
            }
        }
    }

    fn empty_string_ref(&mut self) -> VmResult<StringRef> {
        self.alloc_string(&[])
    }

    fn execute_ret(&mut self) -> VmResult<()> {
        if self.state.frame_count() == 0 {
            self.state.set_status(VmStatus::Halted);
            return Ok(());
        }
        let frame = self.state.frame_pop()?;
        if self.state.stack_len() > frame.frame_base {
            let value = self.state.pop()?;
            self.state.truncate_stack(frame.frame_base);
            self.state.push(value)?;
        } else {
            self.state.truncate_stack(frame.frame_base);
        }
        self.state.truncate_locals(frame.locals_base);
        self.state.set_ip(frame.return_ip);
        Ok(())
    }

    fn do_syscall(&mut self, instr: Instruction) -> VmResult<Value> {
        let argc = Self::operand_index(instr, "CALL_SYS argc")?;
        let cap = self.state.limits().syscall_args_capacity;
        if argc > cap {
            return Err(VmError::invalid_program(format!(
                "CALL_SYS argc {argc} exceeds capacity {cap}"
            )));
        }
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.state.pop()?);
        }
        args.reverse();
        let target = self.pop_string_owned()?;
        dispatch_checked(self.bindings, &target, &args)
    }

    /// Runs the callee at `target_ip` synchronously to completion, sharing
    /// this dispatcher's stack/locals/frames, and returns its return value
    /// (or `Value::Void` if it left nothing above its frame base).
    ///
    /// A nested `HALT` is rejected: an async body must terminate via `RET`.
    fn run_async_body(&mut self, target_ip: usize) -> VmResult<Value> {
        let frame = CallFrame {
            return_ip: self.state.ip(),
            frame_base: self.state.stack_len(),
            locals_base: self.state.locals_len(),
        };
        self.state.frame_push(frame)?;
        let baseline_frames = self.state.frame_count();
        self.state.set_ip(target_ip);

        let outcome = loop {
            let ip = self.state.ip();
            if ip >= self.program.instruction_count() {
                break Err(VmError::invalid_program(
                    "async callee ran past end of program without returning",
                ));
            }
            let instr = self.program.instructions()[ip];
            if instr.opcode() == OpCode::Halt {
                break Err(VmError::invalid_program("HALT is invalid inside ASYNC_CALL"));
            }
            if let Err(err) = self.execute(instr) {
                break Err(err);
            }
            if self.state.frame_count() < baseline_frames {
                break Ok(());
            }
        };
        outcome?;

        if self.state.stack_len() > frame.frame_base {
            self.state.pop()
        } else {
            Ok(Value::void())
        }
    }
}

fn attr_kind_tag(kind: AttrKind) -> i64 {
    match kind {
        AttrKind::Identifier => 0,
        AttrKind::String => 1,
        AttrKind::Int => 2,
        AttrKind::Bool => 3,
    }
}

/// Scans `bytes` as UTF-8, returning the byte offset each rune (Unicode
/// scalar) starts at, plus a trailing sentinel equal to `bytes.len()`.
/// Malformed lead bytes fall back to a 1-byte advance (§4.8 "Unicode string
/// slicing").
fn utf8_rune_starts(bytes: &[u8]) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        starts.push(i);
        let lead = bytes[i];
        let declared = if lead < 0x80 {
            1
        } else if (0xC0..=0xDF).contains(&lead) {
            2
        } else if (0xE0..=0xEF).contains(&lead) {
            3
        } else if (0xF0..=0xF7).contains(&lead) {
            4
        } else {
            1
        };
        i += declared.min(bytes.len() - i).max(1);
    }
    starts.push(bytes.len());
    starts
}

/// Clamps `(start, start+length)` into `[0, rune_count]` per §4.8.
fn clamp_rune_range(rune_count: usize, start: i64, length: i64) -> (usize, usize) {
    let rune_count = rune_count as i64;
    let start_clamped = start.clamp(0, rune_count);
    if length <= 0 {
        let s = start_clamped as usize;
        return (s, s);
    }
    let end_clamped = start_clamped.saturating_add(length).clamp(0, rune_count);
    let s = start_clamped as usize;
    let e = (end_clamped as usize).max(s);
    (s, e)
}

fn substring_bytes(bytes: &[u8], start: i64, length: i64) -> Vec<u8> {
    let starts = utf8_rune_starts(bytes);
    let rune_count = starts.len() - 1;
    let (s, e) = clamp_rune_range(rune_count, start, length);
    bytes[starts[s]..starts[e]].to_vec()
}

fn remove_bytes(bytes: &[u8], start: i64, length: i64) -> Vec<u8> {
    if length <= 0 {
        return bytes.to_vec();
    }
    let starts = utf8_rune_starts(bytes);
    let rune_count = starts.len() - 1;
    let (s, e) = clamp_rune_range(rune_count, start, length);
    let mut out = Vec::with_capacity(bytes.len() - (starts[e] - starts[s]));
    out.extend_from_slice(&bytes[..starts[s]]);
    out.extend_from_slice(&bytes[starts[e]..]);
    out
}

fn escape_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'"' => out.extend_from_slice(b"\\\""),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            _ => out.push(b),
        }
    }
    out
}
