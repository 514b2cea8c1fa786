//! # ai-vm
//!
//! A small, dynamically-typed bytecode virtual machine.
//!
//! The engine consumes a pre-validated [`Program`] (a sequence of typed
//! instructions plus a constant pool) and drives it to completion, producing
//! a final [`VmStatus`], an optional return value on the operand stack, and,
//! on failure, a structured [`VmError`].
//!
//! ## Architecture
//!
//! - [`value`] — the tagged [`Value`] model (void, int, bool, string, node).
//! - [`program`] — the immutable [`Program`] container and the `AiBC1`
//!   binary loader ([`program::load_aibc1`]).
//! - [`syscall`] — the static syscall contract table and the
//!   contract-checked host-call dispatch layer.
//! - [`string_arena`] — the bump allocator backing VM-produced strings.
//! - [`node_heap`] — the append-only store of composite, AST-like values.
//! - [`execution_state`] — the operand stack, call frames, locals, task
//!   table, and parallel contexts.
//! - [`execution_engine`] — the instruction dispatcher ([`ExecutionEngine`])
//!   that decodes and executes each opcode.
//! - [`limits`] — fixed-capacity configuration for every resource above.
//! - [`script_builder`] — a fluent builder for hand-assembling programs and
//!   encoding them back to `AiBC1` wire bytes.
//!
//! ## Example
//!
//! ```rust
//! use ai_vm::{ExecutionEngine, Limits, OpCode, Program, ProgramBuilder, VmStatus};
//!
//! let mut builder = ProgramBuilder::new();
//! builder
//!     .emit_push_int(2)
//!     .emit_push_int(3)
//!     .emit_opcode(OpCode::AddInt)
//!     .emit_opcode(OpCode::Halt);
//! let program: Program = builder.build();
//!
//! let mut engine = ExecutionEngine::new(&program, Limits::default());
//! let status = engine.run();
//!
//! assert_eq!(status, VmStatus::Halted);
//! assert_eq!(engine.exit_code(), Some(5));
//! ```
//!
//! ## Host calls
//!
//! A host binds syscall handlers as a slice of [`syscall::SyscallBinding`]
//! and passes it to [`ExecutionEngine::with_bindings`]; `CALL_SYS` and
//! `ASYNC_CALL_SYS` dispatch through it, validated against the built-in
//! contract table in [`syscall::contract`].

#![warn(rustdoc::missing_crate_level_docs)]

extern crate std;

/// VM error types and result handling.
pub mod error;
/// The instruction dispatcher (C8): decodes and executes each opcode.
pub mod execution_engine;
/// Operand stack, call frames, locals, task table, and parallel contexts (C7).
pub mod execution_state;
/// VM instruction representation.
pub mod instruction;
/// Fixed-capacity configuration for an execution and a loaded program.
pub mod limits;
/// The append-only node heap (C6) for AST-like composite values.
pub mod node_heap;
/// The VM's closed opcode enumeration.
pub mod opcode;
/// The immutable program container (C2) and the `AiBC1` binary loader.
pub mod program;
/// A fluent builder for hand-assembling programs and `AiBC1` wire bytes.
pub mod script_builder;
/// The static syscall contract table (C3) and dispatch layer (C4).
pub mod syscall;
/// The bump-allocated string arena (C5).
pub mod string_arena;
/// The VM's tagged-value model (C1).
pub mod value;
/// The VM's `Ready -> Running -> {Halted | Error}` status machine.
pub mod vm_state;

pub use error::{VmError, VmResult};
pub use execution_engine::ExecutionEngine;
pub use execution_state::{CallFrame, CompletedTask, ExecutionState, ParContext};
pub use instruction::Instruction;
pub use limits::{Limits, ProgramLimits};
pub use node_heap::{AttrInput, AttrKind, AttrRecord, AttrValue, NodeHeap, NodeRecord};
pub use opcode::{OpCode, OPCODE_MAX};
pub use program::{load_aibc1, Program, ProgramLoadResult, ProgramStatus, SectionMeta};
pub use script_builder::ProgramBuilder;
pub use string_arena::StringArena;
pub use syscall::{ContractStatus, DispatchStatus, SyscallBinding, SyscallContract, SyscallHandler, ValueType};
pub use value::{NodeHandle, StringRef, StringStore, Value};
pub use vm_state::VmStatus;
