//! End-to-end scenarios driving the engine through its public API only,
//! mirroring the concrete cases and universal invariants enumerated for
//! this machine: every run must end in a terminal status, RET with an
//! empty frame stack halts instead of erroring, and ASYNC_CALL/AWAIT must
//! behave identically to an inline call.

use ai_vm::{ExecutionEngine, Limits, OpCode, ProgramBuilder, VmError, VmStatus};

#[test]
fn nop_then_halt_reaches_halted_with_empty_stack() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut builder = ProgramBuilder::new();
    builder.emit_opcode(OpCode::Nop).emit_opcode(OpCode::Halt);
    let program = builder.build();

    let mut engine = ExecutionEngine::new(&program, Limits::default());
    assert_eq!(engine.run(), VmStatus::Halted);
    assert_eq!(engine.state().ip(), 2);
    assert_eq!(engine.state().stack_len(), 0);
}

#[test]
fn add_int_leaves_sum_on_top_of_stack() {
    let mut builder = ProgramBuilder::new();
    builder
        .emit_push_int(2)
        .emit_push_int(3)
        .emit_opcode(OpCode::AddInt)
        .emit_opcode(OpCode::Halt);
    let program = builder.build();

    let mut engine = ExecutionEngine::new(&program, Limits::default());
    assert_eq!(engine.run(), VmStatus::Halted);
    assert_eq!(engine.exit_code(), Some(5));
}

#[test]
fn call_then_ret_returns_a_value_and_unwinds_the_frame() {
    let mut builder = ProgramBuilder::new();
    builder.emit_call(2).emit_opcode(OpCode::Halt);
    assert_eq!(builder.next_index(), 2);
    builder.emit_push_int(7).emit_opcode(OpCode::Ret);
    let program = builder.build();

    let mut engine = ExecutionEngine::new(&program, Limits::default());
    assert_eq!(engine.run(), VmStatus::Halted);
    assert_eq!(engine.exit_code(), Some(7));
    assert_eq!(engine.state().frame_count(), 0);
}

#[test]
fn locals_written_in_a_callee_do_not_leak_to_the_caller() {
    // caller: local[0] = 1; CALL callee; LOAD_LOCAL 0; HALT
    // callee: local[1] = 99; PUSH_INT 5; RET
    let mut builder = ProgramBuilder::new();
    builder
        .emit_push_int(1)
        .emit_store_local(0)
        .emit_call(7)
        .emit_load_local(0)
        .emit_opcode(OpCode::Halt)
        .emit_opcode(OpCode::Nop)
        .emit_opcode(OpCode::Nop);
    assert_eq!(builder.next_index(), 7);
    builder
        .emit_push_int(99)
        .emit_store_local(1)
        .emit_push_int(5)
        .emit_opcode(OpCode::Ret);
    let program = builder.build();

    let mut engine = ExecutionEngine::new(&program, Limits::default());
    assert_eq!(engine.run(), VmStatus::Halted);
    assert_eq!(engine.exit_code(), Some(1));
    assert_eq!(engine.state().locals_len(), 1);
}

#[test]
fn jump_if_false_branches_on_a_false_condition() {
    let mut builder = ProgramBuilder::new();
    builder.emit_push_bool(false);
    builder.emit_jump_if_false(4);
    builder.emit_push_int(111);
    builder.emit_opcode(OpCode::Halt);
    assert_eq!(builder.next_index(), 4);
    builder.emit_push_int(333).emit_opcode(OpCode::Halt);
    let program = builder.build();

    let mut engine = ExecutionEngine::new(&program, Limits::default());
    assert_eq!(engine.run(), VmStatus::Halted);
    assert_eq!(engine.exit_code(), Some(333));
}

#[test]
fn jump_if_false_falls_through_on_a_true_condition() {
    let mut builder = ProgramBuilder::new();
    builder.emit_push_bool(true);
    builder.emit_jump_if_false(4);
    builder.emit_push_int(111);
    builder.emit_opcode(OpCode::Halt);
    builder.emit_push_int(333).emit_opcode(OpCode::Halt);
    let program = builder.build();

    let mut engine = ExecutionEngine::new(&program, Limits::default());
    assert_eq!(engine.run(), VmStatus::Halted);
    assert_eq!(engine.exit_code(), Some(111));
}

#[test]
fn to_string_on_a_negative_int_constant_renders_the_sign() {
    let mut builder = ProgramBuilder::new();
    builder
        .emit_const_int(-12)
        .emit_opcode(OpCode::ToString)
        .emit_opcode(OpCode::Halt);
    let program = builder.build();

    let mut engine = ExecutionEngine::new(&program, Limits::default());
    assert_eq!(engine.run(), VmStatus::Halted);
    let r = engine.state().peek().unwrap().as_string_ref().unwrap();
    assert_eq!(engine.state().string_arena().read(r), b"-12");
}

#[test]
fn async_call_then_await_yields_the_same_value_as_an_inline_call() {
    let mut builder = ProgramBuilder::new();
    builder.emit_async_call(4);
    builder.emit_opcode(OpCode::Await);
    builder.emit_opcode(OpCode::Halt);
    builder.emit_opcode(OpCode::Nop);
    assert_eq!(builder.next_index(), 4);
    builder.emit_push_int(9).emit_opcode(OpCode::Ret);
    let program = builder.build();

    let mut engine = ExecutionEngine::new(&program, Limits::default());
    assert_eq!(engine.run(), VmStatus::Halted);
    assert_eq!(engine.exit_code(), Some(9));
}

#[test]
fn par_begin_fork_join_succeeds_only_when_counts_match() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut builder = ProgramBuilder::new();
    builder
        .emit_par_begin(2)
        .emit_push_int(1)
        .emit_opcode(OpCode::ParFork)
        .emit_push_int(2)
        .emit_opcode(OpCode::ParFork)
        .emit_par_join(2)
        .emit_opcode(OpCode::Halt);
    let program = builder.build();

    let mut engine = ExecutionEngine::new(&program, Limits::default());
    assert_eq!(engine.run(), VmStatus::Halted);
    assert_eq!(engine.exit_code(), Some(2));
}

#[test]
fn par_join_with_the_wrong_count_is_a_fatal_invalid_program_error() {
    let mut builder = ProgramBuilder::new();
    builder
        .emit_par_begin(2)
        .emit_push_int(1)
        .emit_opcode(OpCode::ParFork)
        .emit_par_join(2)
        .emit_opcode(OpCode::Halt);
    let program = builder.build();

    let mut engine = ExecutionEngine::new(&program, Limits::default());
    assert_eq!(engine.run(), VmStatus::Error);
    assert!(matches!(engine.state().error(), Some(VmError::InvalidProgram { .. })));
}

#[test]
fn ret_with_no_open_frame_halts_rather_than_errors() {
    let mut builder = ProgramBuilder::new();
    builder.emit_opcode(OpCode::Ret);
    let program = builder.build();

    let mut engine = ExecutionEngine::new(&program, Limits::default());
    assert_eq!(engine.run(), VmStatus::Halted);
    assert_eq!(engine.state().frame_count(), 0);
}

#[test]
fn every_run_ends_in_a_terminal_status_and_stays_there() {
    let mut builder = ProgramBuilder::new();
    builder.emit_opcode(OpCode::Pop).emit_opcode(OpCode::Halt);
    let program = builder.build();

    let mut engine = ExecutionEngine::new(&program, Limits::default());
    let first = engine.run();
    assert!(first.is_terminal());
    let second = engine.run();
    assert_eq!(first, second);
}

#[test]
fn reset_lets_the_same_engine_run_the_program_again() {
    let mut builder = ProgramBuilder::new();
    builder.emit_push_int(1).emit_opcode(OpCode::Halt);
    let program = builder.build();

    let mut engine = ExecutionEngine::new(&program, Limits::default());
    assert_eq!(engine.run(), VmStatus::Halted);
    engine.reset();
    assert_eq!(engine.state().status(), VmStatus::Ready);
    assert_eq!(engine.run(), VmStatus::Halted);
    assert_eq!(engine.exit_code(), Some(1));
}
