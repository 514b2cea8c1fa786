//! `AiBC1` program builder.
//!
//! This module provides a way to programmatically construct [`Program`]s
//! without hand-assembling instruction vectors, and to encode a built
//! program back into `AiBC1` wire bytes (the inverse of
//! [`crate::program::load_aibc1`]) for tests and host tooling that need to
//! round-trip a program through the binary format.
//!
//! Unlike the reference engine's variable-length script stream, this
//! builder's `emit_*` methods append fixed-shape `{opcode, operand}`
//! instructions one at a time, matching the fluent, method-chaining style
//! of a script builder while staying faithful to this VM's uniform
//! instruction encoding (§6).

use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::program::Program;
use crate::value::{StringRef, StringStore, Value};

const AIBC1_MAGIC: &[u8; 4] = b"AIBC";
const SECTION_INSTRUCTIONS: u32 = 1;
const SECTION_CONSTANTS: u32 = 2;

/// Helps construct VM programs programmatically, one instruction at a time.
#[derive(Debug, Clone, Default)]
pub struct ProgramBuilder {
    instructions: Vec<Instruction>,
    constants: Vec<Value>,
    const_strings: Vec<u8>,
}

impl ProgramBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits a raw instruction.
    pub fn emit(&mut self, opcode: OpCode, operand: i64) -> &mut Self {
        self.instructions.push(Instruction::new(opcode, operand));
        self
    }

    /// Emits an opcode whose operand is unused, with operand zero.
    pub fn emit_opcode(&mut self, opcode: OpCode) -> &mut Self {
        self.emit(opcode, 0)
    }

    /// Emits `JUMP target`.
    pub fn emit_jump(&mut self, target: usize) -> &mut Self {
        self.emit(OpCode::Jump, target as i64)
    }

    /// Emits `JUMP_IF_FALSE target`.
    pub fn emit_jump_if_false(&mut self, target: usize) -> &mut Self {
        self.emit(OpCode::JumpIfFalse, target as i64)
    }

    /// Emits `CALL target`.
    pub fn emit_call(&mut self, target: usize) -> &mut Self {
        self.emit(OpCode::Call, target as i64)
    }

    /// Emits `ASYNC_CALL target`.
    pub fn emit_async_call(&mut self, target: usize) -> &mut Self {
        self.emit(OpCode::AsyncCall, target as i64)
    }

    /// Emits `PUSH_INT value`.
    pub fn emit_push_int(&mut self, value: i64) -> &mut Self {
        self.emit(OpCode::PushInt, value)
    }

    /// Emits `PUSH_BOOL value`.
    pub fn emit_push_bool(&mut self, value: bool) -> &mut Self {
        self.emit(OpCode::PushBool, value as i64)
    }

    /// Appends `value` to the constant pool and emits `CONST index`.
    pub fn emit_const(&mut self, value: Value) -> &mut Self {
        let index = self.push_constant(value);
        self.emit(OpCode::Const, index as i64)
    }

    /// Appends an int constant and emits `CONST index` for it.
    pub fn emit_const_int(&mut self, value: i64) -> &mut Self {
        self.emit_const(Value::int(value))
    }

    /// Copies `text` into the builder's constant-string pool, appends a
    /// string constant referencing it, and emits `CONST index` for it.
    pub fn emit_const_string(&mut self, text: &str) -> &mut Self {
        let offset = self.const_strings.len() as u32;
        self.const_strings.extend_from_slice(text.as_bytes());
        let reference = StringRef::new(StringStore::Constants, offset, text.len() as u32);
        self.emit_const(Value::string(reference))
    }

    /// Emits `STORE_LOCAL index`.
    pub fn emit_store_local(&mut self, index: usize) -> &mut Self {
        self.emit(OpCode::StoreLocal, index as i64)
    }

    /// Emits `LOAD_LOCAL index`.
    pub fn emit_load_local(&mut self, index: usize) -> &mut Self {
        self.emit(OpCode::LoadLocal, index as i64)
    }

    /// Emits `CALL_SYS argc`.
    pub fn emit_call_sys(&mut self, argc: usize) -> &mut Self {
        self.emit(OpCode::CallSys, argc as i64)
    }

    /// Emits `ASYNC_CALL_SYS argc`.
    pub fn emit_async_call_sys(&mut self, argc: usize) -> &mut Self {
        self.emit(OpCode::AsyncCallSys, argc as i64)
    }

    /// Emits `PAR_BEGIN n`.
    pub fn emit_par_begin(&mut self, expected: usize) -> &mut Self {
        self.emit(OpCode::ParBegin, expected as i64)
    }

    /// Emits `PAR_JOIN n`.
    pub fn emit_par_join(&mut self, expected: usize) -> &mut Self {
        self.emit(OpCode::ParJoin, expected as i64)
    }

    /// Index the next emitted instruction will occupy; useful for computing
    /// jump/call targets before the target code is emitted.
    pub fn next_index(&self) -> usize {
        self.instructions.len()
    }

    /// Adds `value` to the constant pool, returning its index.
    pub fn push_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Consumes the builder, producing the finished [`Program`].
    pub fn build(self) -> Program {
        Program::with_constants(self.instructions, self.constants, self.const_strings)
    }

    /// Encodes the program built so far as `AiBC1` wire bytes, the inverse
    /// of [`crate::program::load_aibc1`]. Only `Int`, `Bool`, `String`, and
    /// `Void` constants are supported (the full closed constant-kind set);
    /// a `Node` constant, which can never actually occur in a constant pool,
    /// is encoded as `Void`.
    pub fn encode_aibc1(&self) -> Vec<u8> {
        let mut instructions_payload = Vec::with_capacity(4 + self.instructions.len() * 12);
        instructions_payload.extend_from_slice(&(self.instructions.len() as u32).to_le_bytes());
        for instr in &self.instructions {
            instructions_payload.extend_from_slice(&instr.opcode().as_u32().to_le_bytes());
            instructions_payload.extend_from_slice(&instr.operand().to_le_bytes());
        }

        let mut constants_payload = Vec::new();
        constants_payload.extend_from_slice(&(self.constants.len() as u32).to_le_bytes());
        for value in &self.constants {
            match value {
                Value::Int(i) => {
                    constants_payload.push(1);
                    constants_payload.extend_from_slice(&i.to_le_bytes());
                }
                Value::Bool(b) => {
                    constants_payload.push(2);
                    constants_payload.push(*b as u8);
                }
                Value::String(Some(reference)) => {
                    constants_payload.push(3);
                    let start = reference.offset() as usize;
                    let end = start + reference.len() as usize;
                    let bytes = &self.const_strings[start..end];
                    constants_payload.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                    constants_payload.extend_from_slice(bytes);
                }
                Value::String(None) => {
                    constants_payload.push(3);
                    constants_payload.extend_from_slice(&0u32.to_le_bytes());
                }
                Value::Void | Value::Node(_) => {
                    constants_payload.push(4);
                }
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(AIBC1_MAGIC);
        out.extend_from_slice(&1u32.to_le_bytes()); // format_version
        out.extend_from_slice(&0u32.to_le_bytes()); // format_flags
        out.extend_from_slice(&2u32.to_le_bytes()); // section_count

        out.extend_from_slice(&SECTION_INSTRUCTIONS.to_le_bytes());
        out.extend_from_slice(&(instructions_payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&instructions_payload);

        out.extend_from_slice(&SECTION_CONSTANTS.to_le_bytes());
        out.extend_from_slice(&(constants_payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&constants_payload);

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::ProgramLimits;
    use crate::program::load_aibc1;

    #[test]
    fn builds_nop_halt_program() {
        let mut builder = ProgramBuilder::new();
        builder.emit_opcode(OpCode::Nop).emit_opcode(OpCode::Halt);
        let program = builder.build();
        assert_eq!(program.instruction_count(), 2);
        assert_eq!(program.instructions()[0].opcode(), OpCode::Nop);
        assert_eq!(program.instructions()[1].opcode(), OpCode::Halt);
    }

    #[test]
    fn emit_const_int_assigns_sequential_indices() {
        let mut builder = ProgramBuilder::new();
        builder.emit_const_int(2).emit_const_int(3);
        let program = builder.build();
        assert_eq!(program.constant(0), Some(&Value::int(2)));
        assert_eq!(program.constant(1), Some(&Value::int(3)));
    }

    #[test]
    fn encode_then_load_round_trips() {
        let mut builder = ProgramBuilder::new();
        builder
            .emit_push_int(2)
            .emit_push_int(3)
            .emit_opcode(OpCode::AddInt)
            .emit_opcode(OpCode::Halt);
        let bytes = builder.encode_aibc1();
        let result = load_aibc1(&bytes, &ProgramLimits::default());
        let program = result.program.expect("well-formed program decodes");
        assert_eq!(program.instruction_count(), 4);
        assert_eq!(program.instructions()[0].opcode(), OpCode::PushInt);
        assert_eq!(program.instructions()[2].opcode(), OpCode::AddInt);
    }

    #[test]
    fn encode_round_trips_string_constant() {
        let mut builder = ProgramBuilder::new();
        builder
            .emit_const_string("hi")
            .emit_opcode(OpCode::ToString)
            .emit_opcode(OpCode::Halt);
        let bytes = builder.encode_aibc1();
        let result = load_aibc1(&bytes, &ProgramLimits::default());
        let program = result.program.expect("well-formed program decodes");
        match program.constant(0) {
            Some(Value::String(Some(reference))) => {
                assert_eq!(program.read_const_string(*reference), b"hi");
            }
            other => panic!("expected a string constant, got {other:?}"),
        }
    }
}
