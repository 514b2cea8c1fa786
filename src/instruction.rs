//! Instruction representation.
//!
//! Unlike the reference engine's variable-length, byte-sparse script
//! encoding, this VM's instructions are uniform: one opcode plus one `i64`
//! operand, twelve bytes on the wire (§6 of the specification). That makes
//! "instruction size" constant and decoding branchless.

use crate::opcode::OpCode;

/// A single decoded instruction: an opcode plus its operand.
///
/// The meaning of `operand` is opcode-specific — a jump/call target, a
/// constant-pool index, a local slot, a push value, a fork count, and so
/// on. Opcodes that don't use an operand (e.g. `Nop`, `Pop`, `AddInt`)
/// conventionally carry zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    opcode: OpCode,
    operand: i64,
}

impl Instruction {
    /// Builds a new instruction.
    pub fn new(opcode: OpCode, operand: i64) -> Self {
        Self { opcode, operand }
    }

    /// The decoded opcode.
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// The raw operand.
    pub fn operand(&self) -> i64 {
        self.operand
    }

    /// The operand, if it fits in `usize` and is non-negative. Used for
    /// jump/call targets, constant indices, and slot indices, all of which
    /// must reject negative operands.
    pub fn operand_usize(&self) -> Option<usize> {
        usize::try_from(self.operand).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_opcode_and_operand() {
        let instr = Instruction::new(OpCode::Jump, 7);
        assert_eq!(instr.opcode(), OpCode::Jump);
        assert_eq!(instr.operand(), 7);
        assert_eq!(instr.operand_usize(), Some(7));
    }

    #[test]
    fn negative_operand_has_no_usize_form() {
        let instr = Instruction::new(OpCode::Jump, -1);
        assert_eq!(instr.operand_usize(), None);
    }
}
