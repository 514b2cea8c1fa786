//! Error types for the VM crate.
//!
//! This module provides the structured error taxonomy used for instruction
//! dispatch, program loading, and syscall validation.

use thiserror::Error;

/// VM execution errors.
///
/// Each variant corresponds to one of the fatal error kinds the dispatcher
/// can record on `ExecutionState`. Errors are non-local: once raised, the
/// instruction that detected them parks the instruction pointer past the
/// end of the program and the engine never attempts to recover.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// Decoded opcode falls outside the closed opcode enumeration.
    #[error("invalid opcode: {opcode:#04x}")]
    InvalidOpcode {
        /// Raw opcode byte that failed to decode.
        opcode: u32,
    },

    /// Operand stack capacity breached on push.
    #[error("stack overflow: capacity {capacity} exceeded")]
    StackOverflow {
        /// Configured stack capacity.
        capacity: usize,
    },

    /// Pop attempted against an empty operand stack.
    #[error("stack underflow")]
    StackUnderflow,

    /// Call-frame capacity breached on push.
    #[error("frame overflow: capacity {capacity} exceeded")]
    FrameOverflow {
        /// Configured call-frame capacity.
        capacity: usize,
    },

    /// Frame pop attempted with no frame on the invocation stack.
    #[error("frame underflow")]
    FrameUnderflow,

    /// Local-slot index is out of range, or was never written before a read.
    #[error("local out of range: index {index}")]
    LocalOutOfRange {
        /// Requested local index.
        index: usize,
    },

    /// An operand's tag does not satisfy the instruction's contract.
    #[error("type mismatch: {reason}")]
    TypeMismatch {
        /// Human-readable description of the expected vs. actual shape.
        reason: String,
    },

    /// Out-of-range branch/call target, unknown task handle, heap
    /// exhaustion, PAR_JOIN shape mismatch, or misused async construct.
    #[error("invalid program: {reason}")]
    InvalidProgram {
        /// Human-readable description of the violation.
        reason: String,
    },

    /// The string arena's fixed byte buffer is exhausted.
    #[error("string arena overflow: capacity {capacity} exceeded")]
    StringOverflow {
        /// Configured string arena capacity in bytes.
        capacity: usize,
    },

    /// `dispatch_checked` returned anything other than success.
    #[error("syscall failed: {detail}")]
    Syscall {
        /// Dispatch/contract status code(s) embedded for diagnostics.
        detail: String,
    },
}

impl VmError {
    /// Shorthand for a type-mismatch error with a formatted reason.
    pub fn type_mismatch<S: Into<String>>(reason: S) -> Self {
        Self::TypeMismatch {
            reason: reason.into(),
        }
    }

    /// Shorthand for an invalid-program error with a formatted reason.
    pub fn invalid_program<S: Into<String>>(reason: S) -> Self {
        Self::InvalidProgram {
            reason: reason.into(),
        }
    }

    /// Shorthand for a syscall error carrying the failing status code(s).
    pub fn syscall<S: Into<String>>(detail: S) -> Self {
        Self::Syscall {
            detail: detail.into(),
        }
    }

    /// A short, stable machine-readable tag for the error kind, independent
    /// of the interpolated message. Used when recording `error_detail`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::InvalidOpcode { .. } => "InvalidOpcode",
            Self::StackOverflow { .. } => "StackOverflow",
            Self::StackUnderflow => "StackUnderflow",
            Self::FrameOverflow { .. } => "FrameOverflow",
            Self::FrameUnderflow => "FrameUnderflow",
            Self::LocalOutOfRange { .. } => "LocalOutOfRange",
            Self::TypeMismatch { .. } => "TypeMismatch",
            Self::InvalidProgram { .. } => "InvalidProgram",
            Self::StringOverflow { .. } => "StringOverflow",
            Self::Syscall { .. } => "Syscall",
        }
    }
}

/// Convenience alias used throughout the crate.
pub type VmResult<T> = Result<T, VmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_name_is_stable() {
        assert_eq!(VmError::StackUnderflow.kind_name(), "StackUnderflow");
        assert_eq!(
            VmError::type_mismatch("need Int").kind_name(),
            "TypeMismatch"
        );
    }

    #[test]
    fn display_embeds_context() {
        let err = VmError::StackOverflow { capacity: 1024 };
        assert!(err.to_string().contains("1024"));
    }
}
