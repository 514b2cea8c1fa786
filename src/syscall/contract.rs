//! Syscall contracts (C3): a static table of `{ id, target, arg types,
//! return type }` rows the engine ships with, mirroring the reference
//! implementation's registered host surface.
//!
//! The table is data, not host-provided — a consuming host binds handlers
//! for a subset of these targets (or none); an unbound contract simply
//! cannot be dispatched (see [`crate::syscall::dispatch`]).

use crate::value::Value;

/// The value-type tags a syscall argument or return value can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// No value.
    Void,
    /// A 64-bit integer.
    Int,
    /// A boolean.
    Bool,
    /// A string.
    String,
    /// A node handle.
    Node,
}

/// Classifies a runtime [`Value`] into its contract-level [`ValueType`].
pub fn value_type(value: &Value) -> ValueType {
    match value {
        Value::Void => ValueType::Void,
        Value::Int(_) => ValueType::Int,
        Value::Bool(_) => ValueType::Bool,
        Value::String(_) => ValueType::String,
        Value::Node(_) => ValueType::Node,
    }
}

/// One row of the static syscall contract table.
#[derive(Debug, Clone, Copy)]
pub struct SyscallContract {
    /// The syscall's stable numeric id.
    pub id: u32,
    /// The syscall's target string, as passed to `CALL_SYS`.
    pub target: &'static str,
    /// Declared argument types, in position order.
    pub arg_types: &'static [ValueType],
    /// Declared return type.
    pub return_type: ValueType,
}

/// The built-in contract table. Ids, targets, and signatures mirror the
/// reference engine's full registered host surface: console I/O, process
/// introspection, platform identification, the `ui_*` windowing/drawing
/// surface, and the string utilities that duplicate dedicated opcodes. All
/// 23 rows the reference table declares are carried here; this table is
/// pure metadata; the crate never implements a handler itself; a host binds
/// whatever subset it actually supports via [`crate::syscall::dispatch::SyscallHandler`]
/// (see DESIGN.md).
pub static CONTRACTS: &[SyscallContract] = &[
    SyscallContract {
        id: 6,
        target: "sys.console_write",
        arg_types: &[ValueType::String],
        return_type: ValueType::Void,
    },
    SyscallContract {
        id: 7,
        target: "sys.console_writeLine",
        arg_types: &[ValueType::String],
        return_type: ValueType::Void,
    },
    SyscallContract {
        id: 8,
        target: "sys.console_readLine",
        arg_types: &[],
        return_type: ValueType::String,
    },
    SyscallContract {
        id: 9,
        target: "sys.console_readAllStdin",
        arg_types: &[],
        return_type: ValueType::String,
    },
    SyscallContract {
        id: 10,
        target: "sys.console_writeErrLine",
        arg_types: &[ValueType::String],
        return_type: ValueType::Void,
    },
    SyscallContract {
        id: 16,
        target: "sys.stdout_writeLine",
        arg_types: &[ValueType::String],
        return_type: ValueType::Void,
    },
    SyscallContract {
        id: 11,
        target: "sys.process_cwd",
        arg_types: &[],
        return_type: ValueType::String,
    },
    SyscallContract {
        id: 12,
        target: "sys.process_envGet",
        arg_types: &[ValueType::String],
        return_type: ValueType::String,
    },
    SyscallContract {
        id: 18,
        target: "sys.process_argv",
        arg_types: &[],
        return_type: ValueType::Node,
    },
    SyscallContract {
        id: 28,
        target: "sys.platform",
        arg_types: &[],
        return_type: ValueType::String,
    },
    SyscallContract {
        id: 29,
        target: "sys.arch",
        arg_types: &[],
        return_type: ValueType::String,
    },
    SyscallContract {
        id: 30,
        target: "sys.os_version",
        arg_types: &[],
        return_type: ValueType::String,
    },
    SyscallContract {
        id: 31,
        target: "sys.runtime",
        arg_types: &[],
        return_type: ValueType::String,
    },
    SyscallContract {
        id: 46,
        target: "sys.ui_createWindow",
        arg_types: &[ValueType::String, ValueType::Int, ValueType::Int],
        return_type: ValueType::Int,
    },
    SyscallContract {
        id: 47,
        target: "sys.ui_beginFrame",
        arg_types: &[ValueType::Int],
        return_type: ValueType::Void,
    },
    SyscallContract {
        id: 48,
        target: "sys.ui_drawRect",
        arg_types: &[
            ValueType::Int,
            ValueType::Int,
            ValueType::Int,
            ValueType::Int,
            ValueType::Int,
            ValueType::String,
        ],
        return_type: ValueType::Void,
    },
    SyscallContract {
        id: 49,
        target: "sys.ui_drawText",
        arg_types: &[
            ValueType::Int,
            ValueType::Int,
            ValueType::Int,
            ValueType::String,
            ValueType::String,
            ValueType::Int,
        ],
        return_type: ValueType::Void,
    },
    SyscallContract {
        id: 50,
        target: "sys.ui_endFrame",
        arg_types: &[ValueType::Int],
        return_type: ValueType::Void,
    },
    SyscallContract {
        id: 51,
        target: "sys.ui_pollEvent",
        arg_types: &[ValueType::Int],
        return_type: ValueType::Node,
    },
    SyscallContract {
        id: 52,
        target: "sys.ui_present",
        arg_types: &[ValueType::Int],
        return_type: ValueType::Void,
    },
    SyscallContract {
        id: 53,
        target: "sys.ui_closeWindow",
        arg_types: &[ValueType::Int],
        return_type: ValueType::Void,
    },
    SyscallContract {
        id: 54,
        target: "sys.ui_drawLine",
        arg_types: &[
            ValueType::Int,
            ValueType::Int,
            ValueType::Int,
            ValueType::Int,
            ValueType::Int,
            ValueType::String,
            ValueType::Int,
        ],
        return_type: ValueType::Void,
    },
    SyscallContract {
        id: 55,
        target: "sys.ui_drawEllipse",
        arg_types: &[
            ValueType::Int,
            ValueType::Int,
            ValueType::Int,
            ValueType::Int,
            ValueType::Int,
            ValueType::String,
        ],
        return_type: ValueType::Void,
    },
    SyscallContract {
        id: 56,
        target: "sys.ui_drawPath",
        arg_types: &[ValueType::Int, ValueType::String, ValueType::String, ValueType::Int],
        return_type: ValueType::Void,
    },
    SyscallContract {
        id: 57,
        target: "sys.ui_drawImage",
        arg_types: &[
            ValueType::Int,
            ValueType::Int,
            ValueType::Int,
            ValueType::Int,
            ValueType::Int,
            ValueType::String,
        ],
        return_type: ValueType::Void,
    },
    SyscallContract {
        id: 58,
        target: "sys.ui_getWindowSize",
        arg_types: &[ValueType::Int],
        return_type: ValueType::Node,
    },
    SyscallContract {
        id: 72,
        target: "sys.ui_waitFrame",
        arg_types: &[ValueType::Int],
        return_type: ValueType::Void,
    },
    SyscallContract {
        id: 26,
        target: "sys.str_utf8ByteCount",
        arg_types: &[ValueType::String],
        return_type: ValueType::Int,
    },
    SyscallContract {
        id: 59,
        target: "sys.str_substring",
        arg_types: &[ValueType::String, ValueType::Int, ValueType::Int],
        return_type: ValueType::String,
    },
    SyscallContract {
        id: 60,
        target: "sys.str_remove",
        arg_types: &[ValueType::String, ValueType::Int, ValueType::Int],
        return_type: ValueType::String,
    },
];

/// Outcome of validating a call against the contract table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractStatus {
    /// Validation passed.
    Ok,
    /// No contract registered for the target string.
    UnknownTarget,
    /// Argument count does not match the contract's declared arity.
    ArgCount,
    /// An argument's type does not match the contract's declared type at
    /// that position.
    ArgType,
    /// No contract registered for the numeric id.
    UnknownId,
}

impl ContractStatus {
    /// A stable, short machine-readable code, matching the reference
    /// engine's `AIVMCxxx` codes.
    pub fn code(self) -> &'static str {
        match self {
            ContractStatus::Ok => "AIVMC000",
            ContractStatus::UnknownTarget => "AIVMC001",
            ContractStatus::ArgCount => "AIVMC002",
            ContractStatus::ArgType => "AIVMC003",
            ContractStatus::UnknownId => "AIVMC004",
        }
    }

    /// A human-readable message for diagnostics.
    pub fn message(self) -> &'static str {
        match self {
            ContractStatus::Ok => "syscall contract validation passed",
            ContractStatus::UnknownTarget => "syscall target was not found",
            ContractStatus::ArgCount => "syscall argument count was invalid",
            ContractStatus::ArgType => "syscall argument type was invalid",
            ContractStatus::UnknownId => "syscall contract id was not found",
        }
    }
}

/// Looks up a contract by its target string.
pub fn find_by_target(target: &str) -> Option<&'static SyscallContract> {
    CONTRACTS.iter().find(|c| c.target == target)
}

/// Looks up a contract by its numeric id.
pub fn find_by_id(id: u32) -> Option<&'static SyscallContract> {
    CONTRACTS.iter().find(|c| c.id == id)
}

fn validate_against(contract: &SyscallContract, args: &[Value]) -> ContractStatus {
    if contract.arg_types.len() != args.len() {
        return ContractStatus::ArgCount;
    }
    for (expected, actual) in contract.arg_types.iter().zip(args.iter()) {
        if *expected != value_type(actual) {
            return ContractStatus::ArgType;
        }
    }
    ContractStatus::Ok
}

/// Validates a call by target string.
pub fn validate(target: &str, args: &[Value]) -> ContractStatus {
    match find_by_target(target) {
        Some(contract) => validate_against(contract, args),
        None => ContractStatus::UnknownTarget,
    }
}

/// Validates a call by numeric id.
pub fn validate_id(id: u32, args: &[Value]) -> ContractStatus {
    match find_by_id(id) {
        Some(contract) => validate_against(contract, args),
        None => ContractStatus::UnknownId,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::StringRef;
    use crate::value::StringStore;

    fn s() -> Value {
        Value::string(StringRef::new(StringStore::Arena, 0, 1))
    }

    #[test]
    fn unknown_target_is_reported() {
        assert_eq!(validate("sys.does_not_exist", &[]), ContractStatus::UnknownTarget);
    }

    #[test]
    fn arg_count_mismatch_is_reported() {
        assert_eq!(
            validate("sys.console_writeLine", &[]),
            ContractStatus::ArgCount
        );
    }

    #[test]
    fn arg_type_mismatch_is_reported() {
        assert_eq!(
            validate("sys.console_writeLine", &[Value::int(1)]),
            ContractStatus::ArgType
        );
    }

    #[test]
    fn well_formed_call_validates() {
        assert_eq!(validate("sys.console_writeLine", &[s()]), ContractStatus::Ok);
    }

    #[test]
    fn find_by_id_matches_find_by_target() {
        let by_target = find_by_target("sys.str_utf8ByteCount").unwrap();
        let by_id = find_by_id(26).unwrap();
        assert_eq!(by_target.id, by_id.id);
    }

    #[test]
    fn status_codes_are_stable() {
        assert_eq!(ContractStatus::Ok.code(), "AIVMC000");
        assert_eq!(ContractStatus::UnknownId.code(), "AIVMC004");
    }

    #[test]
    fn ui_draw_line_validates_its_seven_args() {
        let contract = find_by_id(54).expect("ui_drawLine is registered");
        assert_eq!(contract.target, "sys.ui_drawLine");
        assert_eq!(contract.arg_types.len(), 7);
        assert_eq!(
            validate("sys.ui_drawLine", &[Value::int(0); 7]),
            ContractStatus::ArgType
        );
    }

    #[test]
    fn ui_poll_event_returns_node() {
        let contract = find_by_target("sys.ui_pollEvent").expect("ui_pollEvent is registered");
        assert_eq!(contract.return_type, ValueType::Node);
        assert_eq!(validate("sys.ui_pollEvent", &[Value::int(1)]), ContractStatus::Ok);
    }

    #[test]
    fn console_read_all_stdin_and_stdout_write_line_are_registered() {
        assert!(find_by_id(9).is_some());
        assert!(find_by_id(16).is_some());
    }
}
