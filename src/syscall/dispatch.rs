//! Syscall dispatch (C4): resolving a target string against a host's
//! binding table, invoking the bound handler, and checking its result
//! against the static contract table.

use log::warn;

use crate::error::{VmError, VmResult};
use crate::syscall::contract::{self, value_type, ContractStatus};
use crate::value::Value;

/// A host-provided syscall handler.
///
/// Modeled as a trait rather than a raw function pointer so a host can
/// close over its own state (an open file table, a RNG, captured stdio).
/// Returns the reference ABI's `(status, value)` pair: `0` is success,
/// any other value is a host-reported failure and `value` is ignored.
pub trait SyscallHandler {
    /// Executes the call and returns `(status, value)`.
    fn call(&self, target: &str, args: &[Value]) -> (i32, Value);
}

impl<F> SyscallHandler for F
where
    F: Fn(&str, &[Value]) -> (i32, Value),
{
    fn call(&self, target: &str, args: &[Value]) -> (i32, Value) {
        self(target, args)
    }
}

/// One entry in a host's binding table: a target string paired with the
/// handler that serves it.
pub struct SyscallBinding<'a> {
    /// The target string this binding serves.
    pub target: &'a str,
    /// The handler to invoke.
    pub handler: &'a dyn SyscallHandler,
}

/// Outcome of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// The call succeeded.
    Ok,
    /// The handler or target was absent (null-guard failure).
    Invalid,
    /// Reserved for parity with the reference ABI's "result pointer was
    /// null" case; never produced by this port, since `SyscallHandler`
    /// always yields a concrete [`Value`].
    NullResult,
    /// No binding in the table matches the target.
    NotFound,
    /// Contract validation failed before dispatch was attempted.
    Contract,
    /// The handler's result tag did not match the contract's declared
    /// return type.
    ReturnType,
}

/// Unchecked passthrough to `handler`, with null guards matching the
/// reference ABI: a missing handler yields `Invalid` and `Value::Void`
/// without calling anything.
pub fn invoke(
    handler: Option<&dyn SyscallHandler>,
    target: &str,
    args: &[Value],
) -> (DispatchStatus, Value) {
    match handler {
        None => (DispatchStatus::Invalid, Value::void()),
        Some(handler) => {
            let (status, value) = handler.call(target, args);
            if status == 0 {
                (DispatchStatus::Ok, value)
            } else {
                (DispatchStatus::Invalid, Value::void())
            }
        }
    }
}

/// Linear scan of `bindings` for the first entry whose target matches;
/// invokes it via [`invoke`] on a hit, or reports `NotFound`.
pub fn dispatch(bindings: &[SyscallBinding<'_>], target: &str, args: &[Value]) -> (DispatchStatus, Value) {
    match bindings.iter().find(|binding| binding.target == target) {
        Some(binding) => invoke(Some(binding.handler), target, args),
        None => (DispatchStatus::NotFound, Value::void()),
    }
}

/// Validates `target`/`args` against the static contract table, dispatches
/// to `bindings` on success, and checks the result's tag against the
/// contract's declared return type.
///
/// This is the entry point `CALL_SYS`/`ASYNC_CALL_SYS` use; any non-success
/// outcome is surfaced as [`VmError::Syscall`] carrying both the contract
/// and dispatch status codes for diagnostics.
pub fn dispatch_checked(
    bindings: &[SyscallBinding<'_>],
    target: &str,
    args: &[Value],
) -> VmResult<Value> {
    let contract_status = contract::validate(target, args);
    if contract_status != ContractStatus::Ok {
        warn!(
            "syscall contract validation failed for {target}: {}",
            contract_status.code()
        );
        return Err(VmError::syscall(format!(
            "{} {}",
            contract_status.code(),
            target
        )));
    }

    let (status, value) = dispatch(bindings, target, args);
    if status != DispatchStatus::Ok {
        warn!("syscall dispatch failed for {target}: {status:?}");
        return Err(VmError::syscall(format!("{status:?} {target}")));
    }

    // contract::validate above already confirmed a contract row exists.
    let contract = contract::find_by_target(target).expect("validated target must have a contract");
    if value_type(&value) != contract.return_type {
        warn!("syscall {target} returned a value of the wrong type");
        return Err(VmError::syscall(format!("ReturnType {target}")));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_ok(_target: &str, args: &[Value]) -> (i32, Value) {
        (0, args.first().copied().unwrap_or(Value::void()))
    }

    fn always_fails(_target: &str, _args: &[Value]) -> (i32, Value) {
        (-1, Value::void())
    }

    #[test]
    fn unbound_target_is_not_found() {
        let (status, _) = dispatch(&[], "sys.console_writeLine", &[]);
        assert_eq!(status, DispatchStatus::NotFound);
    }

    #[test]
    fn missing_handler_is_invalid() {
        let (status, value) = invoke(None, "sys.console_writeLine", &[]);
        assert_eq!(status, DispatchStatus::Invalid);
        assert_eq!(value, Value::void());
    }

    #[test]
    fn contract_failure_is_reported_before_dispatch() {
        let bindings = [SyscallBinding {
            target: "sys.console_writeLine",
            handler: &echo_ok,
        }];
        let err = dispatch_checked(&bindings, "sys.console_writeLine", &[]).unwrap_err();
        assert!(matches!(err, VmError::Syscall { .. }));
    }

    #[test]
    fn host_failure_surfaces_as_syscall_error() {
        let bindings = [SyscallBinding {
            target: "sys.console_readLine",
            handler: &always_fails,
        }];
        let err = dispatch_checked(&bindings, "sys.console_readLine", &[]).unwrap_err();
        assert!(matches!(err, VmError::Syscall { .. }));
    }

    #[test]
    fn unbound_target_surfaces_not_found() {
        let err = dispatch_checked(&[], "sys.process_cwd", &[]).unwrap_err();
        assert!(matches!(err, VmError::Syscall { .. }));
    }
}
