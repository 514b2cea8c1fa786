//! Host syscall subsystem: a static contract table (C3) plus a dispatch
//! layer (C4) that validates calls against it before invoking a
//! host-bound handler.

pub mod contract;
pub mod dispatch;

pub use contract::{ContractStatus, SyscallContract, ValueType};
pub use dispatch::{DispatchStatus, SyscallBinding, SyscallHandler};
