//! VM execution state.
//!
//! The machine moves through a small, linear state graph: `Ready ->
//! Running -> {Halted | Error}`. There is no breakpoint/debugger state and
//! no going back — once `Halted` or `Error`, a run is over; a driver that
//! wants to run again calls `reset_state` on the surrounding
//! [`crate::execution_state::ExecutionState`].

/// The status of a [`crate::execution_state::ExecutionState`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum VmStatus {
    /// Constructed or reset, not yet stepped.
    #[default]
    Ready,
    /// At least one instruction has executed and no terminal condition has
    /// been reached.
    Running,
    /// `HALT` executed, or a top-level `RET` unwound with no frame left.
    Halted,
    /// An instruction raised a fatal error; sticky for the rest of the run.
    Error,
}

impl VmStatus {
    /// Whether this status is terminal (`step`/`run` must not be called
    /// again without a reset).
    pub fn is_terminal(self) -> bool {
        matches!(self, VmStatus::Halted | VmStatus::Error)
    }

    /// Whether this status represents a successful halt.
    pub fn is_halted(self) -> bool {
        matches!(self, VmStatus::Halted)
    }

    /// Whether this status represents a fatal error.
    pub fn is_error(self) -> bool {
        matches!(self, VmStatus::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_ready() {
        assert_eq!(VmStatus::default(), VmStatus::Ready);
    }

    #[test]
    fn only_halted_and_error_are_terminal() {
        assert!(!VmStatus::Ready.is_terminal());
        assert!(!VmStatus::Running.is_terminal());
        assert!(VmStatus::Halted.is_terminal());
        assert!(VmStatus::Error.is_terminal());
    }
}
