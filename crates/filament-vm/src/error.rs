//! Runtime faults raised while executing a program.
//!
//! These are user-observable failures of a well-formed instruction stream.
//! They are distinct from internal invariant violations (panics with a
//! "vm bug:" prefix), which indicate a defect in the compiler or VM rather
//! than in the program being run.

use thiserror::Error;

/// Runtime result type alias.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur during program execution.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// The requested entry function does not exist in the instruction
    /// stream.
    #[error("function '{0}' not found")]
    UnknownFunction(String),

    /// A jump or call named a label with no matching definition.
    ///
    /// Labels are resolved from the instruction stream before execution
    /// begins, so this indicates a truncated or mislinked program.
    #[error("undefined label '{0}'")]
    UndefinedLabel(String),

    /// An ASSERT instruction observed a zero operand.
    ///
    /// Execution halts at the failing instruction; the program counter
    /// identifies it in the disassembly.
    #[error("assertion failed at pc {pc}")]
    AssertionFailed {
        /// Offset of the failing instruction in the instruction stream.
        pc: usize,
    },

    /// A memory access fell outside the allocated data table.
    #[error("address {addr} out of bounds (memory size {size})")]
    AddressOutOfBounds {
        /// The offending address. Wider than a slot address so indirect
        /// accesses through corrupted values can be reported as seen.
        addr: i64,
        /// Number of allocated memory slots.
        size: usize,
    },

    /// The configured cycle budget was exhausted before the run finished.
    ///
    /// Compiled loops are bounded by construction, so hitting the budget
    /// means either runaway intrinsic misuse or a budget sized too small
    /// for the program.
    #[error("cycle limit of {limit} exceeded")]
    CycleLimitExceeded {
        /// The budget that was exceeded.
        limit: u64,
    },

    /// A library call instruction could not be executed.
    #[error("invalid library call: {message}")]
    InvalidLibCall {
        /// Description of the problem.
        message: String,
    },
}
