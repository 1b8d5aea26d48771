//! Compile-time diagnostics.
//!
//! Every variant carries the 1-based source line the front end reported
//! with the offending construct. Compile errors abort the compilation;
//! they are never used for control flow. Internal invariant violations
//! are panics with a "compiler bug:" prefix, not variants here.

use thiserror::Error;

/// Compiler result type alias.
pub type Result<T> = std::result::Result<T, CompileError>;

/// Errors detected while building or lowering a program.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    /// A name was used before any declaration registered it.
    #[error("variable '{name}' not declared (line {line})")]
    UndeclaredVariable { name: String, line: u32 },

    /// An `object.attribute` access named an object that does not exist.
    #[error("object '{name}' not declared (line {line})")]
    UndeclaredObject { name: String, line: u32 },

    /// A type name was registered twice.
    #[error("type '{name}' already defined (line {line})")]
    TypeRedefined { name: String, line: u32 },

    /// A record type was declared twice.
    #[error("record '{name}' already defined (line {line})")]
    RecordRedefined { name: String, line: u32 },

    /// An object was declared twice.
    #[error("object '{name}' already defined (line {line})")]
    ObjectRedefined { name: String, line: u32 },

    /// A PixelArray was declared twice.
    #[error("PixelArray '{name}' already defined (line {line})")]
    PixelArrayRedefined { name: String, line: u32 },

    /// A declaration referenced a type that was never defined.
    #[error("type '{name}' not defined (line {line})")]
    UnknownType { name: String, line: u32 },

    /// A subscript or field access was applied to something that cannot
    /// take it.
    #[error("invalid index '{name}' (line {line})")]
    InvalidSubscript { name: String, line: u32 },

    /// A field name did not resolve against the accumulated lookup type.
    #[error("field '{field}' not found in '{target}' (line {line})")]
    UnknownField {
        field: String,
        target: String,
        line: u32,
    },

    /// The right-hand side of an assignment referred to a whole compound.
    #[error("cannot assign from compound type '{value}' to '{target}' (line {line})")]
    AssignFromCompound {
        value: String,
        target: String,
        line: u32,
    },

    /// An array reduction intrinsic was called with the wrong number of
    /// arguments.
    #[error("array functions take one argument (line {line})")]
    WrongIntrinsicArity { line: u32 },

    /// A user function call's argument count does not match its
    /// parameter list.
    #[error("call to '{name}' expects {expected} arguments, got {found} (line {line})")]
    WrongCallArity {
        name: String,
        expected: usize,
        found: usize,
        line: u32,
    },

    /// A `for` loop's stop expression is not a scalar.
    #[error("invalid loop iteration count for '{name}' (line {line})")]
    InvalidLoopBound { name: String, line: u32 },

    /// A library call named no known intrinsic.
    #[error("unknown library function '{name}' (line {line})")]
    UnknownLibFunc { name: String, line: u32 },

    /// A pixel subscript resolved without a channel attribute.
    #[error("pixel access requires a channel attribute (line {line})")]
    MissingPixelChannel { line: u32 },
}
