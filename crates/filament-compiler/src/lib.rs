//! Filament compiler - typed IR and builder for LED pixel programs.
//!
//! A surface-syntax front end (out of scope here) drives the [`Builder`]
//! with semantic-action calls as it walks a parsed program. The builder
//! registers declarations, lowers expressions and assignments into typed
//! IR, assembles control flow from labels and branches, allocates the
//! flat data table, and finally lowers every function body to the
//! `filament-vm` instruction stream.
//!
//! Two numeric domains flow through the compiler: 32-bit integers and
//! Q16.16 fixed-point. Expressions promote toward fixed-point;
//! assignments coerce toward the target's type.

pub mod builder;
pub mod error;
pub mod ir;

pub use builder::{Builder, FieldDef, Function, IndexKey, Optimizations};
pub use error::CompileError;
pub use ir::{select_alu, select_conv, BinOp, IrOp, Node, VarArena, VarId, VarKind, Variable};
