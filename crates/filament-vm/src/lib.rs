//! Filament VM - address-based bytecode ISA and interpreter.
//!
//! Programs are a flat instruction stream plus a data table of allocated
//! variables. Instructions address memory slots directly; there is no
//! operand stack. The interpreter executes a named entry function to
//! completion with explicit call/return and branch semantics, against a
//! flat `i32` memory array and a modeled pixel surface.

pub mod data;
pub mod error;
pub mod instruction;
pub mod machine;
pub mod opcode;
pub mod value;
pub mod vm;

pub use data::{format_data_table, DataEntry, DataKind, RecordField};
pub use error::RuntimeError;
pub use instruction::{
    AluOp, ConvKind, Instruction, LibFunc, MemRef, Outcome, VectorAluOp, VectorTarget, Word,
};
pub use machine::{Machine, PixelBuffer, PixelChannel, PIXEL_ADDR};
pub use opcode::Opcode;
pub use value::{f16_from_float, f16_to_float, ValueType, F16_ONE};
pub use vm::{assemble, disassemble, RegisterValue, Vm, VmConfig};
