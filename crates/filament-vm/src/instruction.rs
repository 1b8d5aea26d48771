//! The instruction set.
//!
//! Each variant knows how to execute itself against a [`Machine`] and how
//! to assemble itself into the wire word list. Execution returns an
//! explicit [`Outcome`]; control transfer is data, never an error or an
//! unwind. `Func` and `Label` are pseudo-instructions: they assemble to
//! nothing and exist only to mark offsets in the stream.
//!
//! # Wire format
//!
//! Every assembled instruction starts with its opcode word followed by its
//! operands in the order documented per variant (for example `MOV`
//! assembles as `[0x01, dest, src]`). Label and function operands are
//! word offsets into the assembled image. Vector operations carry an
//! object-type discriminator: 0 for a flat array target, 1 for a pixel
//! attribute, encoded as
//! `[opcode, obj_type, addr, length, stride, attr, operand]`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::error::RuntimeError;
use crate::machine::{Machine, PixelChannel, PIXEL_ADDR};
use crate::opcode::Opcode;
use crate::value::{f16_div, f16_mod, f16_mul};

/// A wire word. Addresses, lengths, and offsets all fit in 16 bits.
pub type Word = u16;

/// A memory operand: the slot address plus the element count of the
/// variable behind it (1 for scalars). The length never assembles for
/// scalar operands; it rides along for the operations that need a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemRef {
    /// Slot address.
    pub addr: u16,
    /// Element count of the referenced variable.
    pub len: u16,
}

impl MemRef {
    /// A scalar operand.
    pub fn scalar(addr: u16) -> Self {
        Self { addr, len: 1 }
    }
}

impl fmt::Display for MemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

/// What an executed instruction asks the run loop to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Fall through to the next instruction.
    Continue,
    /// Unconditional program-counter override to a label.
    Jump(String),
    /// Transfer to a function; the run loop pushes the return address.
    Call(String),
    /// Return to the caller, or finish the run if the call stack is empty.
    Return,
    /// Terminate the run immediately, independent of the call stack.
    Halt,
}

/// Binary ALU operation. The fixed-point arithmetic family has its own
/// opcodes; comparisons and logical operations are shared between the
/// integer and fixed-point domains because raw signed comparison is exact
/// for Q16.16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AluOp {
    CompEq,
    CompNeq,
    CompGt,
    CompGte,
    CompLt,
    CompLte,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    F16Add,
    F16Sub,
    F16Mul,
    F16Div,
    F16Mod,
}

impl AluOp {
    /// Wire opcode for this operation.
    pub fn opcode(self) -> Opcode {
        match self {
            AluOp::CompEq => Opcode::CompEq,
            AluOp::CompNeq => Opcode::CompNeq,
            AluOp::CompGt => Opcode::CompGt,
            AluOp::CompGte => Opcode::CompGte,
            AluOp::CompLt => Opcode::CompLt,
            AluOp::CompLte => Opcode::CompLte,
            AluOp::And => Opcode::And,
            AluOp::Or => Opcode::Or,
            AluOp::Add => Opcode::Add,
            AluOp::Sub => Opcode::Sub,
            AluOp::Mul => Opcode::Mul,
            AluOp::Div => Opcode::Div,
            AluOp::Mod => Opcode::Mod,
            AluOp::F16Add => Opcode::F16Add,
            AluOp::F16Sub => Opcode::F16Sub,
            AluOp::F16Mul => Opcode::F16Mul,
            AluOp::F16Div => Opcode::F16Div,
            AluOp::F16Mod => Opcode::F16Mod,
        }
    }

    /// Operator symbol for disassembly.
    pub fn symbol(self) -> &'static str {
        match self {
            AluOp::CompEq => "==",
            AluOp::CompNeq => "!=",
            AluOp::CompGt => ">",
            AluOp::CompGte => ">=",
            AluOp::CompLt => "<",
            AluOp::CompLte => "<=",
            AluOp::And => "AND",
            AluOp::Or => "OR",
            AluOp::Add | AluOp::F16Add => "+",
            AluOp::Sub | AluOp::F16Sub => "-",
            AluOp::Mul | AluOp::F16Mul => "*",
            AluOp::Div | AluOp::F16Div => "/",
            AluOp::Mod | AluOp::F16Mod => "%",
        }
    }

    /// Apply the operation to two raw slot values.
    ///
    /// Comparison and logical results are 0/1. Integer arithmetic wraps.
    /// Division or modulo by zero yields 0 in both domains.
    pub fn apply(self, a: i32, b: i32) -> i32 {
        match self {
            AluOp::CompEq => (a == b) as i32,
            AluOp::CompNeq => (a != b) as i32,
            AluOp::CompGt => (a > b) as i32,
            AluOp::CompGte => (a >= b) as i32,
            AluOp::CompLt => (a < b) as i32,
            AluOp::CompLte => (a <= b) as i32,
            AluOp::And => (a != 0 && b != 0) as i32,
            AluOp::Or => (a != 0 || b != 0) as i32,
            AluOp::Add | AluOp::F16Add => a.wrapping_add(b),
            AluOp::Sub | AluOp::F16Sub => a.wrapping_sub(b),
            AluOp::Mul => a.wrapping_mul(b),
            AluOp::Div => {
                if b == 0 {
                    warn!(dividend = a, "integer division by zero clamped to 0");
                    0
                } else {
                    a.wrapping_div(b)
                }
            }
            AluOp::Mod => {
                if b == 0 {
                    warn!(dividend = a, "integer modulo by zero clamped to 0");
                    0
                } else {
                    a.wrapping_rem(b)
                }
            }
            AluOp::F16Mul => f16_mul(a, b),
            AluOp::F16Div => {
                if b == 0 {
                    warn!(dividend = a, "fixed-point division by zero clamped to 0");
                }
                f16_div(a, b)
            }
            AluOp::F16Mod => f16_mod(a, b),
        }
    }
}

/// Element-wise operation applied by the vector instruction family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VectorAluOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Mov,
}

impl VectorAluOp {
    /// Wire opcode for this operation.
    pub fn opcode(self) -> Opcode {
        match self {
            VectorAluOp::Add => Opcode::Vadd,
            VectorAluOp::Sub => Opcode::Vsub,
            VectorAluOp::Mul => Opcode::Vmul,
            VectorAluOp::Div => Opcode::Vdiv,
            VectorAluOp::Mod => Opcode::Vmod,
            VectorAluOp::Mov => Opcode::Vmov,
        }
    }

    /// Operator symbol for disassembly.
    pub fn symbol(self) -> &'static str {
        match self {
            VectorAluOp::Add => "+",
            VectorAluOp::Sub => "-",
            VectorAluOp::Mul => "*",
            VectorAluOp::Div => "/",
            VectorAluOp::Mod => "%",
            VectorAluOp::Mov => "=",
        }
    }

    /// Apply the operation to one element.
    pub fn apply(self, element: i32, operand: i32) -> i32 {
        match self {
            VectorAluOp::Add => element.wrapping_add(operand),
            VectorAluOp::Sub => element.wrapping_sub(operand),
            VectorAluOp::Mul => element.wrapping_mul(operand),
            VectorAluOp::Div => {
                if operand == 0 {
                    0
                } else {
                    element.wrapping_div(operand)
                }
            }
            VectorAluOp::Mod => {
                if operand == 0 {
                    0
                } else {
                    element.wrapping_rem(operand)
                }
            }
            VectorAluOp::Mov => operand,
        }
    }
}

/// Type conversion applied by the conversion instruction family, keyed at
/// lowering time by the ordered (target type, source type) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConvKind {
    /// Integer to Q16.16: scale up by 65536.
    I32ToF16,
    /// Q16.16 to integer: truncate the fraction (arithmetic shift).
    F16ToI32,
    /// Bit-compatible domains (pixel-channel <-> integer): plain move.
    Mov,
}

impl ConvKind {
    /// Wire opcode for this conversion.
    pub fn opcode(self) -> Opcode {
        match self {
            ConvKind::I32ToF16 => Opcode::ConvI32ToF16,
            ConvKind::F16ToI32 => Opcode::ConvF16ToI32,
            ConvKind::Mov => Opcode::ConvMov,
        }
    }

    /// Apply the conversion to a raw slot value.
    pub fn apply(self, value: i32) -> i32 {
        match self {
            ConvKind::I32ToF16 => value.wrapping_shl(16),
            ConvKind::F16ToI32 => value >> 16,
            ConvKind::Mov => value,
        }
    }
}

/// Array reduction intrinsic executed by `LCALL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LibFunc {
    Len,
    Min,
    Max,
    Avg,
    Sum,
}

impl LibFunc {
    /// Resolve an intrinsic by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "len" => LibFunc::Len,
            "min" => LibFunc::Min,
            "max" => LibFunc::Max,
            "avg" => LibFunc::Avg,
            "sum" => LibFunc::Sum,
            _ => return None,
        })
    }

    /// Intrinsic name.
    pub fn name(self) -> &'static str {
        match self {
            LibFunc::Len => "len",
            LibFunc::Min => "min",
            LibFunc::Max => "max",
            LibFunc::Avg => "avg",
            LibFunc::Sum => "sum",
        }
    }

    /// Wire function id.
    pub fn id(self) -> u16 {
        match self {
            LibFunc::Len => 0,
            LibFunc::Min => 1,
            LibFunc::Max => 2,
            LibFunc::Avg => 3,
            LibFunc::Sum => 4,
        }
    }
}

/// Target of a vector operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorTarget {
    /// A flat array: `addr` is the slot holding the base address (the
    /// result of an INDEX), `len` and `stride` were captured at lowering
    /// time from the resolved target.
    Array {
        /// Slot holding the base address.
        addr: MemRef,
        /// Element count to touch.
        len: u16,
        /// Element stride.
        stride: u16,
    },
    /// A pixel channel; every element of the channel is touched.
    Pixel {
        /// The channel attribute.
        channel: PixelChannel,
    },
}

/// One instruction of the flat stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Function entry marker. Pseudo-instruction: assembles to nothing.
    Func {
        /// Function name.
        name: String,
        /// Formal parameter slots, for disassembly.
        params: Vec<MemRef>,
    },
    /// Jump target marker. Pseudo-instruction: assembles to nothing.
    Label {
        /// Unique label name.
        name: String,
    },
    /// No operation.
    Nop,
    /// Copy the source slot to the destination slot.
    Mov {
        dest: MemRef,
        src: MemRef,
    },
    /// Binary ALU operation on two operand slots into a result slot.
    Alu {
        op: AluOp,
        result: MemRef,
        op1: MemRef,
        op2: MemRef,
    },
    /// Logical not: result is 1 if the value is zero, else 0.
    Not {
        result: MemRef,
        value: MemRef,
    },
    /// Numeric domain conversion.
    Conv {
        kind: ConvKind,
        dest: MemRef,
        src: MemRef,
    },
    /// Unconditional branch.
    Jmp {
        target: String,
    },
    /// Branch if the value slot is zero.
    JmpIfZero {
        value: MemRef,
        target: String,
    },
    /// Branch if the value slot is not zero.
    JmpIfNotZero {
        value: MemRef,
        target: String,
    },
    /// Branch if the value slot is zero; otherwise decrement it and fall
    /// through. The countdown-loop primitive.
    JmpIfZeroDec {
        value: MemRef,
        target: String,
    },
    /// Branch if op1 >= op2.
    JmpIfGte {
        op1: MemRef,
        op2: MemRef,
        target: String,
    },
    /// Pre-increment the counter, then branch if it is still below the
    /// stop value. The for-loop primitive.
    JmpIfLessPreInc {
        counter: MemRef,
        stop: MemRef,
        target: String,
    },
    /// Diagnostic print of a memory slot.
    Print {
        value: MemRef,
    },
    /// Copy the value into the return slot (address 0) and signal return.
    Ret {
        value: MemRef,
    },
    /// Copy each actual parameter into the matching formal slot, then
    /// transfer to the function.
    Call {
        target: String,
        /// Call-site actuals.
        params: Vec<MemRef>,
        /// Callee formals.
        args: Vec<MemRef>,
    },
    /// Compute a flat address from a base and index values. An array
    /// dimension contributes `(index mod count) * stride`; a record
    /// dimension has stride 0 and contributes the index value itself (the
    /// field's offset constant).
    Index {
        result: MemRef,
        base: MemRef,
        indexes: Vec<MemRef>,
        counts: Vec<u16>,
        strides: Vec<u16>,
    },
    /// Dereference an address slot into the destination.
    LoadIndirect {
        dest: MemRef,
        addr: MemRef,
    },
    /// Store the source through an address slot.
    StoreIndirect {
        src: MemRef,
        addr: MemRef,
    },
    /// Fill the destination with a uniform random value in [start, end].
    Rand {
        dest: MemRef,
        start: MemRef,
        end: MemRef,
    },
    /// Fault the run if the value slot is zero.
    Assert {
        value: MemRef,
    },
    /// Terminate the run immediately.
    Halt,
    /// Array reduction intrinsic.
    LibCall {
        func: LibFunc,
        result: MemRef,
        params: Vec<MemRef>,
    },
    /// Apply a scalar operand across every element of the target.
    VectorOp {
        op: VectorAluOp,
        target: VectorTarget,
        value: MemRef,
    },
    /// Store one scalar into a pixel channel element.
    PixelStore {
        channel: PixelChannel,
        indexes: Vec<MemRef>,
        value: MemRef,
    },
}

impl Instruction {
    /// Execute against machine state, producing the next control action.
    pub fn execute(&self, m: &mut Machine) -> Result<Outcome, RuntimeError> {
        match self {
            Instruction::Func { .. } | Instruction::Label { .. } | Instruction::Nop => {
                Ok(Outcome::Continue)
            }

            Instruction::Mov { dest, src } => {
                let v = m.load(src.addr)?;
                m.store(dest.addr, v)?;
                Ok(Outcome::Continue)
            }

            Instruction::Alu {
                op,
                result,
                op1,
                op2,
            } => {
                let a = m.load(op1.addr)?;
                let b = m.load(op2.addr)?;
                m.store(result.addr, op.apply(a, b))?;
                Ok(Outcome::Continue)
            }

            Instruction::Not { result, value } => {
                let v = m.load(value.addr)?;
                m.store(result.addr, (v == 0) as i32)?;
                Ok(Outcome::Continue)
            }

            Instruction::Conv { kind, dest, src } => {
                let v = m.load(src.addr)?;
                m.store(dest.addr, kind.apply(v))?;
                Ok(Outcome::Continue)
            }

            Instruction::Jmp { target } => Ok(Outcome::Jump(target.clone())),

            Instruction::JmpIfZero { value, target } => {
                if m.load(value.addr)? == 0 {
                    Ok(Outcome::Jump(target.clone()))
                } else {
                    Ok(Outcome::Continue)
                }
            }

            Instruction::JmpIfNotZero { value, target } => {
                if m.load(value.addr)? != 0 {
                    Ok(Outcome::Jump(target.clone()))
                } else {
                    Ok(Outcome::Continue)
                }
            }

            Instruction::JmpIfZeroDec { value, target } => {
                let v = m.load(value.addr)?;
                if v == 0 {
                    Ok(Outcome::Jump(target.clone()))
                } else {
                    m.store(value.addr, v.wrapping_sub(1))?;
                    Ok(Outcome::Continue)
                }
            }

            Instruction::JmpIfGte { op1, op2, target } => {
                if m.load(op1.addr)? >= m.load(op2.addr)? {
                    Ok(Outcome::Jump(target.clone()))
                } else {
                    Ok(Outcome::Continue)
                }
            }

            Instruction::JmpIfLessPreInc {
                counter,
                stop,
                target,
            } => {
                let v = m.load(counter.addr)?.wrapping_add(1);
                m.store(counter.addr, v)?;
                if v < m.load(stop.addr)? {
                    Ok(Outcome::Jump(target.clone()))
                } else {
                    Ok(Outcome::Continue)
                }
            }

            Instruction::Print { value } => {
                let v = m.load(value.addr)?;
                tracing::info!(addr = value.addr, value = v, "print");
                Ok(Outcome::Continue)
            }

            Instruction::Ret { value } => {
                let v = m.load(value.addr)?;
                m.store(0, v)?;
                Ok(Outcome::Return)
            }

            Instruction::Call {
                target,
                params,
                args,
            } => {
                for (param, arg) in params.iter().zip(args.iter()) {
                    let v = m.load(param.addr)?;
                    m.store(arg.addr, v)?;
                }
                Ok(Outcome::Call(target.clone()))
            }

            Instruction::Index {
                result,
                base,
                indexes,
                counts,
                strides,
            } => {
                let mut addr = base.addr as i64;
                for (i, index) in indexes.iter().enumerate() {
                    let value = m.load(index.addr)? as i64;
                    if strides[i] == 0 {
                        // Record dimension: the index value is the field's
                        // offset constant.
                        addr += value;
                    } else {
                        let count = counts[i] as i64;
                        addr += value.rem_euclid(count) * strides[i] as i64;
                    }
                }
                m.store(result.addr, addr as i32)?;
                Ok(Outcome::Continue)
            }

            Instruction::LoadIndirect { dest, addr } => {
                let ptr = m.load(addr.addr)?;
                let v = m.load_at(ptr as i64)?;
                m.store(dest.addr, v)?;
                Ok(Outcome::Continue)
            }

            Instruction::StoreIndirect { src, addr } => {
                let ptr = m.load(addr.addr)?;
                let v = m.load(src.addr)?;
                m.store_at(ptr as i64, v)?;
                Ok(Outcome::Continue)
            }

            Instruction::Rand { dest, start, end } => {
                let lo = m.load(start.addr)?;
                let hi = m.load(end.addr)?;
                let v = m.rand_range(lo, hi);
                m.store(dest.addr, v)?;
                Ok(Outcome::Continue)
            }

            Instruction::Assert { value } => {
                if m.load(value.addr)? == 0 {
                    Err(RuntimeError::AssertionFailed { pc: m.pc })
                } else {
                    Ok(Outcome::Continue)
                }
            }

            Instruction::Halt => Ok(Outcome::Halt),

            Instruction::LibCall {
                func,
                result,
                params,
            } => {
                let target = params.first().ok_or_else(|| RuntimeError::InvalidLibCall {
                    message: format!("{} requires an argument", func.name()),
                })?;
                let base = target.addr as usize;
                let len = target.len as usize;
                let mut values = Vec::with_capacity(len);
                for offset in 0..len {
                    values.push(m.load_at((base + offset) as i64)?);
                }
                let v = match func {
                    LibFunc::Len => len as i32,
                    LibFunc::Min => values.iter().copied().min().unwrap_or(0),
                    LibFunc::Max => values.iter().copied().max().unwrap_or(0),
                    LibFunc::Sum => values.iter().fold(0i32, |acc, v| acc.wrapping_add(*v)),
                    LibFunc::Avg => {
                        let sum = values.iter().fold(0i64, |acc, v| acc + *v as i64);
                        (sum / len.max(1) as i64) as i32
                    }
                };
                m.store(result.addr, v)?;
                Ok(Outcome::Continue)
            }

            Instruction::VectorOp { op, target, value } => {
                let operand = m.load(value.addr)?;
                match target {
                    VectorTarget::Array { addr, len, stride } => {
                        let base = m.load(addr.addr)? as i64;
                        let stride = (*stride).max(1) as i64;
                        for i in 0..*len as i64 {
                            let slot = base + i * stride;
                            let element = m.load_at(slot)?;
                            m.store_at(slot, op.apply(element, operand))?;
                        }
                    }
                    VectorTarget::Pixel { channel } => {
                        m.pixels.apply(*channel, |element| op.apply(element, operand));
                    }
                }
                Ok(Outcome::Continue)
            }

            Instruction::PixelStore {
                channel,
                indexes,
                value,
            } => {
                let mut resolved = Vec::with_capacity(indexes.len());
                for index in indexes {
                    resolved.push(m.load(index.addr)?);
                }
                let v = m.load(value.addr)?;
                m.pixels.store(*channel, &resolved, v);
                Ok(Outcome::Continue)
            }
        }
    }

    /// Assemble into wire words, resolving label operands through the
    /// word-offset table. Pseudo-instructions assemble to nothing.
    pub fn assemble(
        &self,
        offsets: &indexmap::IndexMap<String, Word>,
    ) -> Result<Vec<Word>, RuntimeError> {
        let resolve = |name: &str| -> Result<Word, RuntimeError> {
            offsets
                .get(name)
                .copied()
                .ok_or_else(|| RuntimeError::UndefinedLabel(name.to_string()))
        };

        Ok(match self {
            Instruction::Func { .. } | Instruction::Label { .. } | Instruction::Nop => vec![],

            Instruction::Mov { dest, src } => vec![Opcode::Mov.wire() as Word, dest.addr, src.addr],

            Instruction::Alu {
                op,
                result,
                op1,
                op2,
            } => vec![op.opcode().wire() as Word, result.addr, op1.addr, op2.addr],

            Instruction::Not { result, value } => {
                vec![Opcode::Not.wire() as Word, result.addr, value.addr]
            }

            Instruction::Conv { kind, dest, src } => {
                vec![kind.opcode().wire() as Word, dest.addr, src.addr]
            }

            Instruction::Jmp { target } => vec![Opcode::Jmp.wire() as Word, resolve(target)?],

            Instruction::JmpIfZero { value, target } => {
                vec![Opcode::JmpIfZ.wire() as Word, value.addr, resolve(target)?]
            }

            Instruction::JmpIfNotZero { value, target } => {
                vec![Opcode::JmpIfNotZ.wire() as Word, value.addr, resolve(target)?]
            }

            Instruction::JmpIfZeroDec { value, target } => {
                vec![Opcode::JmpIfZDec.wire() as Word, value.addr, resolve(target)?]
            }

            Instruction::JmpIfGte { op1, op2, target } => vec![
                Opcode::JmpIfGte.wire() as Word,
                op1.addr,
                op2.addr,
                resolve(target)?,
            ],

            Instruction::JmpIfLessPreInc {
                counter,
                stop,
                target,
            } => vec![
                Opcode::JmpIfLessPreInc.wire() as Word,
                counter.addr,
                stop.addr,
                resolve(target)?,
            ],

            Instruction::Print { value } => vec![Opcode::Print.wire() as Word, value.addr],

            Instruction::Ret { value } => vec![Opcode::Ret.wire() as Word, value.addr],

            Instruction::Call {
                target,
                params,
                args,
            } => {
                let mut words = vec![
                    Opcode::Call.wire() as Word,
                    resolve(target)?,
                    params.len() as Word,
                ];
                for (param, arg) in params.iter().zip(args.iter()) {
                    words.push(param.addr);
                    words.push(arg.addr);
                }
                words
            }

            Instruction::Index {
                result,
                base,
                indexes,
                counts,
                strides,
            } => {
                let mut words = vec![
                    Opcode::Index.wire() as Word,
                    result.addr,
                    base.addr,
                    indexes.len() as Word,
                ];
                for (i, index) in indexes.iter().enumerate() {
                    words.push(index.addr);
                    words.push(counts[i]);
                    words.push(strides[i]);
                }
                words
            }

            Instruction::LoadIndirect { dest, addr } => {
                vec![Opcode::LoadIndirect.wire() as Word, dest.addr, addr.addr]
            }

            Instruction::StoreIndirect { src, addr } => {
                vec![Opcode::StoreIndirect.wire() as Word, addr.addr, src.addr]
            }

            Instruction::Rand { dest, start, end } => vec![
                Opcode::Rand.wire() as Word,
                dest.addr,
                start.addr,
                end.addr,
            ],

            Instruction::Assert { value } => vec![Opcode::Assert.wire() as Word, value.addr],

            Instruction::Halt => vec![Opcode::Halt.wire() as Word],

            Instruction::LibCall {
                func,
                result,
                params,
            } => {
                let mut words = vec![
                    Opcode::LCall.wire() as Word,
                    func.id(),
                    result.addr,
                    params.len() as Word,
                ];
                for param in params {
                    words.push(param.addr);
                    words.push(param.len);
                }
                words
            }

            Instruction::VectorOp { op, target, value } => match target {
                VectorTarget::Array { addr, len, stride } => vec![
                    op.opcode().wire() as Word,
                    0,
                    addr.addr,
                    *len,
                    *stride,
                    0,
                    value.addr,
                ],
                VectorTarget::Pixel { channel } => vec![
                    op.opcode().wire() as Word,
                    1,
                    PIXEL_ADDR,
                    0,
                    0,
                    channel.id(),
                    value.addr,
                ],
            },

            Instruction::PixelStore {
                channel,
                indexes,
                value,
            } => {
                let mut words = vec![
                    Opcode::PStore.wire() as Word,
                    channel.id(),
                    indexes.len() as Word,
                ];
                for index in indexes {
                    words.push(index.addr);
                }
                words.push(value.addr);
                words
            }
        })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Func { name, params } => {
                let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
                write!(f, "Func {}({})", name, params.join(", "))
            }
            Instruction::Label { name } => write!(f, "Label({name})"),
            Instruction::Nop => write!(f, "NOP"),
            Instruction::Mov { dest, src } => write!(f, "MOV {dest} <- {src}"),
            Instruction::Alu {
                op,
                result,
                op1,
                op2,
            } => write!(
                f,
                "{:<16} {:>6} <- {:>6} {:>4} {:>6}",
                op.opcode().mnemonic(),
                result,
                op1,
                op.symbol(),
                op2
            ),
            Instruction::Not { result, value } => write!(f, "NOT {result} <- {value}"),
            Instruction::Conv { kind, dest, src } => {
                write!(f, "{} {} <- {}", kind.opcode().mnemonic(), dest, src)
            }
            Instruction::Jmp { target } => write!(f, "JMP -> {target}"),
            Instruction::JmpIfZero { value, target } => {
                write!(f, "JMP_IF_Z, {value} -> {target}")
            }
            Instruction::JmpIfNotZero { value, target } => {
                write!(f, "JMP_IF_NOT_Z, {value} -> {target}")
            }
            Instruction::JmpIfZeroDec { value, target } => {
                write!(f, "JMP_IF_Z_DEC, {value} -> {target}")
            }
            Instruction::JmpIfGte { op1, op2, target } => {
                write!(f, "JMP_IF_GTE, {op1} >= {op2} -> {target}")
            }
            Instruction::JmpIfLessPreInc {
                counter,
                stop,
                target,
            } => write!(f, "JMP_IF_LESS_PRE_INC, ++{counter} < {stop} -> {target}"),
            Instruction::Print { value } => write!(f, "PRINT {value}"),
            Instruction::Ret { value } => write!(f, "RET {value}"),
            Instruction::Call { target, params, .. } => {
                let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
                write!(f, "CALL {}({})", target, params.join(", "))
            }
            Instruction::Index {
                result,
                base,
                indexes,
                ..
            } => {
                let idx: String = indexes.iter().map(|i| format!("[{i}]")).collect();
                write!(f, "INDEX {result} <- {base} {idx}")
            }
            Instruction::LoadIndirect { dest, addr } => {
                write!(f, "LOAD_INDIRECT {dest} <- *{addr}")
            }
            Instruction::StoreIndirect { src, addr } => {
                write!(f, "STORE_INDIRECT *{addr} <- {src}")
            }
            Instruction::Rand { dest, start, end } => {
                write!(f, "RAND {dest} <- rand({start}, {end})")
            }
            Instruction::Assert { value } => write!(f, "ASSERT {value} == TRUE"),
            Instruction::Halt => write!(f, "HALT"),
            Instruction::LibCall {
                func,
                result,
                params,
            } => {
                let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
                write!(f, "LCALL {}({}) -> {}", func.name(), params.join(", "), result)
            }
            Instruction::VectorOp { op, target, value } => match target {
                VectorTarget::Array { addr, len, .. } => write!(
                    f,
                    "{} *{} [{}] {}= {}",
                    op.opcode().mnemonic(),
                    addr,
                    len,
                    op.symbol(),
                    value
                ),
                VectorTarget::Pixel { channel } => write!(
                    f,
                    "{} pixels.{} {}= {}",
                    op.opcode().mnemonic(),
                    channel,
                    op.symbol(),
                    value
                ),
            },
            Instruction::PixelStore {
                channel,
                indexes,
                value,
            } => {
                let idx: String = indexes.iter().map(|i| format!("[{i}]")).collect();
                write!(f, "PSTORE pixels.{channel}{idx} = {value}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::PixelBuffer;

    fn machine(slots: usize) -> Machine {
        Machine::new(slots, PixelBuffer::new(2, 2), Some(0))
    }

    #[test]
    fn test_mov_assembles_opcode_dest_src() {
        let ins = Instruction::Mov {
            dest: MemRef::scalar(5),
            src: MemRef::scalar(3),
        };
        let words = ins.assemble(&indexmap::IndexMap::new()).unwrap();
        assert_eq!(words, vec![0x01, 5, 3]);
    }

    #[test]
    fn test_pseudo_instructions_assemble_to_nothing() {
        let offsets = indexmap::IndexMap::new();
        let func = Instruction::Func {
            name: "init".into(),
            params: vec![],
        };
        let label = Instruction::Label {
            name: "if.end.0".into(),
        };
        assert!(func.assemble(&offsets).unwrap().is_empty());
        assert!(label.assemble(&offsets).unwrap().is_empty());
    }

    #[test]
    fn test_jump_assembly_requires_label() {
        let ins = Instruction::Jmp {
            target: "nowhere".into(),
        };
        assert!(matches!(
            ins.assemble(&indexmap::IndexMap::new()),
            Err(RuntimeError::UndefinedLabel(_))
        ));
    }

    #[test]
    fn test_alu_compare_results_are_zero_one() {
        assert_eq!(AluOp::CompLt.apply(2, 3), 1);
        assert_eq!(AluOp::CompLt.apply(3, 2), 0);
        assert_eq!(AluOp::And.apply(7, 0), 0);
        assert_eq!(AluOp::And.apply(7, -1), 1);
        assert_eq!(AluOp::Or.apply(0, 0), 0);
    }

    #[test]
    fn test_division_by_zero_clamps() {
        assert_eq!(AluOp::Div.apply(10, 0), 0);
        assert_eq!(AluOp::Mod.apply(10, 0), 0);
        assert_eq!(AluOp::F16Div.apply(10 << 16, 0), 0);
    }

    #[test]
    fn test_fixed_family_rescales_mul() {
        let three_half = 3 << 15;
        assert_eq!(AluOp::F16Mul.apply(three_half, 2 << 16), 3 << 16);
        // The integer opcode on the same bits would double-scale.
        assert_ne!(AluOp::Mul.apply(three_half, 2 << 16), 3 << 16);
    }

    #[test]
    fn test_conversions_match_scale_factor() {
        assert_eq!(ConvKind::I32ToF16.apply(3), 3 << 16);
        assert_eq!(ConvKind::F16ToI32.apply((5 << 16) | 0x8000), 5);
        assert_eq!(ConvKind::Mov.apply(1234), 1234);
    }

    #[test]
    fn test_pre_inc_branch() {
        let mut m = machine(4);
        m.store(1, -1).unwrap();
        m.store(2, 2).unwrap();
        let ins = Instruction::JmpIfLessPreInc {
            counter: MemRef::scalar(1),
            stop: MemRef::scalar(2),
            target: "top.0".into(),
        };
        // -1 -> 0 < 2: taken. 0 -> 1 < 2: taken. 1 -> 2: not taken.
        assert_eq!(ins.execute(&mut m).unwrap(), Outcome::Jump("top.0".into()));
        assert_eq!(ins.execute(&mut m).unwrap(), Outcome::Jump("top.0".into()));
        assert_eq!(ins.execute(&mut m).unwrap(), Outcome::Continue);
        assert_eq!(m.load(1).unwrap(), 2);
    }

    #[test]
    fn test_zero_dec_branch_counts_down() {
        let mut m = machine(2);
        m.store(1, 2).unwrap();
        let ins = Instruction::JmpIfZeroDec {
            value: MemRef::scalar(1),
            target: "end.0".into(),
        };
        assert_eq!(ins.execute(&mut m).unwrap(), Outcome::Continue);
        assert_eq!(ins.execute(&mut m).unwrap(), Outcome::Continue);
        assert_eq!(ins.execute(&mut m).unwrap(), Outcome::Jump("end.0".into()));
        assert_eq!(m.load(1).unwrap(), 0);
    }

    #[test]
    fn test_ret_writes_return_slot() {
        let mut m = machine(4);
        m.store(3, 42).unwrap();
        let ins = Instruction::Ret {
            value: MemRef::scalar(3),
        };
        assert_eq!(ins.execute(&mut m).unwrap(), Outcome::Return);
        assert_eq!(m.load(0).unwrap(), 42);
    }

    #[test]
    fn test_call_copies_actuals_into_formals() {
        let mut m = machine(6);
        m.store(1, 10).unwrap();
        m.store(2, 20).unwrap();
        let ins = Instruction::Call {
            target: "f".into(),
            params: vec![MemRef::scalar(1), MemRef::scalar(2)],
            args: vec![MemRef::scalar(3), MemRef::scalar(4)],
        };
        assert_eq!(ins.execute(&mut m).unwrap(), Outcome::Call("f".into()));
        assert_eq!(m.load(3).unwrap(), 10);
        assert_eq!(m.load(4).unwrap(), 20);
    }

    #[test]
    fn test_index_record_dimension_adds_offset() {
        let mut m = machine(10);
        // Record base at 4; index slot 1 holds the offset constant 1.
        m.store(1, 1).unwrap();
        let ins = Instruction::Index {
            result: MemRef::scalar(2),
            base: MemRef::scalar(4),
            indexes: vec![MemRef::scalar(1)],
            counts: vec![0],
            strides: vec![0],
        };
        ins.execute(&mut m).unwrap();
        assert_eq!(m.load(2).unwrap(), 5);
    }

    #[test]
    fn test_index_array_dimension_wraps() {
        let mut m = machine(10);
        m.store(1, 5).unwrap(); // index 5 into a 4-element array wraps to 1
        let ins = Instruction::Index {
            result: MemRef::scalar(2),
            base: MemRef::scalar(4),
            indexes: vec![MemRef::scalar(1)],
            counts: vec![4],
            strides: vec![1],
        };
        ins.execute(&mut m).unwrap();
        assert_eq!(m.load(2).unwrap(), 5);
    }

    #[test]
    fn test_indirect_round_trip() {
        let mut m = machine(8);
        m.store(1, 6).unwrap(); // address slot points at 6
        m.store(2, 99).unwrap();
        Instruction::StoreIndirect {
            src: MemRef::scalar(2),
            addr: MemRef::scalar(1),
        }
        .execute(&mut m)
        .unwrap();
        assert_eq!(m.load(6).unwrap(), 99);
        Instruction::LoadIndirect {
            dest: MemRef::scalar(3),
            addr: MemRef::scalar(1),
        }
        .execute(&mut m)
        .unwrap();
        assert_eq!(m.load(3).unwrap(), 99);
    }

    #[test]
    fn test_assert_faults_on_zero() {
        let mut m = machine(2);
        m.pc = 7;
        let ins = Instruction::Assert {
            value: MemRef::scalar(1),
        };
        assert!(matches!(
            ins.execute(&mut m),
            Err(RuntimeError::AssertionFailed { pc: 7 })
        ));
        m.store(1, 1).unwrap();
        assert_eq!(ins.execute(&mut m).unwrap(), Outcome::Continue);
    }

    #[test]
    fn test_vector_op_touches_whole_array() {
        let mut m = machine(10);
        m.store(1, 4).unwrap(); // base address of the array
        m.store(2, 3).unwrap(); // operand
        for slot in 4..8 {
            m.store(slot, 10).unwrap();
        }
        Instruction::VectorOp {
            op: VectorAluOp::Add,
            target: VectorTarget::Array {
                addr: MemRef::scalar(1),
                len: 4,
                stride: 1,
            },
            value: MemRef::scalar(2),
        }
        .execute(&mut m)
        .unwrap();
        for slot in 4..8 {
            assert_eq!(m.load(slot).unwrap(), 13);
        }
    }

    #[test]
    fn test_pixel_vector_op_shares_vector_opcodes() {
        let ins = Instruction::VectorOp {
            op: VectorAluOp::Add,
            target: VectorTarget::Pixel {
                channel: PixelChannel::Hue,
            },
            value: MemRef::scalar(2),
        };
        let words = ins.assemble(&indexmap::IndexMap::new()).unwrap();
        assert_eq!(words[0], Opcode::Vadd.wire() as Word);
        assert_eq!(words[1], 1); // pixel object type
        assert_eq!(words[2], PIXEL_ADDR);
    }

    #[test]
    fn test_lib_call_reductions() {
        let mut m = machine(10);
        for (i, v) in [4, -2, 7, 3].iter().enumerate() {
            m.store(4 + i as u16, *v).unwrap();
        }
        let array = MemRef { addr: 4, len: 4 };
        let cases = [
            (LibFunc::Len, 4),
            (LibFunc::Min, -2),
            (LibFunc::Max, 7),
            (LibFunc::Sum, 12),
            (LibFunc::Avg, 3),
        ];
        for (func, expected) in cases {
            Instruction::LibCall {
                func,
                result: MemRef::scalar(1),
                params: vec![array],
            }
            .execute(&mut m)
            .unwrap();
            assert_eq!(m.load(1).unwrap(), expected, "{}", func.name());
        }
    }
}
