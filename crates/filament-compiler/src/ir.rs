//! The typed intermediate representation.
//!
//! All variables of a compilation unit live in a single [`VarArena`] and
//! are referred to by [`VarId`] handles; "address of X" is a plain handle
//! with no lifetime attached. Function bodies are ordered lists of
//! [`IrOp`]s. Lowering is pure: a node reads the arena and produces one or
//! more instructions, never mutating builder state - all symbol table work
//! happens earlier, during emission.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use filament_vm::{
    f16_to_float, AluOp, ConvKind, Instruction, LibFunc, MemRef, PixelChannel, ValueType,
    VectorAluOp, VectorTarget,
};

use crate::error::{CompileError, Result};

/// Handle to a variable in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(u32);

/// The universal entity: everything nameable or addressable is a
/// `Variable` of some [`VarKind`].
#[derive(Debug, Clone)]
pub struct Variable {
    /// Identifier, temp-slot id, or literal rendering for constants.
    /// Locals are qualified by their owning function during allocation.
    pub name: String,
    /// Shape and type of the variable.
    pub kind: VarKind,
    /// Number of memory slots (1 for scalars).
    pub length: u16,
    /// Memory slot, unassigned until allocation.
    pub addr: Option<u16>,
    /// Source line of the declaration.
    pub line: u32,
}

/// Shape of a variable.
#[derive(Debug, Clone)]
pub enum VarKind {
    /// A single typed slot.
    Scalar(ValueType),
    /// An immediate literal, memoized by value in the global namespace.
    Const { value: i32, ty: ValueType },
    /// A dimension over a recursively typed element.
    Array { elem: VarId, count: u16 },
    /// A named aggregate of fields at constant offsets.
    Record {
        type_name: String,
        fields: IndexMap<String, VarId>,
        /// Field name to the constant holding that field's offset.
        offsets: IndexMap<String, VarId>,
    },
    /// Refers to another variable; the one place aliasing exists.
    /// `target` is recorded when a compound lookup resolves.
    Address { target: Option<VarId> },
    /// A hardware-backed pixel array object.
    PixelArray,
    /// One channel attribute of a pixel array. Not flat memory; carries
    /// the sentinel address.
    PixelAttr { obj: String, channel: PixelChannel },
    /// A deferred pixel element access produced by compound lookup.
    PixelIndex {
        obj: String,
        channel: PixelChannel,
        indexes: Vec<VarId>,
    },
    /// A generic (non-pixel) object declaration.
    Object { type_name: String },
}

/// Owns every variable for the compilation unit's lifetime.
#[derive(Debug, Default)]
pub struct VarArena {
    vars: Vec<Variable>,
}

impl VarArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable, returning its handle.
    pub fn alloc(&mut self, var: Variable) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(var);
        id
    }

    pub fn get(&self, id: VarId) -> &Variable {
        &self.vars[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.vars[id.0 as usize]
    }

    /// Element count of the variable.
    pub fn length(&self, id: VarId) -> u16 {
        self.get(id).length
    }

    /// Unwrap nested kinds down to the underlying value type. Records,
    /// pixel arrays, and generic objects have no base value type.
    pub fn base_type(&self, id: VarId) -> Option<ValueType> {
        match &self.get(id).kind {
            VarKind::Scalar(ty) | VarKind::Const { ty, .. } => Some(*ty),
            VarKind::Array { elem, .. } => self.base_type(*elem),
            VarKind::Address { target: Some(t) } => self.base_type(*t),
            VarKind::Address { target: None } => Some(ValueType::Addr),
            VarKind::PixelAttr { .. } | VarKind::PixelIndex { .. } => Some(ValueType::Gfx16),
            VarKind::Record { .. } | VarKind::PixelArray | VarKind::Object { .. } => None,
        }
    }

    /// Find the record field registered under the given offset constant.
    pub fn field_from_offset(&self, record: VarId, key: VarId) -> Option<VarId> {
        match &self.get(record).kind {
            VarKind::Record { fields, offsets, .. } => offsets
                .iter()
                .find(|(_, offset)| **offset == key)
                .and_then(|(name, _)| fields.get(name))
                .copied(),
            _ => None,
        }
    }

    /// Resolve the statically known type reached by applying the given
    /// subscript keys to a base variable. Arrays strip one dimension per
    /// key; records resolve the key as an offset constant; pixel entities
    /// absorb indexes without changing type.
    pub fn resolve_keys(&self, base: VarId, keys: &[VarId], line: u32) -> Result<VarId> {
        let mut current = base;
        for key in keys {
            current = match &self.get(current).kind {
                VarKind::Array { elem, .. } => *elem,
                VarKind::Record { .. } => self.field_from_offset(current, *key).ok_or_else(|| {
                    CompileError::UnknownField {
                        field: self.get(*key).name.clone(),
                        target: self.get(current).name.clone(),
                        line,
                    }
                })?,
                VarKind::PixelArray | VarKind::PixelAttr { .. } => current,
                _ => {
                    return Err(CompileError::InvalidSubscript {
                        name: self.get(current).name.clone(),
                        line,
                    })
                }
            };
        }
        Ok(current)
    }

    /// Human-readable rendering for the program dump.
    pub fn describe(&self, id: VarId) -> String {
        let var = self.get(id);
        match &var.kind {
            VarKind::Scalar(ty) => format!("Var ({}, {})", var.name, ty),
            VarKind::Const { value, ty } => {
                if *ty == ValueType::F16 {
                    format!("Const ({}, f16)", f16_to_float(*value))
                } else {
                    format!("Const ({}, {})", value, ty)
                }
            }
            VarKind::Array { elem, count } => {
                let base = self
                    .base_type(*elem)
                    .map(|t| t.name().to_string())
                    .unwrap_or_else(|| "?".to_string());
                format!("Array ({}, {}, {}:{})", var.name, base, count, var.length)
            }
            VarKind::Record { type_name, .. } => {
                format!("Record ({}, {}, {})", var.name, type_name, var.length)
            }
            VarKind::Address { target } => {
                let target = target
                    .map(|t| self.get(t).name.clone())
                    .unwrap_or_else(|| "?".to_string());
                format!("Addr ({} -> {})", var.name, target)
            }
            VarKind::PixelArray => format!("PixelArray {}", var.name),
            VarKind::PixelAttr { obj, channel } => format!("PixelAttr ({obj}.{channel})"),
            VarKind::PixelIndex { obj, channel, indexes } => {
                let idx: String = indexes
                    .iter()
                    .map(|i| format!("[{}]", self.get(*i).name))
                    .collect();
                format!("PixelIndex ({obj}.{channel}{idx})")
            }
            VarKind::Object { type_name } => format!("Object {}({})", var.name, type_name),
        }
    }
}

/// Binary operator symbols accepted by the builder. A closed set; each
/// base type has its own instruction family for the arithmetic subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    LogicalAnd,
    LogicalOr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Select the concrete ALU operation for a result base type and operator
/// symbol. Comparisons and logical operations are shared between domains;
/// arithmetic dispatches per type.
pub fn select_alu(ty: ValueType, op: BinOp) -> AluOp {
    match op {
        BinOp::Eq => AluOp::CompEq,
        BinOp::Neq => AluOp::CompNeq,
        BinOp::Gt => AluOp::CompGt,
        BinOp::Gte => AluOp::CompGte,
        BinOp::Lt => AluOp::CompLt,
        BinOp::Lte => AluOp::CompLte,
        BinOp::LogicalAnd => AluOp::And,
        BinOp::LogicalOr => AluOp::Or,
        BinOp::Add => match ty {
            ValueType::F16 => AluOp::F16Add,
            _ => AluOp::Add,
        },
        BinOp::Sub => match ty {
            ValueType::F16 => AluOp::F16Sub,
            _ => AluOp::Sub,
        },
        BinOp::Mul => match ty {
            ValueType::F16 => AluOp::F16Mul,
            _ => AluOp::Mul,
        },
        BinOp::Div => match ty {
            ValueType::F16 => AluOp::F16Div,
            _ => AluOp::Div,
        },
        BinOp::Mod => match ty {
            ValueType::F16 => AluOp::F16Mod,
            _ => AluOp::Mod,
        },
    }
}

/// Select the conversion for an ordered (target type, source type) pair.
/// Only these pairs are legal; pixel-channel storage is bit-compatible
/// with integers, so those conversions are plain moves.
pub fn select_conv(target: ValueType, source: ValueType) -> ConvKind {
    match (target, source) {
        (ValueType::I32, ValueType::F16) => ConvKind::F16ToI32,
        (ValueType::F16, ValueType::I32) => ConvKind::I32ToF16,
        (ValueType::I32, ValueType::Gfx16)
        | (ValueType::Gfx16, ValueType::I32)
        | (ValueType::Gfx16, ValueType::F16) => ConvKind::Mov,
        (target, source) => {
            panic!("compiler bug: illegal conversion {source:?} -> {target:?}")
        }
    }
}

/// One IR operation in a function body.
#[derive(Debug, Clone)]
pub struct IrOp {
    pub node: Node,
    /// Source line that produced the node.
    pub line: u32,
}

/// The closed set of IR operations.
#[derive(Debug, Clone)]
pub enum Node {
    /// Scalar move.
    Assign { target: VarId, value: VarId },
    /// Whole-compound move through a computed address or pixel channel.
    VectorAssign { target: VarId, value: VarId },
    /// Whole-compound arithmetic through a computed address or pixel
    /// channel.
    VectorOp {
        op: BinOp,
        target: VarId,
        value: VarId,
    },
    /// Binary operation into a result temp.
    Binop {
        op: BinOp,
        result: VarId,
        left: VarId,
        right: VarId,
    },
    /// Logical not into a result temp.
    UnaryNot { result: VarId, value: VarId },
    /// Convert the value into the result's type.
    Convert { result: VarId, value: VarId },
    /// Convert a slot on top of itself after an indirect load of a
    /// mismatched type.
    ConvertInPlace { target: VarId, src_ty: ValueType },
    /// User function call; the result temp is filled from the return slot.
    Call {
        name: String,
        params: Vec<VarId>,
        args: Vec<VarId>,
        result: VarId,
    },
    /// Library/intrinsic call.
    LibCall {
        name: String,
        params: Vec<VarId>,
        result: VarId,
    },
    /// Jump target.
    Label { name: String },
    /// Branch to the label if the value is zero.
    BranchZero { value: VarId, target: String },
    /// Branch to the label if the value is not zero.
    BranchNotZero { value: VarId, target: String },
    /// Unconditional jump.
    Jump { target: String },
    /// The for-loop back edge: pre-increment, branch while below stop.
    JumpLessPreInc {
        target: String,
        counter: VarId,
        stop: VarId,
    },
    /// Return a value to the caller.
    Return { value: VarId },
    /// Runtime invariant check.
    Assert { value: VarId },
    /// Compute the flat address of a compound access.
    Index {
        result: VarId,
        target: VarId,
        indexes: Vec<VarId>,
    },
    /// Dereference an address into a result.
    IndexLoad { result: VarId, address: VarId },
    /// Store a value through an address.
    IndexStore { address: VarId, value: VarId },
    /// Store a scalar into a pixel element; target is a PixelIndex.
    PixelStore { target: VarId, value: VarId },
    /// No operation.
    Nop,
}

fn operand(arena: &VarArena, id: VarId) -> MemRef {
    let var = arena.get(id);
    let addr = var
        .addr
        .unwrap_or_else(|| panic!("compiler bug: operand '{}' not allocated", var.name));
    MemRef {
        addr,
        len: var.length,
    }
}

impl IrOp {
    /// Lower to one or more instructions. Pure: reads the arena, mutates
    /// nothing.
    pub fn lower(&self, arena: &VarArena) -> Result<Vec<Instruction>> {
        Ok(match &self.node {
            Node::Assign { target, value } => {
                assert_eq!(
                    arena.length(*target),
                    1,
                    "compiler bug: scalar assign target must have length 1"
                );
                vec![Instruction::Mov {
                    dest: operand(arena, *target),
                    src: operand(arena, *value),
                }]
            }

            Node::VectorAssign { target, value } => {
                vec![vector_instruction(arena, VectorAluOp::Mov, *target, *value)]
            }

            Node::VectorOp { op, target, value } => {
                let op = match op {
                    BinOp::Add => VectorAluOp::Add,
                    BinOp::Sub => VectorAluOp::Sub,
                    BinOp::Mul => VectorAluOp::Mul,
                    BinOp::Div => VectorAluOp::Div,
                    BinOp::Mod => VectorAluOp::Mod,
                    other => panic!("compiler bug: no vector form of {other:?}"),
                };
                vec![vector_instruction(arena, op, *target, *value)]
            }

            Node::Binop {
                op,
                result,
                left,
                right,
            } => {
                let ty = arena
                    .base_type(*result)
                    .expect("compiler bug: binop result has no base type");
                vec![Instruction::Alu {
                    op: select_alu(ty, *op),
                    result: operand(arena, *result),
                    op1: operand(arena, *left),
                    op2: operand(arena, *right),
                }]
            }

            Node::UnaryNot { result, value } => vec![Instruction::Not {
                result: operand(arena, *result),
                value: operand(arena, *value),
            }],

            Node::Convert { result, value } => {
                let target_ty = arena
                    .base_type(*result)
                    .expect("compiler bug: conversion result has no base type");
                let source_ty = arena
                    .base_type(*value)
                    .expect("compiler bug: conversion source has no base type");
                vec![Instruction::Conv {
                    kind: select_conv(target_ty, source_ty),
                    dest: operand(arena, *result),
                    src: operand(arena, *value),
                }]
            }

            Node::ConvertInPlace { target, src_ty } => {
                let target_ty = arena
                    .base_type(*target)
                    .expect("compiler bug: conversion target has no base type");
                let slot = operand(arena, *target);
                vec![Instruction::Conv {
                    kind: select_conv(target_ty, *src_ty),
                    dest: slot,
                    src: slot,
                }]
            }

            Node::Call {
                name,
                params,
                args,
                result,
            } => vec![
                Instruction::Call {
                    target: name.clone(),
                    params: params.iter().map(|p| operand(arena, *p)).collect(),
                    args: args.iter().map(|a| operand(arena, *a)).collect(),
                },
                Instruction::Mov {
                    dest: operand(arena, *result),
                    src: MemRef::scalar(0),
                },
            ],

            Node::LibCall {
                name,
                params,
                result,
            } => self.lower_lib_call(arena, name, params, *result)?,

            Node::Label { name } => vec![Instruction::Label { name: name.clone() }],

            Node::BranchZero { value, target } => vec![Instruction::JmpIfZero {
                value: operand(arena, *value),
                target: target.clone(),
            }],

            Node::BranchNotZero { value, target } => vec![Instruction::JmpIfNotZero {
                value: operand(arena, *value),
                target: target.clone(),
            }],

            Node::Jump { target } => vec![Instruction::Jmp {
                target: target.clone(),
            }],

            Node::JumpLessPreInc {
                target,
                counter,
                stop,
            } => vec![Instruction::JmpIfLessPreInc {
                counter: operand(arena, *counter),
                stop: operand(arena, *stop),
                target: target.clone(),
            }],

            Node::Return { value } => vec![Instruction::Ret {
                value: operand(arena, *value),
            }],

            Node::Assert { value } => vec![Instruction::Assert {
                value: operand(arena, *value),
            }],

            Node::Index {
                result,
                target,
                indexes,
            } => {
                let mut counts = Vec::with_capacity(indexes.len());
                let mut strides = Vec::with_capacity(indexes.len());
                let mut current = *target;
                for key in indexes {
                    match &arena.get(current).kind {
                        VarKind::Record { .. } => {
                            // Field offsets are explicit constants, not
                            // stride-multiplied.
                            counts.push(0);
                            strides.push(0);
                            current = arena
                                .field_from_offset(current, *key)
                                .expect("compiler bug: unresolved record offset");
                        }
                        VarKind::Array { elem, count } => {
                            counts.push(*count);
                            strides.push(arena.length(*elem));
                            current = *elem;
                        }
                        other => panic!("compiler bug: cannot index into {other:?}"),
                    }
                }
                vec![Instruction::Index {
                    result: operand(arena, *result),
                    base: operand(arena, *target),
                    indexes: indexes.iter().map(|i| operand(arena, *i)).collect(),
                    counts,
                    strides,
                }]
            }

            Node::IndexLoad { result, address } => vec![Instruction::LoadIndirect {
                dest: operand(arena, *result),
                addr: operand(arena, *address),
            }],

            Node::IndexStore { address, value } => vec![Instruction::StoreIndirect {
                src: operand(arena, *value),
                addr: operand(arena, *address),
            }],

            Node::PixelStore { target, value } => match &arena.get(*target).kind {
                VarKind::PixelIndex {
                    channel, indexes, ..
                } => vec![Instruction::PixelStore {
                    channel: *channel,
                    indexes: indexes.iter().map(|i| operand(arena, *i)).collect(),
                    value: operand(arena, *value),
                }],
                other => panic!("compiler bug: pixel store target {other:?}"),
            },

            Node::Nop => vec![Instruction::Nop],
        })
    }

    fn lower_lib_call(
        &self,
        arena: &VarArena,
        name: &str,
        params: &[VarId],
        result: VarId,
    ) -> Result<Vec<Instruction>> {
        match name {
            "rand" => {
                // The builder interns default bounds, so both are present.
                assert_eq!(params.len(), 2, "compiler bug: rand bounds not interned");
                Ok(vec![Instruction::Rand {
                    dest: operand(arena, result),
                    start: operand(arena, params[0]),
                    end: operand(arena, params[1]),
                }])
            }
            "print" => {
                if params.len() != 1 {
                    return Err(CompileError::WrongIntrinsicArity { line: self.line });
                }
                Ok(vec![Instruction::Print {
                    value: operand(arena, params[0]),
                }])
            }
            "halt" => Ok(vec![Instruction::Halt]),
            _ => match LibFunc::from_name(name) {
                Some(func) => {
                    if params.len() != 1 {
                        return Err(CompileError::WrongIntrinsicArity { line: self.line });
                    }
                    Ok(vec![Instruction::LibCall {
                        func,
                        result: operand(arena, result),
                        params: params.iter().map(|p| operand(arena, *p)).collect(),
                    }])
                }
                None => Err(CompileError::UnknownLibFunc {
                    name: name.to_string(),
                    line: self.line,
                }),
            },
        }
    }

    /// Human-readable rendering for the program dump.
    pub fn describe(&self, arena: &VarArena) -> String {
        let name = |id: &VarId| arena.get(*id).name.clone();
        match &self.node {
            Node::Assign { target, value } => format!("{} = {}", name(target), name(value)),
            Node::VectorAssign { target, value } => {
                format!("*{} =(vector) {}", name(target), name(value))
            }
            Node::VectorOp { op, target, value } => {
                format!("*{} {op:?}=(vector) {}", name(target), name(value))
            }
            Node::Binop {
                op,
                result,
                left,
                right,
            } => format!("{} = {} {op:?} {}", name(result), name(left), name(right)),
            Node::UnaryNot { result, value } => format!("{} = NOT {}", name(result), name(value)),
            Node::Convert { result, value } => {
                format!("{} = convert({})", name(result), name(value))
            }
            Node::ConvertInPlace { target, src_ty } => {
                format!("{} = convert<{src_ty}>({})", name(target), name(target))
            }
            Node::Call { name: func, result, .. } => format!("CALL {func} -> {}", name(result)),
            Node::LibCall { name: func, result, .. } => format!("LCALL {func} -> {}", name(result)),
            Node::Label { name } => format!("LABEL {name}"),
            Node::BranchZero { value, target } => format!("BR Z {} -> {target}", name(value)),
            Node::BranchNotZero { value, target } => format!("BR NZ {} -> {target}", name(value)),
            Node::Jump { target } => format!("JMP -> {target}"),
            Node::JumpLessPreInc {
                target,
                counter,
                stop,
            } => format!("JMP (++{}) < {} -> {target}", name(counter), name(stop)),
            Node::Return { value } => format!("RET {}", name(value)),
            Node::Assert { value } => format!("ASSERT {}", name(value)),
            Node::Index {
                result,
                target,
                indexes,
            } => {
                let idx: String = indexes.iter().map(|i| format!("[{}]", name(i))).collect();
                format!("{} = INDEX {}{}", name(result), name(target), idx)
            }
            Node::IndexLoad { result, address } => format!("{} = *{}", name(result), name(address)),
            Node::IndexStore { address, value } => format!("*{} = {}", name(address), name(value)),
            Node::PixelStore { target, value } => {
                format!("{} = {}", arena.describe(*target), name(value))
            }
            Node::Nop => "NOP".to_string(),
        }
    }
}

fn vector_instruction(
    arena: &VarArena,
    op: VectorAluOp,
    target: VarId,
    value: VarId,
) -> Instruction {
    let target_ins = match &arena.get(target).kind {
        VarKind::PixelAttr { channel, .. } => VectorTarget::Pixel { channel: *channel },
        VarKind::Address {
            target: Some(pointee),
        } => VectorTarget::Array {
            addr: operand(arena, target),
            len: arena.length(*pointee),
            stride: 1,
        },
        other => panic!("compiler bug: vector target {other:?}"),
    };
    Instruction::VectorOp {
        op,
        target: target_ins,
        value: operand(arena, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(arena: &mut VarArena, name: &str, ty: ValueType) -> VarId {
        arena.alloc(Variable {
            name: name.to_string(),
            kind: VarKind::Scalar(ty),
            length: 1,
            addr: None,
            line: 1,
        })
    }

    fn array(arena: &mut VarArena, name: &str, ty: ValueType, dims: &[u16]) -> VarId {
        let mut elem = scalar(arena, name, ty);
        for dim in dims.iter().rev() {
            let length = dim * arena.length(elem);
            elem = arena.alloc(Variable {
                name: name.to_string(),
                kind: VarKind::Array { elem, count: *dim },
                length,
                addr: None,
                line: 1,
            });
        }
        elem
    }

    #[test]
    fn test_nested_array_length() {
        let mut arena = VarArena::new();
        let a = array(&mut arena, "a", ValueType::I32, &[2, 3]);
        assert_eq!(arena.length(a), 6);

        // One subscript strips one dimension.
        let key = scalar(&mut arena, "0", ValueType::I32);
        let sub = arena.resolve_keys(a, &[key], 1).unwrap();
        assert_eq!(arena.length(sub), 3);
        assert_eq!(arena.base_type(sub), Some(ValueType::I32));
    }

    #[test]
    fn test_base_type_unwraps_addresses() {
        let mut arena = VarArena::new();
        let a = array(&mut arena, "a", ValueType::F16, &[4]);
        let addr = arena.alloc(Variable {
            name: "%0".to_string(),
            kind: VarKind::Address { target: Some(a) },
            length: 1,
            addr: None,
            line: 1,
        });
        assert_eq!(arena.base_type(addr), Some(ValueType::F16));
    }

    #[test]
    fn test_record_offset_resolution() {
        let mut arena = VarArena::new();
        let fa = scalar(&mut arena, "a", ValueType::I32);
        let fb = scalar(&mut arena, "b", ValueType::I32);
        let off0 = arena.alloc(Variable {
            name: "0".to_string(),
            kind: VarKind::Const {
                value: 0,
                ty: ValueType::I32,
            },
            length: 1,
            addr: None,
            line: 1,
        });
        let off1 = arena.alloc(Variable {
            name: "1".to_string(),
            kind: VarKind::Const {
                value: 1,
                ty: ValueType::I32,
            },
            length: 1,
            addr: None,
            line: 1,
        });
        let mut fields = IndexMap::new();
        fields.insert("a".to_string(), fa);
        fields.insert("b".to_string(), fb);
        let mut offsets = IndexMap::new();
        offsets.insert("a".to_string(), off0);
        offsets.insert("b".to_string(), off1);
        let record = arena.alloc(Variable {
            name: "p".to_string(),
            kind: VarKind::Record {
                type_name: "point".to_string(),
                fields,
                offsets,
            },
            length: 2,
            addr: None,
            line: 1,
        });

        assert_eq!(arena.field_from_offset(record, off1), Some(fb));
        let resolved = arena.resolve_keys(record, &[off0], 1).unwrap();
        assert_eq!(resolved, fa);

        let stray = scalar(&mut arena, "x", ValueType::I32);
        assert!(matches!(
            arena.resolve_keys(record, &[stray], 3),
            Err(CompileError::UnknownField { line: 3, .. })
        ));
    }

    #[test]
    fn test_alu_selection_per_type() {
        assert_eq!(select_alu(ValueType::I32, BinOp::Add), AluOp::Add);
        assert_eq!(select_alu(ValueType::F16, BinOp::Add), AluOp::F16Add);
        assert_eq!(select_alu(ValueType::F16, BinOp::Mul), AluOp::F16Mul);
        // Comparisons are shared: raw signed compare is exact for Q16.16.
        assert_eq!(select_alu(ValueType::F16, BinOp::Lt), AluOp::CompLt);
        assert_eq!(select_alu(ValueType::Gfx16, BinOp::Add), AluOp::Add);
    }

    #[test]
    fn test_conversion_selection() {
        assert_eq!(
            select_conv(ValueType::I32, ValueType::F16),
            ConvKind::F16ToI32
        );
        assert_eq!(
            select_conv(ValueType::F16, ValueType::I32),
            ConvKind::I32ToF16
        );
        assert_eq!(
            select_conv(ValueType::Gfx16, ValueType::F16),
            ConvKind::Mov
        );
    }
}
