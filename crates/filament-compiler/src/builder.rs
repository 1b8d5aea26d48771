//! The Builder: symbol tables, control-flow assembly, and code generation.
//!
//! A front end drives compilation by issuing semantic-action calls against
//! a `Builder` as it visits a parsed program: declarations, expression
//! lowering, assignments, the control-flow groups, and calls. The builder
//! owns every piece of naming/type/address state - symbol tables, label
//! counters, the loop-context stack, the per-function temp counter, and
//! the compound-lookup stack - so two compilations can never interfere.
//!
//! Finalization is two calls with a strict ordering contract: `allocate`
//! runs exactly once after all emission and turns the symbol tables into
//! the flat data table; `generate_instructions` then lowers every function
//! body to the flat instruction stream.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use filament_vm::{
    DataEntry, DataKind, Instruction, MemRef, PixelChannel, RecordField, ValueType,
    f16_from_float, PIXEL_ADDR,
};

use crate::error::{CompileError, Result};
use crate::ir::{BinOp, IrOp, Node, VarArena, VarId, VarKind, Variable, select_alu, select_conv};

/// Optional lowering behaviors.
#[derive(Debug, Clone, Default)]
pub struct Optimizations {
    /// Evaluate binary operations on two constants at compile time.
    pub fold_constants: bool,
}

/// A user-defined function under construction.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub ret_type: ValueType,
    /// Formal parameters, renamed `"$<func>.<name>"`.
    pub params: Vec<VarId>,
    /// Ordered IR body.
    pub body: Vec<IrOp>,
    pub line: u32,
}

/// A record field declaration as the front end supplies it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub type_name: String,
    pub dimensions: Vec<u16>,
}

/// A subscript key in a compound lookup chain: either an evaluated index
/// expression or a field name still to be resolved.
#[derive(Debug, Clone)]
pub enum IndexKey {
    Value(VarId),
    Field(String),
}

#[derive(Debug, Clone)]
enum TypeDef {
    Value(ValueType),
    Address,
}

/// Shape classification used to pick assignment strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// Address whose resolved pointee is a scalar.
    AddrScalar,
    /// Address whose resolved pointee is a compound.
    AddrCompound,
    /// Address temp that never got a pointee recorded.
    AddrUnresolved,
    /// Whole-array variable.
    Array,
    /// Whole pixel channel attribute.
    PixelAttr,
    /// Deferred pixel element access.
    PixelIndex,
    /// Anything directly addressable.
    Plain,
}

/// The compiler context for one compilation unit.
pub struct Builder {
    arena: VarArena,
    funcs: IndexMap<String, Function>,
    locals: IndexMap<String, IndexMap<String, VarId>>,
    globals: IndexMap<String, VarId>,
    objects: IndexMap<String, VarId>,
    pixel_arrays: IndexMap<String, VarId>,
    record_types: IndexMap<String, VarId>,
    data_types: IndexMap<String, TypeDef>,
    labels: IndexMap<String, u32>,
    loop_top: Vec<String>,
    loop_end: Vec<String>,
    next_temp: u32,
    compound_lookup: Vec<VarId>,
    current_func: Option<String>,
    /// Lowering options; folding defaults off.
    pub optimizations: Optimizations,
    zero: VarId,
    allocated: bool,
    data_table: Vec<DataEntry>,
}

impl Builder {
    /// A fresh compilation unit. The literal `0` is pre-allocated and the
    /// `pixels` object is pre-registered.
    pub fn new() -> Self {
        let mut arena = VarArena::new();
        let zero = arena.alloc(Variable {
            name: "0".to_string(),
            kind: VarKind::Const {
                value: 0,
                ty: ValueType::I32,
            },
            length: 1,
            addr: None,
            line: 0,
        });
        let mut globals = IndexMap::new();
        globals.insert("0".to_string(), zero);

        let mut data_types = IndexMap::new();
        data_types.insert("i32".to_string(), TypeDef::Value(ValueType::I32));
        data_types.insert("f16".to_string(), TypeDef::Value(ValueType::F16));
        data_types.insert("gfx16".to_string(), TypeDef::Value(ValueType::Gfx16));
        data_types.insert("addr".to_string(), TypeDef::Address);

        let mut builder = Self {
            arena,
            funcs: IndexMap::new(),
            locals: IndexMap::new(),
            globals,
            objects: IndexMap::new(),
            pixel_arrays: IndexMap::new(),
            record_types: IndexMap::new(),
            data_types,
            labels: IndexMap::new(),
            loop_top: Vec::new(),
            loop_end: Vec::new(),
            next_temp: 0,
            compound_lookup: Vec::new(),
            current_func: None,
            optimizations: Optimizations::default(),
            zero,
            allocated: false,
            data_table: Vec::new(),
        };
        builder
            .pixelarray_object("pixels", 0)
            .expect("compiler bug: builtin pixel array already defined");
        builder
    }

    /// The variable arena.
    pub fn arena(&self) -> &VarArena {
        &self.arena
    }

    /// The data table produced by `allocate`.
    pub fn data_table(&self) -> &[DataEntry] {
        &self.data_table
    }

    /// The interned zero constant.
    pub fn zero(&self) -> VarId {
        self.zero
    }

    // === Declaration ===

    /// Register a new named type.
    pub fn add_type(&mut self, name: &str, ty: ValueType, line: u32) -> Result<()> {
        if self.data_types.contains_key(name) || self.record_types.contains_key(name) {
            return Err(CompileError::TypeRedefined {
                name: name.to_string(),
                line,
            });
        }
        self.data_types.insert(name.to_string(), TypeDef::Value(ty));
        Ok(())
    }

    /// Declare a record type from its field list. Offsets are interned as
    /// constants in declaration order.
    pub fn create_record(&mut self, name: &str, fields: &[FieldDef], line: u32) -> Result<()> {
        if self.data_types.contains_key(name) {
            return Err(CompileError::TypeRedefined {
                name: name.to_string(),
                line,
            });
        }
        if self.record_types.contains_key(name) {
            return Err(CompileError::RecordRedefined {
                name: name.to_string(),
                line,
            });
        }

        let mut new_fields = IndexMap::new();
        let mut offsets = IndexMap::new();
        let mut offset: i32 = 0;
        let mut length: u16 = 0;
        for field in fields {
            let var = self.build_var(&field.name, &field.type_name, &field.dimensions, line)?;
            offsets.insert(
                field.name.clone(),
                self.add_const(offset, ValueType::I32, line),
            );
            offset += self.arena.length(var) as i32;
            length += self.arena.length(var);
            new_fields.insert(field.name.clone(), var);
        }

        let template = self.arena.alloc(Variable {
            name: name.to_string(),
            kind: VarKind::Record {
                type_name: name.to_string(),
                fields: new_fields,
                offsets,
            },
            length,
            addr: None,
            line,
        });
        self.record_types.insert(name.to_string(), template);
        Ok(())
    }

    /// Construct a variable of the given type and dimensions without
    /// registering it in any scope.
    pub fn build_var(
        &mut self,
        name: &str,
        type_name: &str,
        dimensions: &[u16],
        line: u32,
    ) -> Result<VarId> {
        let kind = match self.data_types.get(type_name) {
            Some(TypeDef::Value(ty)) => VarKind::Scalar(*ty),
            Some(TypeDef::Address) => VarKind::Address { target: None },
            None => match self.record_types.get(type_name) {
                Some(template) => self.arena.get(*template).kind.clone(),
                None => {
                    return Err(CompileError::UnknownType {
                        name: type_name.to_string(),
                        line,
                    })
                }
            },
        };
        let length = match &kind {
            VarKind::Record { .. } => self.arena.length(self.record_types[type_name]),
            _ => 1,
        };
        let mut id = self.arena.alloc(Variable {
            name: name.to_string(),
            kind,
            length,
            addr: None,
            line,
        });

        // Dimensions nest outermost-first.
        for dim in dimensions.iter().rev() {
            let length = dim * self.arena.length(id);
            id = self.arena.alloc(Variable {
                name: name.to_string(),
                kind: VarKind::Array {
                    elem: id,
                    count: *dim,
                },
                length,
                addr: None,
                line,
            });
        }
        Ok(id)
    }

    /// Declare a global. Re-declaring an existing name returns the
    /// existing variable.
    pub fn add_global(
        &mut self,
        name: &str,
        type_name: &str,
        dimensions: &[u16],
        line: u32,
    ) -> Result<VarId> {
        if let Some(existing) = self.globals.get(name) {
            return Ok(*existing);
        }
        let id = self.build_var(name, type_name, dimensions, line)?;
        self.globals.insert(name.to_string(), id);
        Ok(id)
    }

    /// Declare a local in the current function. Globals shadow would-be
    /// locals of the same name; re-declaration is idempotent.
    pub fn add_local(
        &mut self,
        name: &str,
        type_name: &str,
        dimensions: &[u16],
        line: u32,
    ) -> Result<VarId> {
        if let Some(existing) = self.globals.get(name) {
            return Ok(*existing);
        }
        let func = self.current_func_name();
        if let Some(existing) = self.locals[&func].get(name) {
            return Ok(*existing);
        }
        let id = self.build_var(name, type_name, dimensions, line)?;
        self.locals
            .get_mut(&func)
            .expect("compiler bug: unknown current function")
            .insert(name.to_string(), id);
        Ok(id)
    }

    /// Intern a constant, memoized by value in the global namespace.
    pub fn add_const(&mut self, value: i32, ty: ValueType, line: u32) -> VarId {
        let name = value.to_string();
        if let Some(existing) = self.globals.get(&name) {
            return *existing;
        }
        let id = self.arena.alloc(Variable {
            name: name.clone(),
            kind: VarKind::Const { value, ty },
            length: 1,
            addr: None,
            line,
        });
        self.globals.insert(name, id);
        id
    }

    /// Intern a fixed-point constant from a float literal.
    pub fn add_const_f16(&mut self, value: f64, line: u32) -> VarId {
        self.add_const(f16_from_float(value), ValueType::F16, line)
    }

    /// Allocate a fresh temp in the current function.
    pub fn add_temp(&mut self, type_name: &str, line: u32) -> Result<VarId> {
        let name = format!("%{}", self.next_temp);
        self.next_temp += 1;
        let id = self.build_var(&name, type_name, &[], line)?;
        let func = self.current_func_name();
        self.locals
            .get_mut(&func)
            .expect("compiler bug: unknown current function")
            .insert(name, id);
        Ok(id)
    }

    /// Declare a pixel array object.
    pub fn pixelarray_object(&mut self, name: &str, line: u32) -> Result<()> {
        if self.pixel_arrays.contains_key(name) {
            return Err(CompileError::PixelArrayRedefined {
                name: name.to_string(),
                line,
            });
        }
        let id = self.arena.alloc(Variable {
            name: name.to_string(),
            kind: VarKind::PixelArray,
            length: 1,
            addr: None,
            line,
        });
        self.pixel_arrays.insert(name.to_string(), id);
        Ok(())
    }

    /// Declare a generic object. PixelArray objects route to the pixel
    /// table.
    pub fn generic_object(&mut self, name: &str, type_name: &str, line: u32) -> Result<()> {
        if type_name == "PixelArray" {
            return self.pixelarray_object(name, line);
        }
        if self.objects.contains_key(name) {
            return Err(CompileError::ObjectRedefined {
                name: name.to_string(),
                line,
            });
        }
        let id = self.arena.alloc(Variable {
            name: name.to_string(),
            kind: VarKind::Object {
                type_name: type_name.to_string(),
            },
            length: 1,
            addr: None,
            line,
        });
        self.objects.insert(name.to_string(), id);
        Ok(())
    }

    /// Open a new function and make it current. Resets the temp counter.
    pub fn func(&mut self, name: &str, line: u32) {
        self.funcs.insert(
            name.to_string(),
            Function {
                name: name.to_string(),
                ret_type: ValueType::I32,
                params: Vec::new(),
                body: Vec::new(),
                line,
            },
        );
        self.locals.insert(name.to_string(), IndexMap::new());
        self.current_func = Some(name.to_string());
        self.next_temp = 0;
    }

    /// Attach a parameter to a function. The variable is renamed
    /// `"$<func>.<name>"` and registered as a local so allocation
    /// assigns it a slot.
    pub fn add_func_arg(&mut self, func: &str, arg: VarId) {
        let name = format!("${}.{}", func, self.arena.get(arg).name);
        self.arena.get_mut(arg).name = name.clone();
        self.funcs
            .get_mut(func)
            .expect("compiler bug: argument for unknown function")
            .params
            .push(arg);
        self.locals
            .get_mut(func)
            .expect("compiler bug: argument for unknown function")
            .insert(name, arg);
    }

    // === Lookup ===

    /// Resolve a name: pixel objects first, then globals, then the
    /// current function's locals.
    pub fn get_var(&self, name: &str, line: u32) -> Result<VarId> {
        if let Some(id) = self.pixel_arrays.get(name) {
            return Ok(*id);
        }
        if let Some(id) = self.globals.get(name) {
            return Ok(*id);
        }
        if let Some(func) = &self.current_func {
            if let Some(id) = self.locals[func].get(name) {
                return Ok(*id);
            }
        }
        Err(CompileError::UndeclaredVariable {
            name: name.to_string(),
            line,
        })
    }

    /// Resolve an `object.attribute` access. Valid only for pixel
    /// objects.
    pub fn get_obj_var(&mut self, obj: &str, attr: &str, line: u32) -> Result<VarId> {
        if !self.pixel_arrays.contains_key(obj) {
            return Err(CompileError::UndeclaredObject {
                name: obj.to_string(),
                line,
            });
        }
        let channel = PixelChannel::from_name(attr).ok_or_else(|| CompileError::UnknownField {
            field: attr.to_string(),
            target: obj.to_string(),
            line,
        })?;
        Ok(self.arena.alloc(Variable {
            name: format!("{obj}.{attr}"),
            kind: VarKind::PixelAttr {
                obj: obj.to_string(),
                channel,
            },
            length: u16::MAX,
            addr: Some(PIXEL_ADDR),
            line,
        }))
    }

    // === Emission ===

    fn current_func_name(&self) -> String {
        self.current_func
            .clone()
            .expect("compiler bug: emission outside a function")
    }

    fn append(&mut self, node: Node, line: u32) {
        let func = self.current_func_name();
        self.funcs
            .get_mut(&func)
            .expect("compiler bug: unknown current function")
            .body
            .push(IrOp { node, line });
    }

    /// Emit a return of the given value.
    pub fn ret(&mut self, value: VarId, line: u32) {
        self.append(Node::Return { value }, line);
    }

    /// Emit a no-op.
    pub fn nop(&mut self, line: u32) {
        self.append(Node::Nop, line);
    }

    /// Emit a runtime assertion of the given test value.
    pub fn assertion(&mut self, test: VarId, line: u32) {
        self.append(Node::Assert { value: test }, line);
    }

    fn const_value(&self, id: VarId) -> Option<(i32, ValueType)> {
        match self.arena.get(id).kind {
            VarKind::Const { value, ty } => Some((value, ty)),
            _ => None,
        }
    }

    fn base_type_of(&self, id: VarId) -> ValueType {
        self.arena
            .base_type(id)
            .expect("compiler bug: operand has no base value type")
    }

    /// Lower a binary operation. If either operand is fixed-point the
    /// whole operation is performed as fixed-point, with conversions
    /// inserted for the other side; the result is a fresh temp of the
    /// promoted type. With folding enabled, two constant operands
    /// evaluate immediately to a new constant instead.
    pub fn binop(&mut self, op: BinOp, left: VarId, right: VarId, line: u32) -> Result<VarId> {
        if self.optimizations.fold_constants {
            if let (Some(l), Some(r)) = (self.const_value(left), self.const_value(right)) {
                return Ok(self.fold_constants(op, l, r, line));
            }
        }

        let left_ty = self.base_type_of(left);
        let right_ty = self.base_type_of(right);
        let data_type = if right_ty == ValueType::F16 {
            ValueType::F16
        } else {
            left_ty
        };

        let mut left_result = left;
        let mut right_result = right;
        if data_type == ValueType::F16 {
            if left_ty != ValueType::F16 {
                let temp = self.add_temp(data_type.name(), line)?;
                self.append(
                    Node::Convert {
                        result: temp,
                        value: left,
                    },
                    line,
                );
                left_result = temp;
            }
            if right_ty != ValueType::F16 {
                let temp = self.add_temp(data_type.name(), line)?;
                self.append(
                    Node::Convert {
                        result: temp,
                        value: right,
                    },
                    line,
                );
                right_result = temp;
            }
        }

        let result = self.add_temp(data_type.name(), line)?;
        self.append(
            Node::Binop {
                op,
                result,
                left: left_result,
                right: right_result,
            },
            line,
        );
        Ok(result)
    }

    /// Evaluate a constant binary operation with exactly the instruction
    /// semantics the non-folded path would execute, so folding on or off
    /// is observationally identical.
    fn fold_constants(
        &mut self,
        op: BinOp,
        (left, left_ty): (i32, ValueType),
        (right, right_ty): (i32, ValueType),
        line: u32,
    ) -> VarId {
        let data_type = if right_ty == ValueType::F16 {
            ValueType::F16
        } else {
            left_ty
        };
        let mut a = left;
        let mut b = right;
        if data_type == ValueType::F16 {
            if left_ty != ValueType::F16 {
                a = select_conv(data_type, left_ty).apply(a);
            }
            if right_ty != ValueType::F16 {
                b = select_conv(data_type, right_ty).apply(b);
            }
        }
        let value = select_alu(data_type, op).apply(a, b);
        self.add_const(value, data_type, line)
    }

    /// Lower a logical not into a fresh temp of the value's type.
    pub fn unary_not(&mut self, value: VarId, line: u32) -> Result<VarId> {
        let ty = self.base_type_of(value);
        let result = self.add_temp(ty.name(), line)?;
        self.append(Node::UnaryNot { result, value }, line);
        Ok(result)
    }

    fn shape_of(&self, id: VarId) -> Shape {
        match &self.arena.get(id).kind {
            VarKind::Address { target: Some(t) } => {
                if self.arena.length(*t) > 1 {
                    Shape::AddrCompound
                } else {
                    Shape::AddrScalar
                }
            }
            VarKind::Address { target: None } => Shape::AddrUnresolved,
            VarKind::Array { .. } => Shape::Array,
            VarKind::PixelAttr { .. } => Shape::PixelAttr,
            VarKind::PixelIndex { .. } => Shape::PixelIndex,
            _ => Shape::Plain,
        }
    }

    fn set_address_target(&mut self, address: VarId, target: VarId) {
        match &mut self.arena.get_mut(address).kind {
            VarKind::Address { target: slot } => *slot = Some(target),
            _ => panic!("compiler bug: pointee recorded on a non-address"),
        }
    }

    fn address_pointee(&self, id: VarId) -> VarId {
        match self.arena.get(id).kind {
            VarKind::Address { target: Some(t) } => t,
            _ => panic!("compiler bug: pointee of a non-address"),
        }
    }

    /// Lower an assignment, choosing the strategy from the shapes of the
    /// target and value. The target's type wins conversion ties, unlike
    /// `binop` where fixed-point wins.
    pub fn assign(&mut self, target: VarId, value: VarId, line: u32) -> Result<()> {
        let target_base = self.arena.base_type(target);
        let value_base = self.arena.base_type(value);
        let value_shape = self.shape_of(value);
        // Pixel attributes are addresses into pixel storage, so they get
        // the same no-conversion treatment as flat addresses.
        let value_is_address = matches!(
            value_shape,
            Shape::AddrScalar | Shape::AddrCompound | Shape::AddrUnresolved | Shape::PixelAttr
        );

        let mut value = value;
        if let (Some(target_ty), Some(value_ty)) = (target_base, value_base) {
            if target_ty != value_ty && !value_is_address {
                let conv = self.add_temp(target_ty.name(), line)?;
                self.append(
                    Node::Convert {
                        result: conv,
                        value,
                    },
                    line,
                );
                value = conv;
            }
        }

        match (self.shape_of(target), value_shape) {
            (_, Shape::AddrCompound) | (_, Shape::PixelAttr) => {
                let value_name = match self.arena.get(value).kind {
                    VarKind::Address { target: Some(t) } => self.arena.get(t).name.clone(),
                    _ => self.arena.get(value).name.clone(),
                };
                Err(CompileError::AssignFromCompound {
                    value: value_name,
                    target: self.arena.get(target).name.clone(),
                    line,
                })
            }
            (_, Shape::AddrScalar) => {
                // Indirect load into the target; a residual type mismatch
                // is converted on top of itself.
                self.append(
                    Node::IndexLoad {
                        result: target,
                        address: value,
                    },
                    line,
                );
                if let (Some(target_ty), Some(value_ty)) = (target_base, value_base) {
                    if target_ty != value_ty {
                        self.append(
                            Node::ConvertInPlace {
                                target,
                                src_ty: value_ty,
                            },
                            line,
                        );
                    }
                }
                Ok(())
            }
            (Shape::AddrScalar, _) => {
                self.append(
                    Node::IndexStore {
                        address: target,
                        value,
                    },
                    line,
                );
                Ok(())
            }
            (Shape::AddrCompound, _) | (Shape::PixelAttr, _) => {
                self.append(Node::VectorAssign { target, value }, line);
                Ok(())
            }
            (Shape::Array, _) => {
                let result = self.add_temp("addr", line)?;
                self.append(
                    Node::Index {
                        result,
                        target,
                        indexes: Vec::new(),
                    },
                    line,
                );
                self.set_address_target(result, target);
                self.append(
                    Node::VectorAssign {
                        target: result,
                        value,
                    },
                    line,
                );
                Ok(())
            }
            (Shape::PixelIndex, _) => {
                self.append(Node::PixelStore { target, value }, line);
                Ok(())
            }
            (Shape::AddrUnresolved, _) | (_, Shape::AddrUnresolved) => {
                panic!("compiler bug: unresolved address in assignment")
            }
            (Shape::Plain, _) => {
                self.append(Node::Assign { target, value }, line);
                Ok(())
            }
        }
    }

    /// Lower a compound assignment. Scalar targets compose load, binop,
    /// and assign; compound targets take a vector operation directly.
    pub fn augassign(&mut self, op: BinOp, target: VarId, value: VarId, line: u32) -> Result<()> {
        let target_base = self.arena.base_type(target);
        let value_base = self.arena.base_type(value);

        let mut value = value;
        if let (Some(target_ty), Some(value_ty)) = (target_base, value_base) {
            if target_ty != value_ty {
                let conv = self.add_temp(target_ty.name(), line)?;
                self.append(
                    Node::Convert {
                        result: conv,
                        value,
                    },
                    line,
                );
                value = conv;
            }
        }

        match self.shape_of(target) {
            Shape::AddrScalar => {
                let loaded = self.load_indirect(target, None, line)?;
                let result = self.binop(op, loaded, value, line)?;
                self.assign(target, result, line)
            }
            Shape::AddrCompound | Shape::PixelAttr => {
                self.append(Node::VectorOp { op, target, value }, line);
                Ok(())
            }
            Shape::PixelIndex => Err(CompileError::InvalidSubscript {
                name: self.arena.get(target).name.clone(),
                line,
            }),
            Shape::AddrUnresolved => panic!("compiler bug: unresolved address in assignment"),
            Shape::Plain if self.arena.length(target) == 1 => {
                let result = self.binop(op, target, value, line)?;
                self.assign(target, result, line)
            }
            Shape::Array | Shape::Plain => {
                let result = self.add_temp("addr", line)?;
                self.append(
                    Node::Index {
                        result,
                        target,
                        indexes: Vec::new(),
                    },
                    line,
                );
                self.set_address_target(result, target);
                self.append(
                    Node::VectorOp {
                        op,
                        target: result,
                        value,
                    },
                    line,
                );
                Ok(())
            }
        }
    }

    /// Emit an indirect load through an address, into `result` or a fresh
    /// temp of the pointee's type.
    pub fn load_indirect(
        &mut self,
        address: VarId,
        result: Option<VarId>,
        line: u32,
    ) -> Result<VarId> {
        let result = match result {
            Some(result) => result,
            None => {
                let pointee = self.address_pointee(address);
                let ty = self
                    .arena
                    .base_type(pointee)
                    .expect("compiler bug: pointee has no base value type");
                self.add_temp(ty.name(), line)?
            }
        };
        self.append(Node::IndexLoad { result, address }, line);
        Ok(result)
    }

    /// Emit an indirect store through an address.
    pub fn store_indirect(&mut self, address: VarId, value: VarId, line: u32) {
        self.append(Node::IndexStore { address, value }, line);
    }

    /// Lower a call. User-defined functions are resolved by exact name;
    /// anything else is a library call. The result is always materialized
    /// into a fresh temp.
    pub fn call(&mut self, name: &str, params: Vec<VarId>, line: u32) -> Result<VarId> {
        let result = self.add_temp("i32", line)?;
        if let Some(func) = self.funcs.get(name) {
            let args = func.params.clone();
            if args.len() != params.len() {
                return Err(CompileError::WrongCallArity {
                    name: name.to_string(),
                    expected: args.len(),
                    found: params.len(),
                    line,
                });
            }
            self.append(
                Node::Call {
                    name: name.to_string(),
                    params,
                    args,
                    result,
                },
                line,
            );
        } else {
            let mut params = params;
            if name == "rand" {
                if params.len() > 2 {
                    return Err(CompileError::WrongIntrinsicArity { line });
                }
                if params.is_empty() {
                    let lo = self.add_const(0, ValueType::I32, line);
                    params.push(lo);
                }
                if params.len() == 1 {
                    let hi = self.add_const(65535, ValueType::I32, line);
                    params.push(hi);
                }
            }
            self.append(
                Node::LibCall {
                    name: name.to_string(),
                    params,
                    result,
                },
                line,
            );
        }
        Ok(result)
    }

    // === Control flow ===

    fn new_label(&mut self, base: &str) -> String {
        let counter = self.labels.entry(base.to_string()).or_insert(0);
        let name = format!("{}.{}", base, counter);
        *counter += 1;
        name
    }

    /// Place a label at the current position in the function body.
    pub fn position_label(&mut self, label: &str, line: u32) {
        self.append(
            Node::Label {
                name: label.to_string(),
            },
            line,
        );
    }

    /// Open an if/else: emits a zero-test branch to the else label and
    /// returns (then, else, end) labels for the caller to position.
    pub fn ifelse(&mut self, test: VarId, line: u32) -> (String, String, String) {
        let body_label = self.new_label("if.then");
        let else_label = self.new_label("if.else");
        let end_label = self.new_label("if.end");
        self.append(
            Node::BranchZero {
                value: test,
                target: else_label.clone(),
            },
            line,
        );
        (body_label, else_label, end_label)
    }

    /// Open a top-tested while loop.
    pub fn begin_while(&mut self, line: u32) {
        let top_label = self.new_label("while.top");
        let end_label = self.new_label("while.end");
        self.position_label(&top_label, line);
        self.loop_top.push(top_label);
        self.loop_end.push(end_label);
    }

    /// Emit the while test: exits the loop when the test is zero.
    pub fn test_while(&mut self, test: VarId, line: u32) {
        let end = self
            .loop_end
            .last()
            .expect("compiler bug: test_while outside a loop")
            .clone();
        self.append(
            Node::BranchZero {
                value: test,
                target: end,
            },
            line,
        );
    }

    /// Close a while loop: back edge to the top, then the end label.
    pub fn end_while(&mut self, line: u32) {
        let top = self
            .loop_top
            .pop()
            .expect("compiler bug: end_while outside a loop");
        let end = self
            .loop_end
            .pop()
            .expect("compiler bug: end_while outside a loop");
        self.append(Node::Jump { target: top }, line);
        self.position_label(&end, line);
    }

    /// Open a for loop. The iterator starts at -1 and control jumps to
    /// the continue label, where the back edge pre-increments and
    /// compares, so the body runs exactly max(0, stop) times. Returns
    /// (top, continue, end) labels; the caller positions top before the
    /// body, continue before `end_for`, and end after it.
    pub fn begin_for(&mut self, iterator: VarId, line: u32) -> (String, String, String) {
        let begin_label = self.new_label("for.begin");
        self.position_label(&begin_label, line);
        let top_label = self.new_label("for.top");
        let continue_label = self.new_label("for.cont");
        let end_label = self.new_label("for.end");

        self.loop_top.push(continue_label.clone());
        self.loop_end.push(end_label.clone());

        let init_value = self.add_const(-1, ValueType::I32, line);
        self.append(
            Node::Assign {
                target: iterator,
                value: init_value,
            },
            line,
        );
        self.append(
            Node::Jump {
                target: continue_label.clone(),
            },
            line,
        );
        (top_label, continue_label, end_label)
    }

    /// Close a for loop with the combined pre-increment-compare back
    /// edge. The stop value was evaluated once before the loop and is
    /// never re-evaluated.
    pub fn end_for(&mut self, iterator: VarId, stop: VarId, top: &str, line: u32) -> Result<()> {
        if self.arena.length(stop) != 1 {
            return Err(CompileError::InvalidLoopBound {
                name: self.arena.get(stop).name.clone(),
                line,
            });
        }
        self.append(
            Node::JumpLessPreInc {
                target: top.to_string(),
                counter: iterator,
                stop,
            },
            line,
        );
        self.loop_top.pop();
        self.loop_end.pop();
        Ok(())
    }

    /// Emit an unconditional jump.
    pub fn jump(&mut self, target: &str, line: u32) {
        self.append(
            Node::Jump {
                target: target.to_string(),
            },
            line,
        );
    }

    /// Jump to the innermost loop's end label.
    pub fn loop_break(&mut self, line: u32) {
        let end = self
            .loop_end
            .last()
            .expect("compiler bug: break outside a loop")
            .clone();
        self.jump(&end, line);
    }

    /// Jump to the innermost loop's continue label.
    pub fn loop_continue(&mut self, line: u32) {
        let top = self
            .loop_top
            .last()
            .expect("compiler bug: continue outside a loop")
            .clone();
        self.jump(&top, line);
    }

    // === Compound lvalue resolution ===

    /// Push one link of a chained subscript/field access. The first push
    /// records the base target. Field names resolve against the
    /// accumulated partial type: records translate the name to its offset
    /// constant, pixel objects to the channel attribute.
    pub fn lookup_subscript(&mut self, target: VarId, index: IndexKey, line: u32) -> Result<()> {
        if self.compound_lookup.is_empty() {
            self.compound_lookup.push(target);
        }

        match index {
            IndexKey::Value(id) => self.compound_lookup.push(id),
            IndexKey::Field(name) => {
                let base = self.compound_lookup[0];
                let keys: Vec<VarId> = self.compound_lookup[1..].to_vec();
                let resolved = self.arena.resolve_keys(base, &keys, line)?;
                match &self.arena.get(resolved).kind {
                    VarKind::Record { offsets, .. } => {
                        let offset = offsets.get(&name).copied().ok_or_else(|| {
                            CompileError::UnknownField {
                                field: name.clone(),
                                target: self.arena.get(base).name.clone(),
                                line,
                            }
                        })?;
                        self.compound_lookup.push(offset);
                    }
                    VarKind::PixelArray if keys.is_empty() => {
                        // The channel must be named before any indexes;
                        // swap the bare object for its attribute.
                        let obj = self.arena.get(resolved).name.clone();
                        let attr = self.get_obj_var(&obj, &name, line)?;
                        self.compound_lookup[0] = attr;
                    }
                    _ => {
                        return Err(CompileError::InvalidSubscript { name, line });
                    }
                }
            }
        }
        Ok(())
    }

    /// Drain the compound-lookup stack into an lvalue. Pixel bases yield
    /// a deferred pixel-index; everything else allocates an address temp,
    /// emits an index node, and records the statically resolved pointee
    /// type on the address for the later scalar/vector decision.
    pub fn resolve_lookup(&mut self, line: u32) -> Result<VarId> {
        assert!(
            !self.compound_lookup.is_empty(),
            "compiler bug: resolve_lookup without a pending lookup"
        );
        let base = self.compound_lookup.remove(0);
        let indexes: Vec<VarId> = std::mem::take(&mut self.compound_lookup);

        match &self.arena.get(base).kind {
            VarKind::PixelArray => Err(CompileError::MissingPixelChannel { line }),
            VarKind::PixelAttr { obj, channel } => {
                let (obj, channel) = (obj.clone(), *channel);
                let name = format!("{obj}.{channel}");
                Ok(self.arena.alloc(Variable {
                    name,
                    kind: VarKind::PixelIndex {
                        obj,
                        channel,
                        indexes,
                    },
                    length: 1,
                    addr: Some(PIXEL_ADDR),
                    line,
                }))
            }
            _ => {
                let result = self.add_temp("addr", line)?;
                let pointee = self.arena.resolve_keys(base, &indexes, line)?;
                self.append(
                    Node::Index {
                        result,
                        target: base,
                        indexes,
                    },
                    line,
                );
                self.set_address_target(result, pointee);
                Ok(result)
            }
        }
    }

    // === Finalization ===

    fn mem_ref(&self, id: VarId) -> MemRef {
        let var = self.arena.get(id);
        MemRef {
            addr: var
                .addr
                .unwrap_or_else(|| panic!("compiler bug: '{}' not allocated", var.name)),
            len: var.length,
        }
    }

    fn data_entry(&self, id: VarId) -> DataEntry {
        let var = self.arena.get(id);
        let (ty, kind) = match &var.kind {
            VarKind::Const { value, ty } => (*ty, DataKind::Const { value: *value }),
            VarKind::Scalar(ty) => (*ty, DataKind::Scalar),
            VarKind::Address { .. } => (ValueType::Addr, DataKind::Scalar),
            VarKind::Array { elem, .. } => (
                self.arena.base_type(*elem).unwrap_or(ValueType::I32),
                DataKind::Array,
            ),
            VarKind::Record { offsets, .. } => (
                ValueType::I32,
                DataKind::Record {
                    fields: offsets
                        .iter()
                        .map(|(name, offset)| RecordField {
                            name: name.clone(),
                            offset_addr: self
                                .arena
                                .get(*offset)
                                .addr
                                .expect("compiler bug: offset constant not allocated"),
                        })
                        .collect(),
                },
            ),
            other => panic!("compiler bug: '{}' ({other:?}) in the data table", var.name),
        };
        DataEntry {
            name: var.name.clone(),
            ty,
            length: var.length,
            addr: var.addr.expect("compiler bug: entry not allocated"),
            kind,
        }
    }

    /// The allocation pass: assign address 0 to the implicit return slot,
    /// contiguous addresses to all globals, then function by function to
    /// all locals (temps included), qualifying each local's name by its
    /// owning function. Must run exactly once, after all emission.
    pub fn allocate(&mut self) -> Vec<DataEntry> {
        assert!(!self.allocated, "compiler bug: allocate must run exactly once");
        self.allocated = true;

        let ret = self.arena.alloc(Variable {
            name: "$return".to_string(),
            kind: VarKind::Scalar(ValueType::I32),
            length: 1,
            addr: Some(0),
            line: 0,
        });

        let mut addr: u16 = 1;
        let globals: Vec<VarId> = self.globals.values().copied().collect();
        for id in &globals {
            self.arena.get_mut(*id).addr = Some(addr);
            addr += self.arena.length(*id);
        }

        let locals: Vec<(String, VarId)> = self
            .locals
            .iter()
            .flat_map(|(func, vars)| {
                vars.values().map(move |id| (func.clone(), *id))
            })
            .collect();
        for (func, id) in &locals {
            let var = self.arena.get_mut(*id);
            var.addr = Some(addr);
            var.name = format!("{}.{}", func, var.name);
            addr += self.arena.length(*id);
        }

        let mut table = Vec::with_capacity(1 + globals.len() + locals.len());
        table.push(self.data_entry(ret));
        for id in globals {
            table.push(self.data_entry(id));
        }
        for (_, id) in locals {
            table.push(self.data_entry(id));
        }

        debug!(
            entries = table.len(),
            slots = addr,
            "data table allocated"
        );
        self.data_table = table.clone();
        table
    }

    /// Final lowering: synthesize missing `init`/`loop` lifecycle stubs,
    /// then lower every function's IR body to the flat instruction stream
    /// in function-table order. Requires `allocate` to have run.
    pub fn generate_instructions(&mut self) -> Result<Vec<Instruction>> {
        assert!(
            self.allocated,
            "compiler bug: generate_instructions before allocate"
        );

        for entry in ["init", "loop"] {
            if !self.funcs.contains_key(entry) {
                self.func(entry, 0);
                let zero = self.zero;
                self.ret(zero, 0);
            }
        }

        let mut instructions = Vec::new();
        for func in self.funcs.values() {
            instructions.push(Instruction::Func {
                name: func.name.clone(),
                params: func.params.iter().map(|p| self.mem_ref(*p)).collect(),
            });
            for op in &func.body {
                instructions.extend(op.lower(&self.arena)?);
            }
        }
        debug!(count = instructions.len(), "instructions generated");
        Ok(instructions)
    }

    /// Human-readable dump of the symbol tables and function bodies.
    pub fn dump(&self) -> String {
        let mut out = String::from("IR:\nGlobals:\n");
        for id in self.globals.values() {
            out.push_str(&format!("\t{}\n", self.arena.describe(*id)));
        }
        out.push_str("Locals:\n");
        for (func, vars) in &self.locals {
            if vars.is_empty() {
                continue;
            }
            out.push_str(&format!("\t{func}\n"));
            for id in vars.values() {
                out.push_str(&format!("\t\t{}\n", self.arena.describe(*id)));
            }
        }
        out.push_str("PixelArrays:\n");
        for id in self.pixel_arrays.values() {
            out.push_str(&format!("\t{}\n", self.arena.describe(*id)));
        }
        out.push_str("Functions:\n");
        for func in self.funcs.values() {
            out.push_str(&format!("\tFunc {} -> {}\n", func.name, func.ret_type));
            for op in &func.body {
                out.push_str(&format!("{}\t\t{}\n", op.line, op.describe(&self.arena)));
            }
        }
        out
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_const_memoized_by_value() {
        let mut b = Builder::new();
        let a = b.add_const(5, ValueType::I32, 1);
        let c = b.add_const(5, ValueType::I32, 2);
        assert_eq!(a, c);
        assert_ne!(a, b.add_const(6, ValueType::I32, 2));
    }

    #[test]
    fn test_zero_const_preallocated() {
        let b = Builder::new();
        assert_eq!(b.get_var("0", 1).unwrap(), b.zero());
    }

    #[test]
    fn test_add_global_idempotent() {
        let mut b = Builder::new();
        let first = b.add_global("x", "i32", &[], 1).unwrap();
        let second = b.add_global("x", "f16", &[], 2).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_global_shadows_local_declaration() {
        let mut b = Builder::new();
        let global = b.add_global("x", "i32", &[], 1).unwrap();
        b.func("loop", 2);
        let local = b.add_local("x", "i32", &[], 3).unwrap();
        assert_eq!(global, local);
    }

    #[test]
    fn test_undeclared_variable_carries_line() {
        let b = Builder::new();
        match b.get_var("nope", 12) {
            Err(CompileError::UndeclaredVariable { name, line }) => {
                assert_eq!(name, "nope");
                assert_eq!(line, 12);
            }
            other => panic!("expected UndeclaredVariable, got {other:?}"),
        }
    }

    #[test]
    fn test_labels_unique_per_base() {
        let mut b = Builder::new();
        assert_eq!(b.new_label("for.top"), "for.top.0");
        assert_eq!(b.new_label("for.top"), "for.top.1");
        assert_eq!(b.new_label("while.top"), "while.top.0");
    }

    #[test]
    fn test_temp_counter_resets_per_function() {
        let mut b = Builder::new();
        b.func("a", 1);
        let t0 = b.add_temp("i32", 1).unwrap();
        assert_eq!(b.arena().get(t0).name, "%0");
        b.func("b", 2);
        let t0b = b.add_temp("i32", 2).unwrap();
        assert_eq!(b.arena().get(t0b).name, "%0");
    }

    #[test]
    fn test_record_layout() {
        let mut b = Builder::new();
        b.create_record(
            "point",
            &[
                FieldDef {
                    name: "a".into(),
                    type_name: "i32".into(),
                    dimensions: vec![],
                },
                FieldDef {
                    name: "b".into(),
                    type_name: "i32".into(),
                    dimensions: vec![],
                },
            ],
            1,
        )
        .unwrap();
        let p = b.add_global("p", "point", &[], 2).unwrap();
        assert_eq!(b.arena().length(p), 2);
        match &b.arena().get(p).kind {
            VarKind::Record { offsets, .. } => {
                let a = offsets["a"];
                let bb = offsets["b"];
                assert!(matches!(
                    b.arena().get(a).kind,
                    VarKind::Const { value: 0, .. }
                ));
                assert!(matches!(
                    b.arena().get(bb).kind,
                    VarKind::Const { value: 1, .. }
                ));
            }
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn test_record_redefinition_rejected() {
        let mut b = Builder::new();
        b.create_record("point", &[], 1).unwrap();
        assert!(matches!(
            b.create_record("point", &[], 2),
            Err(CompileError::RecordRedefined { line: 2, .. })
        ));
        assert!(matches!(
            b.add_type("point", ValueType::I32, 3),
            Err(CompileError::TypeRedefined { line: 3, .. })
        ));
    }

    #[test]
    fn test_pixelarray_redefinition_rejected() {
        let mut b = Builder::new();
        assert!(matches!(
            b.pixelarray_object("pixels", 4),
            Err(CompileError::PixelArrayRedefined { line: 4, .. })
        ));
    }

    #[test]
    fn test_allocation_layout() {
        let mut b = Builder::new();
        let g = b.add_global("g", "i32", &[4], 1).unwrap();
        b.func("loop", 2);
        let l = b.add_local("l", "i32", &[], 3).unwrap();
        let table = b.allocate();

        assert_eq!(table[0].name, "$return");
        assert_eq!(table[0].addr, 0);
        // The zero const sits at 1, then the array, then the local.
        let g_addr = b.arena().get(g).addr.unwrap();
        let l_addr = b.arena().get(l).addr.unwrap();
        assert_eq!(g_addr, 2);
        assert_eq!(l_addr, 6);
        assert_eq!(b.arena().get(l).name, "loop.l");
    }

    #[test]
    fn test_generate_synthesizes_lifecycle_stubs() {
        let mut b = Builder::new();
        b.allocate();
        let ins = b.generate_instructions().unwrap();
        let funcs: Vec<&str> = ins
            .iter()
            .filter_map(|i| match i {
                Instruction::Func { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(funcs, vec!["init", "loop"]);
        // Each stub returns the zero constant.
        assert!(ins
            .iter()
            .filter(|i| matches!(i, Instruction::Ret { .. }))
            .count()
            == 2);
    }

    #[test]
    fn test_binop_promotes_to_f16() {
        let mut b = Builder::new();
        b.func("loop", 1);
        let one = b.add_const(1, ValueType::I32, 1);
        let half = b.add_const_f16(1.5, 1);
        let result = b.binop(BinOp::Add, one, half, 1).unwrap();
        assert_eq!(b.arena().base_type(result), Some(ValueType::F16));
        // The integer side got a conversion temp.
        let body = &b.funcs["loop"].body;
        assert!(matches!(body[0].node, Node::Convert { .. }));
        assert!(matches!(body[1].node, Node::Binop { .. }));
    }

    #[test]
    fn test_fold_returns_constant_without_emission() {
        let mut b = Builder::new();
        b.optimizations.fold_constants = true;
        b.func("loop", 1);
        let x = b.add_const(6, ValueType::I32, 1);
        let y = b.add_const(7, ValueType::I32, 1);
        let result = b.binop(BinOp::Mul, x, y, 1).unwrap();
        assert!(matches!(
            b.arena().get(result).kind,
            VarKind::Const { value: 42, .. }
        ));
        assert!(b.funcs["loop"].body.is_empty());
    }

    #[test]
    fn test_fold_division_by_zero_matches_runtime() {
        let mut b = Builder::new();
        b.optimizations.fold_constants = true;
        b.func("loop", 1);
        let x = b.add_const(9, ValueType::I32, 1);
        let result = b.binop(BinOp::Div, x, b.zero(), 1).unwrap();
        assert!(matches!(
            b.arena().get(result).kind,
            VarKind::Const { value: 0, .. }
        ));
    }

    #[test]
    fn test_assign_from_compound_address_rejected() {
        let mut b = Builder::new();
        let grid = b.add_global("grid", "i32", &[2, 3], 1).unwrap();
        let out = b.add_global("out", "i32", &[], 1).unwrap();
        b.func("loop", 2);
        // grid[1] resolves to a whole row, a compound pointee.
        let idx = b.add_const(1, ValueType::I32, 2);
        b.lookup_subscript(grid, IndexKey::Value(idx), 2).unwrap();
        let row = b.resolve_lookup(2).unwrap();
        assert!(matches!(
            b.assign(out, row, 3),
            Err(CompileError::AssignFromCompound { line: 3, .. })
        ));
    }

    #[test]
    fn test_unknown_record_field() {
        let mut b = Builder::new();
        b.create_record(
            "point",
            &[FieldDef {
                name: "a".into(),
                type_name: "i32".into(),
                dimensions: vec![],
            }],
            1,
        )
        .unwrap();
        let p = b.add_global("p", "point", &[], 2).unwrap();
        b.func("loop", 3);
        assert!(matches!(
            b.lookup_subscript(p, IndexKey::Field("z".into()), 5),
            Err(CompileError::UnknownField { line: 5, .. })
        ));
    }

    #[test]
    fn test_pixel_lookup_requires_channel() {
        let mut b = Builder::new();
        b.func("loop", 1);
        let pixels = b.get_var("pixels", 1).unwrap();
        let idx = b.add_const(2, ValueType::I32, 1);
        b.lookup_subscript(pixels, IndexKey::Value(idx), 1).unwrap();
        assert!(matches!(
            b.resolve_lookup(1),
            Err(CompileError::MissingPixelChannel { .. })
        ));
    }

    #[test]
    fn test_pixel_channel_by_field_key() {
        let mut b = Builder::new();
        b.func("loop", 1);
        let pixels = b.get_var("pixels", 1).unwrap();
        b.lookup_subscript(pixels, IndexKey::Field("hue".into()), 1)
            .unwrap();
        let idx = b.add_const(2, ValueType::I32, 1);
        b.lookup_subscript(pixels, IndexKey::Value(idx), 1).unwrap();
        let resolved = b.resolve_lookup(1).unwrap();
        assert!(matches!(
            b.arena().get(resolved).kind,
            VarKind::PixelIndex {
                channel: PixelChannel::Hue,
                ..
            }
        ));
    }

    #[test]
    fn test_call_unknown_name_is_library_call() {
        let mut b = Builder::new();
        b.func("loop", 1);
        let arr = b.add_local("arr", "i32", &[4], 1).unwrap();
        b.call("sum", vec![arr], 2).unwrap();
        assert!(matches!(
            b.funcs["loop"].body.last().unwrap().node,
            Node::LibCall { .. }
        ));
    }

    #[test]
    fn test_call_arity_checked() {
        let mut b = Builder::new();
        b.func("f", 1);
        let x = b.add_local("x", "i32", &[], 1).unwrap();
        b.add_func_arg("f", x);
        b.func("loop", 2);
        assert!(matches!(
            b.call("f", vec![], 3),
            Err(CompileError::WrongCallArity {
                expected: 1,
                found: 0,
                line: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_print_and_halt_lower_to_dedicated_opcodes() {
        let mut b = Builder::new();
        let x = b.add_global("x", "i32", &[], 1).unwrap();
        b.func("loop", 1);
        b.call("print", vec![x], 2).unwrap();
        b.call("halt", vec![], 3).unwrap();
        let zero = b.zero();
        b.ret(zero, 4);
        b.allocate();
        let ins = b.generate_instructions().unwrap();
        assert!(ins.iter().any(|i| matches!(i, Instruction::Print { .. })));
        assert!(ins.iter().any(|i| matches!(i, Instruction::Halt)));
    }

    #[test]
    fn test_intrinsic_arity_enforced_at_lowering() {
        let mut b = Builder::new();
        let a = b.add_global("a", "i32", &[3], 1).unwrap();
        let c = b.add_global("c", "i32", &[3], 1).unwrap();
        b.func("loop", 2);
        b.call("sum", vec![a, c], 2).unwrap();
        let zero = b.zero();
        b.ret(zero, 3);
        b.allocate();
        assert!(matches!(
            b.generate_instructions(),
            Err(CompileError::WrongIntrinsicArity { line: 2 })
        ));
    }

    #[test]
    fn test_unknown_lib_func_rejected_at_lowering() {
        let mut b = Builder::new();
        b.func("loop", 1);
        b.call("sparkle", vec![], 7).unwrap();
        let zero = b.zero();
        b.ret(zero, 2);
        b.allocate();
        assert!(matches!(
            b.generate_instructions(),
            Err(CompileError::UnknownLibFunc { line: 7, .. })
        ));
    }

    #[test]
    fn test_func_arg_renamed_and_registered() {
        let mut b = Builder::new();
        b.func("f", 1);
        let x = b.add_local("x", "i32", &[], 1).unwrap();
        b.add_func_arg("f", x);
        assert_eq!(b.arena().get(x).name, "$f.x");
        assert_eq!(b.funcs["f"].params, vec![x]);
    }
}
