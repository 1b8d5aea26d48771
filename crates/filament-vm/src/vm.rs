//! The virtual machine: a fetch-execute loop over the flat instruction
//! stream and the allocated data table.
//!
//! `run` scans the stream once to find every function and label offset,
//! positions the program counter at the entry, and then dispatches each
//! instruction's [`Outcome`]: jumps override the counter, calls push the
//! return address, returns pop it (or finish the run), and halt finishes
//! unconditionally. A cycle budget bounds the loop so a misbehaving
//! program cannot wedge an embedded deployment.

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::data::{DataEntry, DataKind};
use crate::error::RuntimeError;
use crate::instruction::{Instruction, Outcome, Word};
use crate::machine::{Machine, PixelBuffer};
use crate::value::{f16_to_float, ValueType};

/// Execution parameters.
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Pixel surface width.
    pub size_x: u16,
    /// Pixel surface height.
    pub size_y: u16,
    /// Maximum instructions per `run` before the run faults.
    pub cycle_limit: u64,
    /// Fixed RNG seed for reproducible runs. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            size_x: 4,
            size_y: 4,
            cycle_limit: 1_000_000,
            seed: None,
        }
    }
}

/// A decoded register value, shaped by its data table entry.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterValue {
    /// Integer or pixel-channel scalar.
    Int(i32),
    /// Decoded fixed-point scalar.
    Float(f64),
    /// Array elements in order.
    Array(Vec<RegisterValue>),
    /// Record fields resolved through their offset constants.
    Record(IndexMap<String, RegisterValue>),
}

/// The interpreter.
pub struct Vm {
    code: Vec<Instruction>,
    data: Vec<DataEntry>,
    machine: Machine,
    cycle_limit: u64,
}

impl Vm {
    /// Build a VM with default configuration.
    pub fn new(code: Vec<Instruction>, data: Vec<DataEntry>) -> Self {
        Self::with_config(code, data, VmConfig::default())
    }

    /// Build a VM, initializing memory from the data table: constants get
    /// their value, everything else is zeroed.
    pub fn with_config(code: Vec<Instruction>, data: Vec<DataEntry>, config: VmConfig) -> Self {
        let size = data
            .iter()
            .map(|entry| entry.addr as usize + entry.length as usize)
            .max()
            .unwrap_or(0);
        let pixels = PixelBuffer::new(config.size_x, config.size_y);
        let mut machine = Machine::new(size, pixels, config.seed);
        for entry in &data {
            if let DataKind::Const { value } = entry.kind {
                machine
                    .store(entry.addr, value)
                    .expect("vm bug: data table address out of range");
            }
        }
        Self {
            code,
            data,
            machine,
            cycle_limit: config.cycle_limit,
        }
    }

    /// The raw memory array.
    pub fn memory(&self) -> &[i32] {
        self.machine.memory()
    }

    /// The pixel surface.
    pub fn pixels(&self) -> &PixelBuffer {
        &self.machine.pixels
    }

    /// The data table this VM was loaded with.
    pub fn data(&self) -> &[DataEntry] {
        &self.data
    }

    fn scan_offsets(&self) -> IndexMap<String, usize> {
        let mut offsets = IndexMap::new();
        for (i, ins) in self.code.iter().enumerate() {
            match ins {
                Instruction::Func { name, .. } | Instruction::Label { name } => {
                    offsets.insert(name.clone(), i);
                }
                _ => {}
            }
        }
        offsets
    }

    /// Run the `init` then `loop` lifecycle functions.
    pub fn run_once(&mut self) -> Result<(), RuntimeError> {
        self.run("init")?;
        self.run("loop")
    }

    /// Execute the named entry function to completion.
    pub fn run(&mut self, entry: &str) -> Result<(), RuntimeError> {
        let offsets = self.scan_offsets();
        let mut pc = *offsets
            .get(entry)
            .ok_or_else(|| RuntimeError::UnknownFunction(entry.to_string()))?;

        let mut return_stack: Vec<usize> = Vec::new();
        let mut cycles: u64 = 0;

        loop {
            cycles += 1;
            if cycles > self.cycle_limit {
                return Err(RuntimeError::CycleLimitExceeded {
                    limit: self.cycle_limit,
                });
            }

            let ins = &self.code[pc];
            self.machine.pc = pc;
            trace!(pc, %ins, "execute");
            pc += 1;

            match ins.execute(&mut self.machine)? {
                Outcome::Continue => {}
                Outcome::Jump(label) => {
                    pc = *offsets
                        .get(&label)
                        .ok_or(RuntimeError::UndefinedLabel(label))?;
                }
                Outcome::Call(target) => {
                    return_stack.push(pc);
                    pc = *offsets
                        .get(&target)
                        .ok_or(RuntimeError::UndefinedLabel(target))?;
                }
                Outcome::Return => match return_stack.pop() {
                    Some(saved) => pc = saved,
                    None => break,
                },
                Outcome::Halt => break,
            }
        }

        debug!(entry, cycles, "run complete");
        Ok(())
    }

    /// Decode every non-constant data table entry into its register value.
    pub fn dump_registers(&self) -> IndexMap<String, RegisterValue> {
        let mut registers = IndexMap::new();
        for entry in &self.data {
            let value = match &entry.kind {
                DataKind::Const { .. } => continue,
                DataKind::Scalar => self.decode_slot(entry.addr, entry.ty),
                DataKind::Array => RegisterValue::Array(
                    (0..entry.length)
                        .map(|i| self.decode_slot(entry.addr + i, entry.ty))
                        .collect(),
                ),
                DataKind::Record { fields } => {
                    let mut decoded = IndexMap::new();
                    for field in fields {
                        let offset = self.slot(field.offset_addr);
                        let addr = entry.addr as i64 + offset as i64;
                        let value = self.machine.load_at(addr).unwrap_or(0);
                        decoded.insert(field.name.clone(), RegisterValue::Int(value));
                    }
                    RegisterValue::Record(decoded)
                }
            };
            registers.insert(entry.name.clone(), value);
        }
        registers
    }

    fn slot(&self, addr: u16) -> i32 {
        self.machine.load(addr).unwrap_or(0)
    }

    fn decode_slot(&self, addr: u16, ty: ValueType) -> RegisterValue {
        let raw = self.slot(addr);
        match ty {
            ValueType::F16 => RegisterValue::Float(f16_to_float(raw)),
            _ => RegisterValue::Int(raw),
        }
    }
}

/// Render the instruction stream the way the program dump shows it.
pub fn disassemble(code: &[Instruction]) -> String {
    let mut out = String::from("INSTRUCTIONS:\n");
    for (i, ins) in code.iter().enumerate() {
        out.push_str(&format!("\t{i:3}: {ins}\n"));
    }
    out
}

/// Assemble the instruction stream into the final wire image.
///
/// Two passes: the first records the word offset of every function and
/// label, the second emits words with label operands resolved to those
/// offsets. Pseudo-instructions occupy no words.
pub fn assemble(code: &[Instruction]) -> Result<Vec<Word>, RuntimeError> {
    // Sizing pass. Label operands assemble to one word regardless of the
    // value, so resolving everything to 0 gives exact sizes.
    let mut zeroed = IndexMap::new();
    for ins in code {
        match ins {
            Instruction::Func { name, .. } | Instruction::Label { name } => {
                zeroed.insert(name.clone(), 0);
            }
            _ => {}
        }
    }

    let mut offsets: IndexMap<String, Word> = IndexMap::new();
    let mut offset: Word = 0;
    for ins in code {
        match ins {
            Instruction::Func { name, .. } | Instruction::Label { name } => {
                offsets.insert(name.clone(), offset);
            }
            _ => {
                offset += ins.assemble(&zeroed)?.len() as Word;
            }
        }
    }

    let mut image = Vec::with_capacity(offset as usize);
    for ins in code {
        image.extend(ins.assemble(&offsets)?);
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::MemRef;

    fn entry(name: &str, addr: u16, value: i32) -> DataEntry {
        DataEntry {
            name: name.to_string(),
            ty: ValueType::I32,
            length: 1,
            addr,
            kind: DataKind::Const { value },
        }
    }

    fn slot_entry(name: &str, addr: u16) -> DataEntry {
        DataEntry {
            name: name.to_string(),
            ty: ValueType::I32,
            length: 1,
            addr,
            kind: DataKind::Scalar,
        }
    }

    #[test]
    fn test_unknown_entry_function() {
        let mut vm = Vm::new(vec![], vec![]);
        assert!(matches!(
            vm.run("missing"),
            Err(RuntimeError::UnknownFunction(_))
        ));
    }

    #[test]
    fn test_call_and_return() {
        // init: x = f(); f: return 5
        let code = vec![
            Instruction::Func {
                name: "init".into(),
                params: vec![],
            },
            Instruction::Call {
                target: "f".into(),
                params: vec![],
                args: vec![],
            },
            Instruction::Mov {
                dest: MemRef::scalar(2),
                src: MemRef::scalar(0),
            },
            Instruction::Ret {
                value: MemRef::scalar(2),
            },
            Instruction::Func {
                name: "f".into(),
                params: vec![],
            },
            Instruction::Ret {
                value: MemRef::scalar(1),
            },
        ];
        let data = vec![
            slot_entry("$return", 0),
            entry("5", 1, 5),
            slot_entry("init.x", 2),
        ];
        let mut vm = Vm::new(code, data);
        vm.run("init").unwrap();
        assert_eq!(vm.memory()[2], 5);
    }

    #[test]
    fn test_halt_stops_inside_call() {
        let code = vec![
            Instruction::Func {
                name: "init".into(),
                params: vec![],
            },
            Instruction::Call {
                target: "f".into(),
                params: vec![],
                args: vec![],
            },
            Instruction::Mov {
                dest: MemRef::scalar(1),
                src: MemRef::scalar(2),
            },
            Instruction::Ret {
                value: MemRef::scalar(1),
            },
            Instruction::Func {
                name: "f".into(),
                params: vec![],
            },
            Instruction::Halt,
        ];
        let data = vec![
            slot_entry("$return", 0),
            slot_entry("init.x", 1),
            entry("9", 2, 9),
        ];
        let mut vm = Vm::new(code, data);
        vm.run("init").unwrap();
        // The move after the call never ran.
        assert_eq!(vm.memory()[1], 0);
    }

    #[test]
    fn test_cycle_limit_faults() {
        let code = vec![
            Instruction::Func {
                name: "init".into(),
                params: vec![],
            },
            Instruction::Label {
                name: "spin.0".into(),
            },
            Instruction::Jmp {
                target: "spin.0".into(),
            },
        ];
        let mut vm = Vm::with_config(
            code,
            vec![slot_entry("$return", 0)],
            VmConfig {
                cycle_limit: 100,
                ..VmConfig::default()
            },
        );
        assert!(matches!(
            vm.run("init"),
            Err(RuntimeError::CycleLimitExceeded { limit: 100 })
        ));
    }

    #[test]
    fn test_assemble_resolves_labels_to_word_offsets() {
        let code = vec![
            Instruction::Func {
                name: "init".into(),
                params: vec![],
            },
            Instruction::Mov {
                dest: MemRef::scalar(1),
                src: MemRef::scalar(2),
            },
            Instruction::Label {
                name: "top.0".into(),
            },
            Instruction::Jmp {
                target: "top.0".into(),
            },
        ];
        let image = assemble(&code).unwrap();
        // MOV is 3 words, so the label lands at word 3 and JMP encodes it.
        assert_eq!(image, vec![0x01, 1, 2, 0x0F, 3]);
    }

    #[test]
    fn test_dump_skips_consts_and_decodes_f16() {
        let code = vec![];
        let data = vec![
            slot_entry("$return", 0),
            entry("3", 1, 3),
            DataEntry {
                name: "bright".into(),
                ty: ValueType::F16,
                length: 1,
                addr: 2,
                kind: DataKind::Const { value: 163840 },
            },
            DataEntry {
                name: "level".into(),
                ty: ValueType::F16,
                length: 1,
                addr: 3,
                kind: DataKind::Scalar,
            },
        ];
        let mut vm = Vm::new(code, data);
        vm.machine.store(3, 163840).unwrap();
        let dump = vm.dump_registers();
        assert!(!dump.contains_key("3"));
        assert!(!dump.contains_key("bright"));
        assert_eq!(dump["level"], RegisterValue::Float(2.5));
    }
}
