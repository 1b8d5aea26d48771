//! The data table: the flat list of all addressable variables produced by
//! the compiler's allocation pass.
//!
//! The VM initializes its memory from this table (constants prefilled,
//! everything else zeroed) and uses it to render register dumps with the
//! right shape and numeric decoding.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value::ValueType;

/// One allocated entry in the data table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEntry {
    /// Variable name, qualified by its owning function for locals.
    pub name: String,
    /// Base value type of the entry's slots.
    pub ty: ValueType,
    /// Number of memory slots the entry occupies.
    pub length: u16,
    /// First memory slot of the entry. Stable for the VM's lifetime.
    pub addr: u16,
    /// Shape of the entry.
    pub kind: DataKind,
}

/// Shape of a data table entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DataKind {
    /// Immediate literal; its slot is prefilled with the value.
    Const {
        /// Raw slot value (fixed-point literals are already encoded).
        value: i32,
    },
    /// A single scalar slot.
    Scalar,
    /// A contiguous run of element slots.
    Array,
    /// An aggregate with named fields at constant offsets.
    Record {
        /// Field names paired with the address of each field's offset
        /// constant, so a dump can resolve fields through their offsets.
        fields: Vec<RecordField>,
    },
}

/// A record field as seen by the data table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordField {
    /// Field name.
    pub name: String,
    /// Address of the constant holding this field's offset.
    pub offset_addr: u16,
}

impl fmt::Display for DataEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DataKind::Const { value } => {
                write!(f, "Const ({}, {})", value, self.ty)
            }
            DataKind::Scalar => write!(f, "Var ({}, {})", self.name, self.ty),
            DataKind::Array => {
                write!(f, "Array ({}, {}, {})", self.name, self.ty, self.length)
            }
            DataKind::Record { fields } => {
                write!(f, "Record ({}, {} fields)", self.name, fields.len())
            }
        }
    }
}

/// Render the data table the way the program dump shows it.
pub fn format_data_table(data: &[DataEntry]) -> String {
    let mut out = String::from("DATA:\n");
    for entry in data {
        out.push_str(&format!("\t{:3}: {}\n", entry.addr, entry));
    }
    out
}
