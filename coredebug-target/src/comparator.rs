use serde::{Deserialize, Serialize};

use crate::{
    serialize::{hex_u_int, u32_or_hex},
    RegisterRef,
};

/// The hardware comparators of a core, used for breakpoints and watchpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparatorDescription {
    /// Control register encodings, shared by all slots.
    pub control: ComparatorControl,
    /// The physical comparator slots.
    pub slots: Vec<ComparatorSlotDescription>,
}

/// Values written to a comparator control register.
///
/// Each match value already contains the enable bit of the comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparatorControl {
    /// Disables the comparator.
    #[serde(serialize_with = "hex_u_int", deserialize_with = "u32_or_hex")]
    pub disabled: u32,
    /// Match instruction fetches at the programmed address.
    #[serde(serialize_with = "hex_u_int", deserialize_with = "u32_or_hex")]
    pub execute: u32,
    /// Match data reads.
    #[serde(serialize_with = "hex_u_int", deserialize_with = "u32_or_hex")]
    pub read: u32,
    /// Match data writes.
    #[serde(serialize_with = "hex_u_int", deserialize_with = "u32_or_hex")]
    pub write: u32,
    /// Match data reads and writes.
    #[serde(serialize_with = "hex_u_int", deserialize_with = "u32_or_hex")]
    pub access: u32,
}

/// One physical comparator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparatorSlotDescription {
    /// Register holding the address to compare against.
    pub value: RegisterRef,
    /// Register holding the address mask. Bits set in the mask are ignored during the
    /// comparison. Without a mask register only exact addresses match.
    #[serde(default)]
    pub mask: Option<RegisterRef>,
    /// The control register of the comparator.
    pub control: RegisterRef,
    /// The comparator can match instruction fetches.
    #[serde(default = "enabled")]
    pub instruction: bool,
    /// The comparator can match data accesses.
    #[serde(default = "enabled")]
    pub data: bool,
}

fn enabled() -> bool {
    true
}

/// The kind of match a comparator is asked for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ComparatorMatch {
    /// Instruction fetch, for hardware breakpoints.
    Execute,
    /// Data reads.
    Read,
    /// Data writes.
    Write,
    /// Data reads and writes.
    Access,
}

impl ComparatorMatch {
    /// Whether this match uses the instruction side of a comparator.
    pub fn is_instruction(self) -> bool {
        matches!(self, ComparatorMatch::Execute)
    }
}

impl ComparatorControl {
    /// The control value enabling the comparator for the given match.
    pub fn enable_value(&self, kind: ComparatorMatch) -> u32 {
        match kind {
            ComparatorMatch::Execute => self.execute,
            ComparatorMatch::Read => self.read,
            ComparatorMatch::Write => self.write,
            ComparatorMatch::Access => self.access,
        }
    }
}

impl ComparatorSlotDescription {
    /// Whether the slot can be programmed for the given match.
    pub fn supports(&self, kind: ComparatorMatch) -> bool {
        if kind.is_instruction() {
            self.instruction
        } else {
            self.data
        }
    }
}
